use crate::api::DocumentsApi;
use crate::error::ClientError;
use crate::service::reconcile::{DocumentChange, reconcile};
use crate::types::{Document, DocumentFilter};

use futures::future::BoxFuture;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Where a subscription's snapshots come from.
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch_snapshot(&self) -> BoxFuture<'_, Result<Vec<Document>, ClientError>>;

    fn fetch_detail<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Document, ClientError>>;

    /// Single-target subscriptions stop once their document is terminal or gone.
    fn is_single_target(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetSelector {
    Single(String),
    Dashboard(DocumentFilter),
}

/// Snapshots fetched through the documents API.
pub struct DocumentSource {
    api: DocumentsApi,
    selector: TargetSelector,
}

impl DocumentSource {
    pub fn new(api: DocumentsApi, selector: TargetSelector) -> Self {
        Self { api, selector }
    }
}

impl SnapshotSource for DocumentSource {
    fn fetch_snapshot(&self) -> BoxFuture<'_, Result<Vec<Document>, ClientError>> {
        Box::pin(async move {
            match &self.selector {
                TargetSelector::Single(id) => match self.api.get(id).await {
                    Ok(doc) => Ok(vec![doc]),
                    Err(e) if e.is_not_found() => Ok(Vec::new()),
                    Err(e) => Err(e),
                },
                TargetSelector::Dashboard(filter) => Ok(self
                    .api
                    .list()
                    .await?
                    .into_iter()
                    .filter(|d| filter.matches(d))
                    .collect()),
            }
        })
    }

    fn fetch_detail<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Document, ClientError>> {
        Box::pin(self.api.get(id))
    }

    fn is_single_target(&self) -> bool {
        matches!(self.selector, TargetSelector::Single(_))
    }
}

/// Whether a dashboard subscription stops by itself once everything is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopPolicy {
    #[default]
    WhenAllTerminal,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    Idle,
    Polling,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    AllTerminal,
    TargetRemoved,
    SessionEnded,
}

#[derive(Debug, Clone)]
pub enum ReconcileEvent {
    /// Statuses or membership changed; `snapshot` is the new full snapshot.
    Changed {
        changes: Vec<DocumentChange>,
        snapshot: Arc<Vec<Document>>,
    },
    /// Fresh detail for the focused document.
    Detail(Document),
    FetchFailed {
        message: String,
        status: Option<u16>,
    },
    Stopped(StopReason),
}

#[derive(Debug, Clone)]
pub struct ReconcilerStatus {
    pub state: ReconcilerState,
    pub snapshot: Vec<Document>,
    pub in_flight: bool,
    pub interval: Option<Duration>,
    pub focus: Option<String>,
    pub fetches: u64,
    pub skipped_ticks: u64,
}

#[derive(Debug)]
pub enum ReconcilerMessage {
    Start(Duration),
    Stop,
    /// Run a cycle now, subject to the same in-flight guard as timer ticks.
    PollNow,
    Focus(Option<String>),
    /// Let these ids move backwards once (a deliberate requeue), discard any fetch
    /// issued before the requeue, and restart polling if it had stopped.
    Rearm(Vec<String>),
    Inspect(RpcReplyPort<ReconcilerStatus>),

    // Internal messages (sent by the timer and fetch tasks)
    Tick(u64),
    FetchComplete {
        epoch: u64,
        generation: u64,
        result: Result<Vec<Document>, ClientError>,
    },
    DetailComplete {
        epoch: u64,
        result: Result<Document, ClientError>,
    },
}

/// Handle to a polling reconciler.
///
/// Each `start` opens a new subscription (epoch); results of fetches issued under an
/// older epoch are discarded, so nothing fetched before `stop` is ever applied.
/// The actor stops when the last clone of the handle is dropped.
#[derive(Clone)]
pub struct PollingReconciler {
    actor: ActorRef<ReconcilerMessage>,
    events: broadcast::Sender<ReconcileEvent>,
    _owner: Arc<ActorOwner>,
}

struct ActorOwner(ActorRef<ReconcilerMessage>);

impl Drop for ActorOwner {
    fn drop(&mut self) {
        self.0.stop(None);
    }
}

impl PollingReconciler {
    pub async fn spawn(source: Arc<dyn SnapshotSource>, policy: StopPolicy) -> Result<Self, ClientError> {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        let args = ReconcilerArgs {
            source,
            policy,
            events: events.clone(),
        };
        let (actor, _jh) = Actor::spawn(None, ReconcilerActor, args)
            .await
            .map_err(|e| ClientError::Actor(format!("spawn ReconcilerActor failed: {e}")))?;
        Ok(Self {
            _owner: Arc::new(ActorOwner(actor.clone())),
            actor,
            events,
        })
    }

    pub fn start(&self, interval: Duration) {
        let _ = ractor::cast!(self.actor, ReconcilerMessage::Start(interval));
    }

    pub fn stop(&self) {
        let _ = ractor::cast!(self.actor, ReconcilerMessage::Stop);
    }

    pub fn poll_now(&self) {
        let _ = ractor::cast!(self.actor, ReconcilerMessage::PollNow);
    }

    pub fn set_focus(&self, id: Option<String>) {
        let _ = ractor::cast!(self.actor, ReconcilerMessage::Focus(id));
    }

    pub fn rearm(&self, ids: Vec<String>) {
        let _ = ractor::cast!(self.actor, ReconcilerMessage::Rearm(ids));
    }

    pub async fn status(&self) -> Result<ReconcilerStatus, ClientError> {
        ractor::call!(self.actor, ReconcilerMessage::Inspect)
            .map_err(|e| ClientError::Actor(format!("Inspect RPC failed: {e}")))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReconcileEvent> {
        self.events.subscribe()
    }

    pub fn event_stream(&self) -> BroadcastStream<ReconcileEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    pub fn shutdown(&self) {
        self.actor.stop(None);
    }
}

struct ReconcilerArgs {
    source: Arc<dyn SnapshotSource>,
    policy: StopPolicy,
    events: broadcast::Sender<ReconcileEvent>,
}

/// Per-start polling state; dropped on stop.
struct PollSubscription {
    last_snapshot: Vec<Document>,
    in_flight: bool,
    /// Bumped by every rearm; fetches issued under an older value are discarded.
    generation: u64,
    rearmed: HashSet<String>,
}

impl PollSubscription {
    fn new(last_snapshot: Vec<Document>, rearmed: HashSet<String>) -> Self {
        Self {
            last_snapshot,
            in_flight: false,
            generation: 0,
            rearmed,
        }
    }
}

struct ReconcilerActorState {
    source: Arc<dyn SnapshotSource>,
    policy: StopPolicy,
    events: broadcast::Sender<ReconcileEvent>,
    state: ReconcilerState,
    epoch: u64,
    interval: Option<Duration>,
    timer: Option<JoinHandle<()>>,
    subscription: Option<PollSubscription>,
    /// Snapshot of a subscription that stopped because everything was terminal,
    /// kept so a rearm can resume from it.
    retained: Option<Vec<Document>>,
    focus: Option<String>,
    fetches: u64,
    skipped_ticks: u64,
}

impl ReconcilerActorState {
    fn emit(&self, event: ReconcileEvent) {
        let _ = self.events.send(event);
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct ReconcilerActor;

#[ractor::async_trait]
impl Actor for ReconcilerActor {
    type Msg = ReconcilerMessage;
    type State = ReconcilerActorState;
    type Arguments = ReconcilerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(ReconcilerActorState {
            source: args.source,
            policy: args.policy,
            events: args.events,
            state: ReconcilerState::Idle,
            epoch: 0,
            interval: None,
            timer: None,
            subscription: None,
            retained: None,
            focus: None,
            fetches: 0,
            skipped_ticks: 0,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.cancel_timer();
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ReconcilerMessage::Start(interval) => {
                state.retained = None;
                let subscription = PollSubscription::new(Vec::new(), HashSet::new());
                self.handle_start(state, &myself, interval, subscription);
            }
            ReconcilerMessage::Stop => {
                self.stop_polling(state, StopReason::Requested);
            }
            ReconcilerMessage::PollNow => {
                if state.state == ReconcilerState::Polling {
                    self.begin_cycle(state, &myself);
                } else {
                    debug!("poll requested while not polling; ignored");
                }
            }
            ReconcilerMessage::Focus(id) => {
                state.focus = id;
            }
            ReconcilerMessage::Rearm(ids) => {
                self.handle_rearm(state, &myself, ids);
            }
            ReconcilerMessage::Inspect(reply) => {
                let (snapshot, in_flight) = state
                    .subscription
                    .as_ref()
                    .map(|s| (s.last_snapshot.clone(), s.in_flight))
                    .unwrap_or_default();
                let _ = reply.send(ReconcilerStatus {
                    state: state.state,
                    snapshot,
                    in_flight,
                    interval: state.interval,
                    focus: state.focus.clone(),
                    fetches: state.fetches,
                    skipped_ticks: state.skipped_ticks,
                });
            }
            ReconcilerMessage::Tick(epoch) => {
                if epoch == state.epoch && state.state == ReconcilerState::Polling {
                    self.begin_cycle(state, &myself);
                }
            }
            ReconcilerMessage::FetchComplete {
                epoch,
                generation,
                result,
            } => {
                self.handle_fetch_complete(state, &myself, epoch, generation, result);
            }
            ReconcilerMessage::DetailComplete { epoch, result } => {
                if epoch != state.epoch {
                    return Ok(());
                }
                match result {
                    Ok(doc) => state.emit(ReconcileEvent::Detail(doc)),
                    Err(e) => warn!(error = %e, "detail fetch failed"),
                }
            }
        }
        Ok(())
    }
}

impl ReconcilerActor {
    fn handle_start(
        &self,
        state: &mut ReconcilerActorState,
        myself: &ActorRef<ReconcilerMessage>,
        interval: Duration,
        subscription: PollSubscription,
    ) {
        state.cancel_timer();
        state.epoch += 1;
        state.state = ReconcilerState::Polling;
        state.interval = Some(interval);
        state.subscription = Some(subscription);

        let me = myself.clone();
        let epoch = state.epoch;
        state.timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if ractor::cast!(me, ReconcilerMessage::Tick(epoch)).is_err() {
                    break;
                }
            }
        }));
        info!(epoch, interval_ms = interval.as_millis() as u64, "polling started");
    }

    fn stop_polling(&self, state: &mut ReconcilerActorState, reason: StopReason) {
        if state.state == ReconcilerState::Stopped {
            return;
        }
        state.cancel_timer();
        state.state = ReconcilerState::Stopped;
        let subscription = state.subscription.take();
        state.retained = match reason {
            StopReason::AllTerminal => subscription.map(|s| s.last_snapshot),
            _ => None,
        };
        // Late results of the old subscription must not be applied.
        state.epoch += 1;
        info!(?reason, "polling stopped");
        state.emit(ReconcileEvent::Stopped(reason));
    }

    fn handle_rearm(
        &self,
        state: &mut ReconcilerActorState,
        myself: &ActorRef<ReconcilerMessage>,
        ids: Vec<String>,
    ) {
        if let Some(sub) = state.subscription.as_mut() {
            sub.rearmed.extend(ids);
            // A fetch already in flight may predate the requeue.
            sub.generation += 1;
            return;
        }
        if let Some(interval) = state.interval {
            debug!(count = ids.len(), "rearm restarts polling");
            let seed = state.retained.take().unwrap_or_default();
            let subscription = PollSubscription::new(seed, ids.into_iter().collect());
            self.handle_start(state, myself, interval, subscription);
        }
    }

    fn begin_cycle(&self, state: &mut ReconcilerActorState, myself: &ActorRef<ReconcilerMessage>) {
        let Some(sub) = state.subscription.as_mut() else {
            return;
        };
        if sub.in_flight {
            state.skipped_ticks += 1;
            debug!("previous fetch outstanding; skipping cycle");
            return;
        }
        sub.in_flight = true;
        let generation = sub.generation;
        state.fetches += 1;

        let source = state.source.clone();
        let me = myself.clone();
        let epoch = state.epoch;
        tokio::spawn(async move {
            let result = source.fetch_snapshot().await;
            let _ = ractor::cast!(
                me,
                ReconcilerMessage::FetchComplete {
                    epoch,
                    generation,
                    result
                }
            );
        });
    }

    fn handle_fetch_complete(
        &self,
        state: &mut ReconcilerActorState,
        myself: &ActorRef<ReconcilerMessage>,
        epoch: u64,
        generation: u64,
        result: Result<Vec<Document>, ClientError>,
    ) {
        if epoch != state.epoch {
            debug!(epoch, current = state.epoch, "discarding result of a stopped subscription");
            return;
        }
        let Some(sub) = state.subscription.as_mut() else {
            return;
        };
        sub.in_flight = false;
        if generation != sub.generation {
            debug!(generation, current = sub.generation, "discarding fetch issued before rearm");
            return;
        }

        let fetched = match result {
            Ok(docs) => docs,
            Err(e) => {
                warn!(error = %e, "snapshot fetch failed");
                let ends_session = e.ends_session();
                state.emit(ReconcileEvent::FetchFailed {
                    message: e.to_string(),
                    status: e.status().map(|s| s.as_u16()),
                });
                if ends_session {
                    self.stop_polling(state, StopReason::SessionEnded);
                }
                return;
            }
        };

        let rec = reconcile(&sub.last_snapshot, fetched, &sub.rearmed);
        for id in &rec.rearm_consumed {
            sub.rearmed.remove(id);
        }
        if rec.has_changes() {
            sub.last_snapshot = rec.snapshot;
            let snapshot = Arc::new(sub.last_snapshot.clone());
            debug!(changes = rec.changes.len(), total = snapshot.len(), "snapshot changed");

            let focused = state
                .focus
                .clone()
                .filter(|id| snapshot.iter().any(|d| &d.id == id));
            state.emit(ReconcileEvent::Changed {
                changes: rec.changes,
                snapshot,
            });
            if let Some(id) = focused {
                self.fetch_detail(state, myself, id);
            }
        }

        if let Some(reason) = self.finished(state) {
            self.stop_polling(state, reason);
        }
    }

    fn fetch_detail(&self, state: &ReconcilerActorState, myself: &ActorRef<ReconcilerMessage>, id: String) {
        let source = state.source.clone();
        let me = myself.clone();
        let epoch = state.epoch;
        tokio::spawn(async move {
            let result = source.fetch_detail(&id).await;
            let _ = ractor::cast!(me, ReconcilerMessage::DetailComplete { epoch, result });
        });
    }

    fn finished(&self, state: &ReconcilerActorState) -> Option<StopReason> {
        let snapshot = &state.subscription.as_ref()?.last_snapshot;
        let all_terminal = !snapshot.is_empty() && snapshot.iter().all(|d| d.status.is_terminal());

        if state.source.is_single_target() {
            if snapshot.is_empty() {
                return Some(StopReason::TargetRemoved);
            }
            return all_terminal.then_some(StopReason::AllTerminal);
        }
        match state.policy {
            StopPolicy::WhenAllTerminal => all_terminal.then_some(StopReason::AllTerminal),
            StopPolicy::Never => None,
        }
    }
}
