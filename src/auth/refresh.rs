use crate::auth::credentials::CredentialPair;
use crate::auth::endpoints::AuthEndpoints;
use crate::auth::store::TokenStore;
use crate::error::{ClientError, RefreshFailure};

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tracing::{debug, info, warn};

pub type RefreshResult = Result<CredentialPair, RefreshFailure>;

/// Messages handled by the refresh actor.
#[derive(Debug)]
pub enum RefreshMessage {
    /// Obtain a fresh pair. The optional access token is the one the caller saw
    /// rejected; if the store already holds a different one, it is returned as is.
    Refresh(Option<String>, RpcReplyPort<RefreshResult>),

    // Internal messages (sent by the actor itself)
    /// The refresh request finished; persist and answer every waiter.
    RefreshComplete(RefreshResult),
}

/// Single-flight token refresh.
///
/// At most one refresh request is outstanding; callers arriving meanwhile wait for
/// the same outcome. A rejected refresh clears the token store (forced logout).
#[derive(Clone)]
pub struct RefreshCoordinator {
    actor: ActorRef<RefreshMessage>,
}

impl RefreshCoordinator {
    pub async fn spawn(
        http_client: reqwest::Client,
        api_root: impl Into<String>,
        tokens: TokenStore,
    ) -> Result<Self, ClientError> {
        let args = RefreshArgs {
            http_client,
            api_root: api_root.into(),
            tokens,
        };
        let (actor, _jh) = Actor::spawn(None, RefreshActor, args)
            .await
            .map_err(|e| ClientError::Actor(format!("spawn RefreshActor failed: {e}")))?;
        Ok(Self { actor })
    }

    /// Refresh unconditionally (joining an in-flight attempt if there is one).
    pub async fn refresh(&self) -> Result<CredentialPair, ClientError> {
        self.refresh_after(None).await
    }

    /// Refresh because `rejected_access` was refused by the server.
    pub(crate) async fn refresh_after(
        &self,
        rejected_access: Option<String>,
    ) -> Result<CredentialPair, ClientError> {
        let result = ractor::call!(self.actor, RefreshMessage::Refresh, rejected_access)
            .map_err(|e| ClientError::Actor(format!("Refresh RPC failed: {e}")))?;
        result.map_err(ClientError::from)
    }

    pub fn shutdown(&self) {
        self.actor.stop(None);
    }
}

struct RefreshArgs {
    http_client: reqwest::Client,
    api_root: String,
    tokens: TokenStore,
}

struct RefreshState {
    http_client: reqwest::Client,
    api_root: String,
    tokens: TokenStore,
    in_flight: bool,
    waiters: Vec<RpcReplyPort<RefreshResult>>,
}

struct RefreshActor;

#[ractor::async_trait]
impl Actor for RefreshActor {
    type Msg = RefreshMessage;
    type State = RefreshState;
    type Arguments = RefreshArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(RefreshState {
            http_client: args.http_client,
            api_root: args.api_root,
            tokens: args.tokens,
            in_flight: false,
            waiters: Vec::new(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            RefreshMessage::Refresh(rejected_access, reply) => {
                self.handle_refresh(state, &myself, rejected_access, reply);
            }
            RefreshMessage::RefreshComplete(result) => {
                self.handle_refresh_complete(state, result).await;
            }
        }
        Ok(())
    }
}

impl RefreshActor {
    fn handle_refresh(
        &self,
        state: &mut RefreshState,
        myself: &ActorRef<RefreshMessage>,
        rejected_access: Option<String>,
        reply: RpcReplyPort<RefreshResult>,
    ) {
        let Some(current) = state.tokens.get() else {
            let _ = reply.send(Err(RefreshFailure::Unavailable));
            return;
        };

        if let Some(rejected) = rejected_access
            && rejected != current.access_token
        {
            debug!("Access token already rotated; skip refresh");
            let _ = reply.send(Ok(current));
            return;
        }

        state.waiters.push(reply);
        if state.in_flight {
            debug!(waiters = state.waiters.len(), "Joining in-flight refresh");
            return;
        }
        state.in_flight = true;

        let http = state.http_client.clone();
        let api_root = state.api_root.clone();
        let me = myself.clone();
        tokio::spawn(async move {
            let result = AuthEndpoints::refresh_tokens(&http, &api_root, &current.refresh_token).await;
            let _ = ractor::cast!(me, RefreshMessage::RefreshComplete(result));
        });
        debug!("Token refresh started");
    }

    async fn handle_refresh_complete(&self, state: &mut RefreshState, result: RefreshResult) {
        if !state.in_flight {
            return;
        }
        state.in_flight = false;

        let result = match result {
            Ok(pair) => match state.tokens.set(pair.clone()).await {
                Ok(()) => Ok(pair),
                Err(_) => Err(RefreshFailure::InvalidPayload),
            },
            Err(RefreshFailure::Rejected(status)) => {
                warn!(status = status.as_u16(), "Refresh rejected; clearing session");
                state.tokens.clear().await;
                Err(RefreshFailure::Rejected(status))
            }
            Err(e) => {
                warn!(error = %e, "Refresh failed");
                Err(e)
            }
        };

        let waiters = std::mem::take(&mut state.waiters);
        info!(
            waiters = waiters.len(),
            ok = result.is_ok(),
            "Refresh completed"
        );
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}
