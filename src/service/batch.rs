use crate::api::DocumentsApi;
use crate::error::ClientError;
use crate::service::polling::PollingReconciler;
use crate::types::BatchStage;

use std::collections::{BTreeSet, HashMap};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Ids the user currently has selected.
pub type Selection = BTreeSet<String>;

#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Submitted {
        stage: BatchStage,
        processed_ids: Vec<String>,
        errors: HashMap<String, String>,
    },
}

/// Submits the selected ids as one batch job.
///
/// Completion is observed by a polling reconciler targeting the same documents;
/// when one is attached it is rearmed for the processed ids.
#[derive(Clone)]
pub struct BatchJobSubmitter {
    api: DocumentsApi,
    reconciler: Option<PollingReconciler>,
    events: broadcast::Sender<BatchEvent>,
}

impl BatchJobSubmitter {
    pub fn new(api: DocumentsApi) -> Self {
        let (events, _rx) = broadcast::channel(16);
        Self {
            api,
            reconciler: None,
            events,
        }
    }

    pub fn with_reconciler(mut self, reconciler: PollingReconciler) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.events.subscribe()
    }

    /// Submit `selection` for `stage`. Returns the ids the server accepted.
    ///
    /// An empty selection is a no-op. On success the selection is cleared; on error
    /// it is left untouched.
    pub async fn submit(
        &self,
        stage: BatchStage,
        selection: &mut Selection,
    ) -> Result<Vec<String>, ClientError> {
        if selection.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = selection.iter().cloned().collect();
        let resp = self.api.process_batch(stage, ids).await?;

        for (id, reason) in &resp.errors {
            warn!(id = %id, reason = %reason, ?stage, "document not queued");
        }
        info!(
            ?stage,
            queued = resp.processed_ids.len(),
            rejected = resp.errors.len(),
            "batch submitted"
        );

        selection.clear();
        if let Some(reconciler) = &self.reconciler {
            reconciler.rearm(resp.processed_ids.clone());
        }
        let _ = self.events.send(BatchEvent::Submitted {
            stage,
            processed_ids: resp.processed_ids.clone(),
            errors: resp.errors,
        });
        Ok(resp.processed_ids)
    }

    /// Requeue one document outside of a batch.
    pub async fn requeue(&self, id: &str) -> Result<(), ClientError> {
        let doc = self.api.process(id).await?;
        info!(id, status = %doc.status, "document requeued");
        if let Some(reconciler) = &self.reconciler {
            reconciler.rearm(vec![doc.id]);
        }
        Ok(())
    }
}
