use crate::api::{DocumentsApi, RequestExecutor};
use crate::auth::{ProfileStore, RefreshCoordinator, SessionManager, TokenStore};
use crate::config::Config;
use crate::db::StateStorage;
use crate::error::ClientError;
use crate::service::{
    BatchJobSubmitter, DocumentSource, PollingReconciler, StopPolicy, TargetSelector,
};
use crate::types::DocumentFilter;

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Build the shared HTTP client from configuration.
pub fn build_http_client(cfg: &Config) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(cfg.user_agent.clone())
        .connect_timeout(cfg.connect_timeout())
        .timeout(cfg.request_timeout());
    if let Some(proxy_url) = cfg.proxy.as_ref() {
        let proxy = reqwest::Proxy::all(proxy_url.as_str())
            .map_err(|e| ClientError::Setup(format!("invalid proxy url: {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| ClientError::Setup(e.to_string()))
}

/// Everything a view needs: session, documents, polling and batch jobs.
#[derive(Clone)]
pub struct OcrClient {
    exec: RequestExecutor,
    session: SessionManager,
    documents: DocumentsApi,
    poll_interval: Duration,
}

impl OcrClient {
    pub async fn connect(cfg: &Config) -> Result<Self, ClientError> {
        let http_client = build_http_client(cfg)?;
        let api_root = cfg.api_root();

        let storage = StateStorage::connect(&cfg.database_url).await?;
        let tokens = TokenStore::load(storage.clone()).await;
        let profiles = ProfileStore::load(storage).await;

        let refresher = RefreshCoordinator::spawn(http_client.clone(), api_root.clone(), tokens.clone()).await?;
        let exec = RequestExecutor::new(http_client, api_root.clone(), tokens, refresher);

        info!(api_root = %api_root, restored_session = exec.tokens().get().is_some(), "client ready");
        Ok(Self {
            session: SessionManager::new(exec.clone(), profiles),
            documents: DocumentsApi::new(exec.clone()),
            exec,
            poll_interval: cfg.poll_interval(),
        })
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn documents(&self) -> &DocumentsApi {
        &self.documents
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.exec
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Reconciler over every listed document matching `filter`. Not started.
    pub async fn dashboard(
        &self,
        filter: DocumentFilter,
        policy: StopPolicy,
    ) -> Result<PollingReconciler, ClientError> {
        let source = DocumentSource::new(self.documents.clone(), TargetSelector::Dashboard(filter));
        PollingReconciler::spawn(Arc::new(source), policy).await
    }

    /// Reconciler over a single document. Not started.
    pub async fn track(&self, id: impl Into<String>) -> Result<PollingReconciler, ClientError> {
        let source = DocumentSource::new(self.documents.clone(), TargetSelector::Single(id.into()));
        PollingReconciler::spawn(Arc::new(source), StopPolicy::WhenAllTerminal).await
    }

    pub fn batch_submitter(&self, reconciler: Option<PollingReconciler>) -> BatchJobSubmitter {
        let submitter = BatchJobSubmitter::new(self.documents.clone());
        match reconciler {
            Some(r) => submitter.with_reconciler(r),
            None => submitter,
        }
    }

    pub fn shutdown(&self) {
        self.exec.refresher().shutdown();
    }
}
