use crate::api::executor::{MultipartPart, RequestExecutor, RequestOptions};
use crate::error::ClientError;
use crate::types::job::UploadResponse;
use crate::types::{BatchRequest, BatchResponse, BatchStage, BinaryVariant, Document};

use bytes::Bytes;
use tracing::info;

/// Typed calls for the `/documents` endpoints.
#[derive(Clone)]
pub struct DocumentsApi {
    exec: RequestExecutor,
}

impl DocumentsApi {
    pub fn new(exec: RequestExecutor) -> Self {
        Self { exec }
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.exec
    }

    pub async fn list(&self) -> Result<Vec<Document>, ClientError> {
        let docs: Option<Vec<Document>> = self
            .exec
            .execute("/documents", RequestOptions::get())
            .await?
            .json()?;
        Ok(docs
            .unwrap_or_default()
            .into_iter()
            .map(Document::normalized)
            .collect())
    }

    pub async fn get(&self, id: &str) -> Result<Document, ClientError> {
        let doc: Document = self
            .exec
            .execute(&format!("/documents/{id}"), RequestOptions::get())
            .await?
            .json()?;
        Ok(doc.normalized())
    }

    pub async fn upload(
        &self,
        filename: &str,
        content_type: &str,
        content: impl Into<Bytes>,
    ) -> Result<Document, ClientError> {
        let part = MultipartPart::file("file", filename, content_type, content);
        let resp: UploadResponse = self
            .exec
            .execute("/documents", RequestOptions::post_multipart(vec![part]))
            .await?
            .json()?;
        let doc = resp.into_document().normalized();
        info!(id = %doc.id, filename = %doc.filename, "document uploaded");
        Ok(doc)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ClientError> {
        self.exec
            .execute(&format!("/documents/{id}"), RequestOptions::delete())
            .await?;
        info!(id, "document deleted");
        Ok(())
    }

    /// Requeue a single document for processing.
    pub async fn process(&self, id: &str) -> Result<Document, ClientError> {
        let doc: Document = self
            .exec
            .execute(&format!("/documents/{id}/process"), RequestOptions::post())
            .await?
            .json()?;
        Ok(doc.normalized())
    }

    pub async fn process_batch(
        &self,
        stage: BatchStage,
        ids: Vec<String>,
    ) -> Result<BatchResponse, ClientError> {
        let body = serde_json::to_value(BatchRequest { document_ids: ids })?;
        let resp: Option<BatchResponse> = self
            .exec
            .execute(stage.path(), RequestOptions::post_json(body))
            .await?
            .json()?;
        Ok(resp.unwrap_or_default())
    }

    pub async fn fetch_binary(&self, id: &str, variant: BinaryVariant) -> Result<Bytes, ClientError> {
        self.exec
            .execute_bytes(
                &format!("/documents/{id}/binary?variant={}", variant.as_str()),
                RequestOptions::get().accept("image/*"),
            )
            .await
    }
}
