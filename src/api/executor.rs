use crate::auth::refresh::RefreshCoordinator;
use crate::auth::store::TokenStore;
use crate::error::ClientError;

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

/// One part of a multipart upload, owned so the request can be rebuilt for a retry.
#[derive(Debug, Clone)]
pub struct MultipartPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl MultipartPart {
    pub fn file(
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            data: data.into(),
        }
    }

    fn to_part(&self) -> Part {
        let mut part = Part::bytes(self.data.to_vec());
        if let Some(filename) = &self.filename {
            part = part.file_name(filename.clone());
        }
        match &self.content_type {
            Some(ct) => match part.mime_str(ct) {
                Ok(p) => p,
                Err(e) => {
                    warn!(content_type = %ct, error = %e, "invalid part content type; sending without it");
                    Part::bytes(self.data.to_vec())
                        .file_name(self.filename.clone().unwrap_or_default())
                }
            },
            None => part,
        }
    }
}

/// Request body. JSON is serialized by the executor; multipart passes through and
/// the transport picks the content type (with boundary).
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    Empty,
    Json(Value),
    Multipart(Vec<MultipartPart>),
}

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub payload: Payload,
    pub requires_auth: bool,
    pub allow_retry: bool,
    pub accept: Option<&'static str>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            payload: Payload::Empty,
            requires_auth: true,
            allow_retry: true,
            accept: None,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn delete() -> Self {
        Self {
            method: Method::DELETE,
            ..Self::default()
        }
    }

    pub fn post() -> Self {
        Self {
            method: Method::POST,
            ..Self::default()
        }
    }

    pub fn post_json(body: Value) -> Self {
        Self {
            method: Method::POST,
            payload: Payload::Json(body),
            ..Self::default()
        }
    }

    pub fn post_multipart(parts: Vec<MultipartPart>) -> Self {
        Self {
            method: Method::POST,
            payload: Payload::Multipart(parts),
            ..Self::default()
        }
    }

    pub fn without_auth(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.allow_retry = false;
        self
    }

    pub fn accept(mut self, accept: &'static str) -> Self {
        self.accept = Some(accept);
        self
    }
}

/// Classified success body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// 204 or an empty body.
    Empty,
    Json(Value),
    Text(String),
}

impl ResponseBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }

    /// Decode a JSON body into `T`; an empty body decodes as JSON `null`.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        match self {
            ResponseBody::Json(v) => Ok(serde_json::from_value(v)?),
            ResponseBody::Empty => Ok(serde_json::from_value(Value::Null)?),
            ResponseBody::Text(t) => Ok(serde_json::from_str(&t)?),
        }
    }
}

/// Issues API requests with bearer auth and one transparent refresh-and-retry on 401.
#[derive(Clone)]
pub struct RequestExecutor {
    http_client: reqwest::Client,
    api_root: String,
    tokens: TokenStore,
    refresher: RefreshCoordinator,
}

impl RequestExecutor {
    pub fn new(
        http_client: reqwest::Client,
        api_root: impl Into<String>,
        tokens: TokenStore,
        refresher: RefreshCoordinator,
    ) -> Self {
        Self {
            http_client,
            api_root: api_root.into(),
            tokens,
            refresher,
        }
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    pub async fn execute(&self, path: &str, opts: RequestOptions) -> Result<ResponseBody, ClientError> {
        let resp = self.send(path, &opts).await?;
        classify(resp).await
    }

    /// Like `execute`, but returns the raw body (binary downloads).
    pub async fn execute_bytes(&self, path: &str, opts: RequestOptions) -> Result<Bytes, ClientError> {
        let resp = self.send(path, &opts).await?;
        Ok(resp.bytes().await?)
    }

    async fn send(&self, path: &str, opts: &RequestOptions) -> Result<reqwest::Response, ClientError> {
        let url = Url::parse(&format!("{}{}", self.api_root, path))?;
        let mut allow_retry = opts.allow_retry;

        loop {
            let access = if opts.requires_auth {
                self.tokens.access_token()
            } else {
                None
            };
            let resp = self.dispatch(url.clone(), opts, access.as_deref()).await?;
            let status = resp.status();

            if status == StatusCode::UNAUTHORIZED
                && opts.requires_auth
                && allow_retry
                && self.tokens.has_refresh_token()
            {
                debug!(path, "401 received; refreshing session");
                match self.refresher.refresh_after(access).await {
                    Ok(_) => {
                        allow_retry = false;
                        continue;
                    }
                    Err(e) => {
                        warn!(path, error = %e, "Session refresh failed; logging out");
                        self.tokens.clear().await;
                        return Err(ClientError::SessionExpired);
                    }
                }
            }

            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                debug!(path, status = status.as_u16(), "request failed");
                return Err(ClientError::request_failed(status, body));
            }
            return Ok(resp);
        }
    }

    async fn dispatch(
        &self,
        url: Url,
        opts: &RequestOptions,
        access: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut req = self.http_client.request(opts.method.clone(), url);
        if let Some(token) = access {
            req = req.bearer_auth(token);
        }
        if let Some(accept) = opts.accept {
            req = req.header(ACCEPT, accept);
        }
        req = match &opts.payload {
            Payload::Empty => req,
            Payload::Json(body) => req.json(body),
            Payload::Multipart(parts) => {
                let form = parts
                    .iter()
                    .fold(Form::new(), |form, p| form.part(p.name.clone(), p.to_part()));
                req.multipart(form)
            }
        };
        req.send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))
    }
}

async fn classify(resp: reqwest::Response) -> Result<ResponseBody, ClientError> {
    if resp.status() == StatusCode::NO_CONTENT {
        return Ok(ResponseBody::Empty);
    }
    let is_json = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    let body = resp.bytes().await?;
    if body.is_empty() {
        return Ok(ResponseBody::Empty);
    }
    if is_json {
        Ok(ResponseBody::Json(serde_json::from_slice(&body)?))
    } else {
        Ok(ResponseBody::Text(String::from_utf8_lossy(&body).into_owned()))
    }
}
