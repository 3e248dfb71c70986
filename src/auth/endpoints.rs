use crate::auth::credentials::CredentialPair;
use crate::error::RefreshFailure;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const REFRESH_PATH: &str = "/auth/refresh";

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Stateless token endpoint calls.
pub(crate) struct AuthEndpoints;

impl AuthEndpoints {
    /// Exchange the refresh token for a new pair. Never retried.
    pub(crate) async fn refresh_tokens(
        http_client: &reqwest::Client,
        api_root: &str,
        refresh_token: &str,
    ) -> Result<CredentialPair, RefreshFailure> {
        let resp = http_client
            .post(format!("{api_root}{REFRESH_PATH}"))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RefreshFailure::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "refresh endpoint rejected token");
            return Err(RefreshFailure::Rejected(status));
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|_| RefreshFailure::InvalidPayload)?;
        let pair = CredentialPair::from_payload(&payload).map_err(|_| RefreshFailure::InvalidPayload)?;
        info!("Access token refreshed successfully");
        Ok(pair)
    }
}
