use crate::api::executor::{RequestExecutor, RequestOptions};
use crate::auth::credentials::CredentialPair;
use crate::auth::endpoints::{LOGIN_PATH, REGISTER_PATH};
use crate::auth::store::{ProfileStore, TokenStore};
use crate::error::ClientError;
use crate::types::{LoginRequest, RegisterRequest, RegisteredUser, UserProfile};

use serde_json::Value;
use tokio::sync::watch;
use tracing::info;

/// Snapshot of the current session. The profile is informational only.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub credentials: CredentialPair,
    pub profile: Option<UserProfile>,
}

impl Session {
    pub fn display_name(&self) -> String {
        self.profile
            .as_ref()
            .map(UserProfile::display_name)
            .unwrap_or_else(|| "Authenticated user".to_string())
    }
}

/// Login, registration and logout on top of the request executor.
#[derive(Clone)]
pub struct SessionManager {
    exec: RequestExecutor,
    profiles: ProfileStore,
}

impl SessionManager {
    pub fn new(exec: RequestExecutor, profiles: ProfileStore) -> Self {
        Self { exec, profiles }
    }

    fn tokens(&self) -> &TokenStore {
        self.exec.tokens()
    }

    pub fn session(&self) -> Option<Session> {
        self.tokens().get().map(|credentials| Session {
            credentials,
            profile: self.profiles.get(),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens().get().is_some()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.profiles.get()
    }

    pub fn watch_session(&self) -> watch::Receiver<Option<CredentialPair>> {
        self.tokens().subscribe()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let body = serde_json::to_value(LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        let payload: Value = self
            .exec
            .execute(LOGIN_PATH, RequestOptions::post_json(body).without_auth())
            .await?
            .json()?;
        let credentials = CredentialPair::from_payload(&payload)?;
        self.tokens().set(credentials.clone()).await?;

        // Keep a known full name when the cached profile belongs to the same user.
        let full_name = self
            .profiles
            .get()
            .filter(|p| p.email == email)
            .map(|p| p.full_name)
            .unwrap_or_default();
        let profile = UserProfile {
            email: email.to_string(),
            full_name,
        };
        self.profiles.set(profile.clone()).await;

        let claims = credentials.access_claims().unwrap_or_default();
        info!(
            email,
            subject = ?claims.sub,
            expires_at = ?claims.expires_at(),
            "logged in"
        );
        Ok(Session {
            credentials,
            profile: Some(profile),
        })
    }

    /// Create an account. Does not log in.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<UserProfile, ClientError> {
        let body = serde_json::to_value(RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            full_name: full_name.to_string(),
        })?;
        let created: RegisteredUser = self
            .exec
            .execute(REGISTER_PATH, RequestOptions::post_json(body).without_auth())
            .await?
            .json()?;
        let mut profile = UserProfile::from(created);
        if profile.full_name.is_empty() {
            profile.full_name = full_name.to_string();
        }
        self.profiles.set(profile.clone()).await;
        info!(email = %profile.email, "account registered");
        Ok(profile)
    }

    pub async fn logout(&self) {
        self.tokens().clear().await;
        self.profiles.clear().await;
        info!("logged out");
    }
}
