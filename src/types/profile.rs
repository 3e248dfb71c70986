use serde::{Deserialize, Serialize};

/// Cached, informational profile of the logged-in user.
///
/// Durable form is `{"email", "fullName"}`; `full_name` is accepted on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "full_name")]
    pub full_name: String,
}

impl UserProfile {
    /// Full name, else the local part of the email, else a generic label.
    pub fn display_name(&self) -> String {
        let full_name = self.full_name.trim();
        if !full_name.is_empty() {
            return full_name.to_string();
        }
        let email = self.email.trim();
        match email.split('@').next() {
            Some(local) if !local.is_empty() => local.to_string(),
            _ => "Authenticated user".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

/// Profile returned by `POST /auth/register`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisteredUser {
    #[serde(default)]
    pub id: Option<i64>,
    pub email: String,
    #[serde(default)]
    pub full_name: String,
}

impl From<RegisteredUser> for UserProfile {
    fn from(u: RegisteredUser) -> Self {
        Self {
            email: u.email,
            full_name: u.full_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_to_email_local_part() {
        let p = UserProfile {
            email: "ada@example.com".to_string(),
            full_name: " ".to_string(),
        };
        assert_eq!(p.display_name(), "ada");
        assert_eq!(UserProfile::default().display_name(), "Authenticated user");
    }

    #[test]
    fn snake_case_full_name_is_read() {
        let p: UserProfile =
            serde_json::from_str(r#"{"email":"a@x.com","full_name":"Ada Lovelace"}"#).unwrap();
        assert_eq!(p.full_name, "Ada Lovelace");
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains(r#""fullName":"Ada Lovelace""#));
    }
}
