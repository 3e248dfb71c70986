pub mod credentials;
pub mod endpoints;
pub mod refresh;
pub mod session;
pub mod store;

pub use credentials::{CredentialPair, TokenClaims};
pub use refresh::RefreshCoordinator;
pub use session::{Session, SessionManager};
pub use store::{ProfileStore, TokenStore};
