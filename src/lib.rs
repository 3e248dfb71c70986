pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod service;
pub mod types;

pub use auth::{CredentialPair, Session};
pub use client::OcrClient;
pub use error::ClientError;
