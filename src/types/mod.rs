pub mod document;
pub mod job;
pub mod profile;

pub use document::{BinaryVariant, Document, DocumentFilter, DocumentStatus, Transition};
pub use job::{BatchRequest, BatchResponse, BatchStage};
pub use profile::{LoginRequest, RegisterRequest, RegisteredUser, UserProfile};
