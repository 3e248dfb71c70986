pub mod documents;
pub mod executor;

pub use documents::DocumentsApi;
pub use executor::{MultipartPart, Payload, RequestExecutor, RequestOptions, ResponseBody};
