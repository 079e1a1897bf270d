// Public modules
pub mod chat_request;
pub mod chat_response;
pub mod message;

// Re-exports
pub use chat_request::{ChatRequest, GenerationOptions};
pub use chat_response::{ChatResponse, ResponseMessage};
pub use message::{Message, Role};
