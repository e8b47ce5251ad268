pub mod chat;
pub mod completion;
pub mod status;

pub use chat::{ChatRequest, ChatResponse};
pub use completion::{Choice, CompletionRequest, CompletionResponse, FinishReason, Usage};
pub use status::StatusResponse;
