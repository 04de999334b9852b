pub mod ollama;
pub mod retry;
pub mod types;

pub use ollama::{OllamaClient, TransportSettings};
pub use retry::RetryPolicy;
pub use types::GenerateRequest;

use crate::core::error::ChatError;
use crate::stream::StreamHandle;
use async_trait::async_trait;

/// HTTP access to the inference server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Names of the models the server can run. Applies the retry policy.
    async fn list_models(&self) -> Result<Vec<String>, ChatError>;

    /// Starts a streamed generation. Never retried.
    async fn generate(&self, request: &GenerateRequest) -> Result<StreamHandle, ChatError>;
}
