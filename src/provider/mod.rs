//! Generative-text provider abstraction.
//!
//! The engine only sees the [`TextGenerator`] trait; the concrete
//! [`GeminiClient`] lives behind it so tests can substitute a stub.

mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::ProviderResult;

/// Stream of generated text chunks.
pub type TextStream = BoxStream<'static, ProviderResult<String>>;

/// A text-generation backend the engine prompts for replies and summaries.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a complete reply for a prompt.
    async fn complete(&self, prompt: &str) -> ProviderResult<String>;

    /// Generate a reply as a stream of text chunks.
    async fn stream(&self, prompt: &str) -> ProviderResult<TextStream>;
}
