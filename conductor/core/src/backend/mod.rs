//! Statement Generation
//!
//! Abstracted access to the text-generation capability behind a common trait.
//!
//! # Available Generators
//!
//! - **Ollama**: Local LLM server (default)
//! - **Scripted**: Deterministic test double (`test_utils::ScriptedGenerator`,
//!   behind the `test-utils` feature)
//!
//! # Usage
//!
//! ```ignore
//! use agora_core::backend::{GenerationRequest, OllamaBackend, Role, StatementGenerator};
//!
//! let backend = OllamaBackend::new("localhost", 11434, "llama3")?;
//! let request = GenerationRequest::new(Role::Critic, "CRITIC", "rent control");
//! let note = backend.generate(&request).await?;
//! ```

mod ollama;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
mod traits;

pub use ollama::{OllamaBackend, Personas};
pub use traits::{GenerationRequest, Role, StatementGenerator};
