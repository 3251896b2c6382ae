//! Retrieval and answer generation over the synchronized index.
//!
//! Sits outside the synchronization core: it only reads the vector index.

mod chain;
mod llm;
mod searcher;

pub use chain::{format_context, user_prompt, RagChain, SYSTEM_PROMPT};
pub use llm::{AnthropicClient, CompletionRequest, LanguageModel};
pub use searcher::{is_complex_query, Answer, Searcher};
