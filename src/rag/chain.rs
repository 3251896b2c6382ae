//! Prompt assembly and answer generation.

use std::sync::Arc;

use super::llm::{CompletionRequest, LanguageModel};
use crate::config::Config;
use crate::storage::QueryHit;

/// System prompt sent with every question.
pub const SYSTEM_PROMPT: &str = "Answer using the provided context. Say \"I don't know\" if the context doesn't contain the answer. Be concise.";

const UNKNOWN_SOURCE: &str = "Unknown source";

/// Number the retrieved chunks and join them into one context block.
///
/// Each entry reads `[i] source:\ncontent\n`, numbered from 1.
#[must_use]
pub fn format_context(hits: &[QueryHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let source = if hit.metadata.source.is_empty() {
                UNKNOWN_SOURCE
            } else {
                hit.metadata.source.as_str()
            };
            format!("[{}] {}:\n{}\n", i + 1, source, hit.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// User prompt for `question` over `context`.
#[must_use]
pub fn user_prompt(context: &str, question: &str) -> String {
    format!("Context:\n{context}\n\nQ: {question}")
}

/// Builds prompts and calls the language model.
#[derive(Clone)]
pub struct RagChain {
    llm: Arc<dyn LanguageModel>,
    temperature: f32,
    max_tokens: u32,
    max_tokens_complex: u32,
    complex_prompt_words: usize,
}

impl RagChain {
    /// Chain over `llm`, taking temperature and token budgets from `config`.
    #[must_use]
    pub fn new(llm: Arc<dyn LanguageModel>, config: &Config) -> Self {
        Self {
            llm,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_tokens_complex: config.max_tokens_complex,
            complex_prompt_words: config.complex_prompt_words,
        }
    }

    /// Model behind this chain.
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Output budget: the complex tier when the question is complex or
    /// the prompt estimate (context words plus question words) exceeds the
    /// threshold.
    #[must_use]
    pub fn token_budget(&self, context: &str, question: &str, complex: bool) -> u32 {
        let estimated = context.split_whitespace().count() + question.split_whitespace().count();
        if complex || estimated > self.complex_prompt_words {
            self.max_tokens_complex
        } else {
            self.max_tokens
        }
    }

    /// Answer `question` from `hits`.
    ///
    /// Generation failures do not propagate; the answer text carries the
    /// error instead.
    pub async fn generate(&self, question: &str, hits: &[QueryHit], complex: bool) -> String {
        let context = format_context(hits);
        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            max_tokens: self.token_budget(&context, question, complex),
            temperature: self.temperature,
            user: user_prompt(&context, question),
        };

        tracing::debug!(
            model = self.llm.model_name(),
            chunks = hits.len(),
            max_tokens = request.max_tokens,
            "Generating answer"
        );

        match self.llm.complete(&request).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Answer generation failed");
                format!("Error generating response: {e}")
            }
        }
    }
}

impl std::fmt::Debug for RagChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagChain")
            .field("model", &self.llm.model_name())
            .field("max_tokens", &self.max_tokens)
            .field("max_tokens_complex", &self.max_tokens_complex)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::storage::ChunkMetadata;
    use crate::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records requests and replies with a fixed result.
    struct Recorder {
        reply: std::result::Result<String, u16>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LanguageModel for Recorder {
        fn model_name(&self) -> &str {
            "recorder"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.seen.lock().push(request.clone());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(GenerationError::Api {
                    status: *status,
                    body: "nope".into(),
                }
                .into()),
            }
        }
    }

    fn hit(source: &str, content: &str) -> QueryHit {
        QueryHit {
            id: "id".into(),
            content: content.into(),
            metadata: ChunkMetadata {
                file_id: "f".into(),
                source: source.into(),
                chunk_id: 0,
                chunk_size: content.len(),
                page: None,
            },
            distance: 0.5,
        }
    }

    fn chain(reply: std::result::Result<String, u16>) -> (RagChain, Arc<Recorder>) {
        let recorder = Arc::new(Recorder {
            reply,
            seen: Mutex::new(Vec::new()),
        });
        let chain = RagChain::new(recorder.clone(), &Config::default());
        (chain, recorder)
    }

    #[test]
    fn test_format_context() {
        let context = format_context(&[hit("/a.txt", "alpha"), hit("", "beta")]);
        assert_eq!(context, "[1] /a.txt:\nalpha\n\n[2] Unknown source:\nbeta\n");
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn test_user_prompt() {
        assert_eq!(user_prompt("ctx", "why?"), "Context:\nctx\n\nQ: why?");
    }

    #[test]
    fn test_token_budget() {
        let (chain, _) = chain(Ok(String::new()));
        let long_context = "word ".repeat(300);

        assert_eq!(chain.token_budget("short", "what is it", false), 800);
        assert_eq!(chain.token_budget("short", "what is it", true), 1200);
        assert_eq!(chain.token_budget(&long_context, "why", false), 1200);
        assert_eq!(chain.token_budget(&"word ".repeat(299), "why", false), 800);
    }

    #[tokio::test]
    async fn test_generate_sends_prompts() {
        let (chain, recorder) = chain(Ok("It is alpha.".into()));
        let answer = chain
            .generate("what is it", &[hit("/a.txt", "alpha")], false)
            .await;

        assert_eq!(answer, "It is alpha.");
        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].system, SYSTEM_PROMPT);
        assert_eq!(seen[0].user, "Context:\n[1] /a.txt:\nalpha\n\n\nQ: what is it");
        assert_eq!(seen[0].max_tokens, 800);
        assert!((seen[0].temperature - 0.1).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_generate_degrades_on_failure() {
        let (chain, _) = chain(Err(401));
        let answer = chain.generate("q", &[hit("/a.txt", "alpha")], false).await;

        assert!(answer.starts_with("Error generating response: "));
        assert!(answer.contains("401"));
    }
}
