//! Query validation, retrieval and question answering.

use std::sync::Arc;

use super::chain::RagChain;
use crate::config::Config;
use crate::storage::{QueryHit, VectorIndex};
use crate::{Error, Result};

/// Words that mark a question as needing wider retrieval.
const COMPLEX_KEYWORDS: [&str; 5] = ["compare", "analyze", "explain", "detailed", "comprehensive"];

/// Questions longer than this many words are complex.
const COMPLEX_WORD_COUNT: usize = 10;

/// Whether `query` is long or asks for analysis.
#[must_use]
pub fn is_complex_query(query: &str) -> bool {
    if query.split_whitespace().count() > COMPLEX_WORD_COUNT {
        return true;
    }
    let lower = query.to_lowercase();
    COMPLEX_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Generated answer with the chunks it was grounded on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    pub sources: Vec<QueryHit>,
}

/// Retrieval over a [`VectorIndex`], optionally backed by a [`RagChain`].
#[derive(Clone)]
pub struct Searcher {
    index: Arc<dyn VectorIndex>,
    chain: Option<RagChain>,
    similarity_k: usize,
    similarity_k_complex: usize,
    max_results: usize,
    min_question_length: usize,
    max_question_length: usize,
}

impl Searcher {
    /// Retrieval-only searcher.
    #[must_use]
    pub fn new(index: Arc<dyn VectorIndex>, config: &Config) -> Self {
        Self {
            index,
            chain: None,
            similarity_k: config.similarity_k,
            similarity_k_complex: config.similarity_k_complex,
            max_results: config.max_results,
            min_question_length: config.min_question_length,
            max_question_length: config.max_question_length,
        }
    }

    /// Attach a chain so [`Searcher::ask`] can generate answers.
    #[must_use]
    pub fn with_chain(mut self, chain: RagChain) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Reject empty, too short or too long queries.
    ///
    /// Returns the trimmed query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidQuery`] describing the problem.
    pub fn validate_query<'a>(&self, query: &'a str) -> Result<&'a str> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidQuery("question cannot be empty".into()));
        }

        let len = trimmed.chars().count();
        if len < self.min_question_length {
            return Err(Error::InvalidQuery(format!(
                "question too short (minimum {} characters)",
                self.min_question_length
            )));
        }
        if len > self.max_question_length {
            return Err(Error::InvalidQuery(format!(
                "question too long (maximum {} characters)",
                self.max_question_length
            )));
        }

        Ok(trimmed)
    }

    /// Number of chunks to retrieve: `requested` or the heuristic choice,
    /// capped at the configured maximum.
    #[must_use]
    pub fn retrieval_k(&self, query: &str, requested: Option<usize>) -> usize {
        let k = requested.unwrap_or_else(|| {
            if is_complex_query(query) {
                self.similarity_k_complex
            } else {
                self.similarity_k
            }
        });
        k.min(self.max_results)
    }

    /// Chunks most similar to `query`, closest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidQuery`] for a rejected query and any index
    /// failure.
    pub async fn search(&self, query: &str, k: Option<usize>) -> Result<Vec<QueryHit>> {
        let query = self.validate_query(query)?.to_string();
        let k = self.retrieval_k(&query, k);

        let index = Arc::clone(&self.index);
        let lookup = query.clone();
        let hits = tokio::task::spawn_blocking(move || index.query(&lookup, k))
            .await
            .map_err(|e| Error::internal(format!("search task failed: {e}")))??;

        tracing::debug!(query = %query, k, hits = hits.len(), "Search complete");
        Ok(hits)
    }

    /// Retrieve context for `question` and generate an answer.
    ///
    /// Returns `None` when nothing relevant was found. A failed generation
    /// still yields an [`Answer`] whose text reports the failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no chain is attached, and any
    /// validation or retrieval failure.
    pub async fn ask(&self, question: &str) -> Result<Option<Answer>> {
        let chain = self
            .chain
            .as_ref()
            .ok_or_else(|| Error::config("no language model configured"))?;

        let question = self.validate_query(question)?;
        let hits = self.search(question, None).await?;
        if hits.is_empty() {
            tracing::info!(question = %question, "No relevant context found");
            return Ok(None);
        }

        let answer = chain
            .generate(question, &hits, is_complex_query(question))
            .await;

        Ok(Some(Answer {
            question: question.to_string(),
            answer,
            sources: hits,
        }))
    }
}

impl std::fmt::Debug for Searcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Searcher")
            .field("collection", &self.index.name())
            .field("chain", &self.chain)
            .field("max_results", &self.max_results)
            .finish_non_exhaustive()
    }
}
