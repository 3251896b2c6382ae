//! Configuration settings and validation.

use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for ragsync.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for the `SQLite` database.
    pub data_dir: PathBuf,

    /// Default directory scanned when no path is given.
    pub documents_dir: PathBuf,

    /// Name of the document (chunk) collection.
    pub collection_name: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Target chunk size in characters.
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,

    /// Supported file extensions, lower-case with leading dot.
    pub supported_extensions: Vec<String>,

    /// Files above this size are skipped.
    pub max_file_size_mb: u64,

    /// Walk subdirectories during enumeration.
    pub recursive: bool,

    /// Number of files processed concurrently during a pass.
    pub sync_concurrency: usize,

    /// Embedding vector dimension.
    pub embedding_dim: usize,

    /// Retrieval count for ordinary queries.
    pub similarity_k: usize,

    /// Retrieval count for complex queries.
    pub similarity_k_complex: usize,

    /// Hard cap on retrieval count.
    pub max_results: usize,

    /// Minimum question length in characters.
    pub min_question_length: usize,

    /// Maximum question length in characters.
    pub max_question_length: usize,

    /// Language model identifier.
    pub model: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Token budget for standard prompts.
    pub max_tokens: u32,

    /// Token budget for complex prompts.
    pub max_tokens_complex: u32,

    /// Estimated prompt words above which the complex budget applies.
    pub complex_prompt_words: usize,

    /// Language model API base URL.
    pub api_base_url: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Retries for transient generation failures.
    pub max_retries: u32,

    /// Base delay between retries in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            documents_dir: PathBuf::from("./source_documents"),
            collection_name: "documents".to_string(),
            log_level: "info".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            supported_extensions: vec![".pdf".to_string(), ".txt".to_string(), ".md".to_string()],
            max_file_size_mb: 50,
            recursive: false,
            sync_concurrency: std::thread::available_parallelism()
                .map(|n| n.get().min(4))
                .unwrap_or(4),
            embedding_dim: crate::embeddings::DEFAULT_EMBEDDING_DIM,
            similarity_k: 3,
            similarity_k_complex: 5,
            max_results: 8,
            min_question_length: 3,
            max_question_length: 1000,
            model: "claude-3-haiku-20240307".to_string(),
            temperature: 0.1,
            max_tokens: 800,
            max_tokens_complex: 1200,
            complex_prompt_words: 300,
            api_base_url: "https://api.anthropic.com".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            request_timeout_secs: 60,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size cannot be 0"));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }

        if self.supported_extensions.is_empty() {
            return Err(Error::config("supported_extensions cannot be empty"));
        }

        if let Some(ext) = self
            .supported_extensions
            .iter()
            .find(|e| !e.starts_with('.') || e.len() < 2)
        {
            return Err(Error::config(format!(
                "extension '{ext}' must start with '.'"
            )));
        }

        if self.sync_concurrency == 0 {
            return Err(Error::config("sync_concurrency cannot be 0"));
        }

        if self.sync_concurrency > 32 {
            return Err(Error::config("sync_concurrency cannot exceed 32"));
        }

        if self.embedding_dim == 0 {
            return Err(Error::config("embedding_dim cannot be 0"));
        }

        if self.similarity_k == 0 || self.similarity_k_complex == 0 {
            return Err(Error::config("retrieval k cannot be 0"));
        }

        if self.max_results < self.similarity_k {
            return Err(Error::config("max_results cannot be below similarity_k"));
        }

        if self.min_question_length > self.max_question_length {
            return Err(Error::config(
                "min_question_length cannot exceed max_question_length",
            ));
        }

        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(Error::config("temperature must be within 0.0..=1.0"));
        }

        if self.max_tokens == 0 || self.max_tokens_complex < self.max_tokens {
            return Err(Error::config(
                "max_tokens must be positive and not exceed max_tokens_complex",
            ));
        }

        if self.collection_name.is_empty() {
            return Err(Error::config("collection_name cannot be empty"));
        }

        Ok(())
    }

    /// Get the path to the `SQLite` database file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("ragsync.db")
    }

    /// Maximum file size in bytes.
    #[must_use]
    pub const fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base delay between generation retries.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.similarity_k, 3);
        assert_eq!(config.max_results, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_new() {
        let config = Config::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = Config {
            log_level: "invalid".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log level"));
    }

    #[test]
    fn test_validate_overlap_not_below_size() {
        let config = Config {
            chunk_size: 100,
            chunk_overlap: 100,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_validate_zero_chunk_size() {
        let config = Config {
            chunk_size: 0,
            chunk_overlap: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_extension_without_dot() {
        let config = Config {
            supported_extensions: vec!["txt".to_string()],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("txt"));
    }

    #[test]
    fn test_validate_concurrency_bounds() {
        let config = Config {
            sync_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            sync_concurrency: 100,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("32"));
    }

    #[test]
    fn test_validate_token_budgets() {
        let config = Config {
            max_tokens: 2000,
            max_tokens_complex: 1000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_path() {
        let config = Config {
            data_dir: PathBuf::from("/var/lib/ragsync"),
            ..Default::default()
        };
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/ragsync/ragsync.db")
        );
    }

    #[test]
    fn test_max_file_size_bytes() {
        let config = Config {
            max_file_size_mb: 2,
            ..Default::default()
        };
        assert_eq!(config.max_file_size_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_log_level_case_insensitive() {
        for level in ["TRACE", "Debug", "INFO", "Warn", "ERROR"] {
            let config = Config {
                log_level: level.to_string(),
                ..Default::default()
            };
            assert!(
                config.validate().is_ok(),
                "Level '{level}' should be valid (case insensitive)"
            );
        }
    }
}
