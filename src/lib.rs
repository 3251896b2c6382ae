//! ragsync library
//!
//! Retrieval-augmented question answering over a local document folder,
//! with an incremental synchronizer that keeps the vector index in step
//! with the files on disk.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod observability;
pub mod rag;
pub mod storage;
pub mod tracker;

pub use config::Config;
pub use error::{Error, Result};
