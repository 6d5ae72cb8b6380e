//! Crate-wide error taxonomy.
//!
//! `XmlSkip` and in-budget `CopyTransient` failures are deliberately not
//! represented here: both are routine at scale and are folded into
//! [`crate::metrics::SharedMetrics`] counters rather than propagated as
//! errors. Only conditions that should stop the pipeline get a variant.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("environment variable {name} must be an integer, got {value:?}")]
    InvalidEnvInt { name: &'static str, value: String },

    #[error("config file {path} could not be read: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is not valid TOML: {source}")]
    FileParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("DATABASE_URL is invalid: {0}")]
    InvalidDatabaseUrl(String),
}

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml source {path} could not be opened: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("xml well-formedness error in {path} at byte {offset}: {source}")]
    Malformed {
        path: PathBuf,
        offset: usize,
        #[source]
        source: quick_xml::Error,
    },
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("copy to {table} failed: {source}")]
    Transient {
        table: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("copy to {table} exhausted {retries} retries, last error: {source}")]
    Exhausted {
        table: String,
        retries: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
