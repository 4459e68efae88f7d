//! Structured error types for the export pipeline.
//!
//! Only [`ExportError`] is fatal to a caller. Everything else is raised inside
//! a stage and either recovered (image and block failures degrade to
//! placeholders) or wrapped on the way out.

use thiserror::Error;

/// The error returned by the public export entry points.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("PDF assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Render error: {0}")]
    Render(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal failures while turning rendered pages into a PDF.
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("no pages to assemble: the document rendered zero pages")]
    NoPages,

    #[error("page {page_index} could not be embedded: {reason}")]
    Embedding { page_index: usize, reason: String },
}

/// Image resolution, fetch and decode failures. Never fatal to an export.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImageError {
    #[error("invalid image url '{0}'")]
    InvalidUrl(String),

    #[error("no fetcher can load '{0}'")]
    Unsupported(String),

    #[error("failed to fetch '{url}': {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),
}

/// A single block failed to draw. Recovered by the page renderer.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("block '{block_id}' has invalid geometry ({width}x{height})")]
    Geometry {
        block_id: String,
        width: f64,
        height: f64,
    },

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("page encoding failed: {0}")]
    Encode(String),
}

/// Document model mutation and storage failures.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("page '{0}' not found")]
    PageNotFound(String),

    #[error("block '{0}' not found")]
    BlockNotFound(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("failed to parse document: {source}{}", format_hint(.hint))]
    Storage {
        source: serde_json::Error,
        hint: String,
    },
}

/// Invalid export options or unreadable option files.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid option '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to parse options: {source}{}", format_hint(.hint))]
    Parse {
        source: serde_json::Error,
        hint: String,
    },

    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
}

fn format_hint(hint: &str) -> String {
    if hint.is_empty() {
        String::new()
    } else {
        format!("\n  Hint: {}", hint)
    }
}

/// A human hint for the common ways a JSON payload goes wrong.
pub(crate) fn json_hint(e: &serde_json::Error, schema: &str) -> String {
    match e.classify() {
        serde_json::error::Category::Syntax => {
            "Check for trailing commas, missing quotes, or unescaped characters.".to_string()
        }
        serde_json::error::Category::Data => format!(
            "The JSON is valid but doesn't match the {} schema. Check field names and types.",
            schema
        ),
        serde_json::error::Category::Eof => {
            "Unexpected end of input. Is the JSON truncated?".to_string()
        }
        serde_json::error::Category::Io => String::new(),
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        let hint = json_hint(&e, "document");
        ModelError::Storage { source: e, hint }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        let hint = json_hint(&e, "export options");
        ConfigError::Parse { source: e, hint }
    }
}
