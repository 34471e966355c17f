//! Export of a whole paginated run as a document.

mod json;
mod markdown;

pub use json::JsonRenderer;
pub use markdown::MarkdownRenderer;

use crate::{AnalysisRun, Chunk, Error, Result};
use std::fmt;
use std::str::FromStr;

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Markdown,
    Json,
}

impl ExportFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "markdown",
            ExportFormat::Json => "json",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "json" => Ok(ExportFormat::Json),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Turns the chunks of a finished run into bytes.
pub trait Renderer: Send + Sync {
    fn format(&self) -> ExportFormat;

    fn render(&self, run: &AnalysisRun, chunks: &[Chunk<'_>]) -> Result<Vec<u8>>;
}

pub fn renderer_for(format: ExportFormat) -> Box<dyn Renderer> {
    match format {
        ExportFormat::Markdown => Box::new(MarkdownRenderer),
        ExportFormat::Json => Box::new(JsonRenderer),
    }
}
