//! File analysis: a language-aware structural outline of one source file.
//!
//! The [`FileAnalyzer`] is the default [`Analyzer`] used by the pager for
//! filesystem sources. It reads the file named by the unit payload, parses it
//! with tree-sitter and returns a [`FileOutline`] as JSON.

mod cache;
mod parser;
mod rules;

pub use cache::{AnalysisCache, MemoryCache};
pub use parser::SourceParser;
pub use rules::LanguageRules;

use crate::{AnalysisUnit, Analyzer, Result, UnitError};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// The language type supported by the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageType {
    /// Rust language
    Rust,
    /// Python language
    Python,
    /// TypeScript and JavaScript
    TypeScript,
    /// Go language
    Go,
    /// C and C++
    Cpp,
    /// Unknown language (used for unsupported extensions)
    Unknown,
}

impl LanguageType {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("rs") => LanguageType::Rust,
            Some("py") => LanguageType::Python,
            Some("ts" | "tsx" | "js" | "jsx" | "mjs") => LanguageType::TypeScript,
            Some("go") => LanguageType::Go,
            Some("c" | "h" | "cpp" | "hpp" | "cc" | "cxx") => LanguageType::Cpp,
            _ => LanguageType::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LanguageType::Rust => "rust",
            LanguageType::Python => "python",
            LanguageType::TypeScript => "typescript",
            LanguageType::Go => "go",
            LanguageType::Cpp => "cpp",
            LanguageType::Unknown => "unknown",
        }
    }
}

/// Kind of a declaration found in a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Struct,
    Enum,
    Trait,
    Impl,
    Module,
    TypeAlias,
    Constant,
    Macro,
    Class,
}

/// A named declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: String,
    /// 1-based line of the declaration
    pub line: usize,
    /// Nesting depth, 0 for top-level declarations
    pub depth: usize,
}

/// Structural outline of one file, the content of a successful unit result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutline {
    pub language: LanguageType,
    pub lines: usize,
    pub blank_lines: usize,
    pub comment_lines: usize,
    pub bytes: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub has_syntax_errors: bool,
    pub imports: Vec<String>,
    pub symbols: Vec<Symbol>,
}

impl FileOutline {
    pub fn new(language: LanguageType) -> Self {
        Self {
            language,
            lines: 0,
            blank_lines: 0,
            comment_lines: 0,
            bytes: 0,
            has_syntax_errors: false,
            imports: Vec::new(),
            symbols: Vec::new(),
        }
    }

    /// Build the outline of `source`, parsing it when a grammar is available.
    pub fn from_source(language: LanguageType, source: &str) -> Result<Self> {
        let rules = LanguageRules::for_language(language);
        let mut outline = Self::new(language);
        outline.bytes = source.len();
        for line in source.lines() {
            outline.lines += 1;
            if line.trim().is_empty() {
                outline.blank_lines += 1;
            } else if rules.is_comment_line(line) {
                outline.comment_lines += 1;
            }
        }

        if language != LanguageType::Unknown {
            SourceParser::try_new(language)?.outline(source, &mut outline)?;
        }
        Ok(outline)
    }
}

/// Analyzer for units whose payload is a path to a source file.
///
/// Files larger than `max_file_size` are not read and fail with
/// [`UnitError::Skipped`]. Outlines are keyed by a SHA-256 of the file bytes
/// when a cache is attached, so unchanged files are parsed once.
pub struct FileAnalyzer {
    max_file_size: u64,
    cache: Option<Arc<dyn AnalysisCache>>,
}

impl FileAnalyzer {
    pub fn new(max_file_size: u64) -> Self {
        Self {
            max_file_size,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn AnalysisCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

#[async_trait]
impl Analyzer for FileAnalyzer {
    async fn analyze(&self, unit: &AnalysisUnit) -> std::result::Result<Value, UnitError> {
        let path = Path::new(&unit.payload);
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() > self.max_file_size {
            return Err(UnitError::Skipped(format!(
                "file is {} bytes, limit is {}",
                metadata.len(),
                self.max_file_size
            )));
        }

        let bytes = tokio::fs::read(path).await?;
        let language = LanguageType::from_path(path);
        let key = format!("{}:{:x}", language.name(), Sha256::digest(&bytes));
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            tracing::trace!(unit = %unit.id, "analysis cache hit");
            return Ok(cached);
        }

        let start = Instant::now();
        let outline = tokio::task::spawn_blocking(move || {
            let source = String::from_utf8_lossy(&bytes);
            FileOutline::from_source(language, &source)
        })
        .await
        .map_err(|e| UnitError::Panicked(e.to_string()))?
        .map_err(|e| UnitError::Analysis(e.to_string()))?;

        tracing::debug!(
            unit = %unit.id,
            language = language.name(),
            symbols = outline.symbols.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "parsed file"
        );

        let value =
            serde_json::to_value(&outline).map_err(|e| UnitError::InvalidOutput(e.to_string()))?;
        if let Some(cache) = &self.cache {
            cache.put(key, value.clone());
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_language_from_path() {
        assert_eq!(LanguageType::from_path(Path::new("a/b.rs")), LanguageType::Rust);
        assert_eq!(LanguageType::from_path(Path::new("x.tsx")), LanguageType::TypeScript);
        assert_eq!(LanguageType::from_path(Path::new("x.hpp")), LanguageType::Cpp);
        assert_eq!(LanguageType::from_path(Path::new("Makefile")), LanguageType::Unknown);
    }

    #[test]
    fn test_line_counts() {
        let outline =
            FileOutline::from_source(LanguageType::Rust, "// header\n\nfn a() {}\n").unwrap();
        assert_eq!(outline.lines, 3);
        assert_eq!(outline.blank_lines, 1);
        assert_eq!(outline.comment_lines, 1);
        assert_eq!(outline.symbols.len(), 1);

        let outline = FileOutline::from_source(LanguageType::Unknown, "a\n# b\n").unwrap();
        assert_eq!(outline.comment_lines, 1);
        assert!(outline.symbols.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_file_with_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.rs");
        fs::write(&path, "pub struct Point;\npub fn origin() -> Point { Point }\n").unwrap();

        let cache = Arc::new(MemoryCache::default());
        let analyzer = FileAnalyzer::new(1024).with_cache(cache.clone());
        let unit = AnalysisUnit::new("lib.rs", 0, path.display().to_string());

        let first = analyzer.analyze(&unit).await.unwrap();
        assert_eq!(first["language"], "rust");
        assert_eq!(first["symbols"][0]["name"], "Point");
        assert_eq!(first["symbols"][1]["kind"], "function");
        assert_eq!(cache.len(), 1);

        let second = analyzer.analyze(&unit).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.py");
        fs::write(&path, "x = 1\n".repeat(100)).unwrap();

        let analyzer = FileAnalyzer::new(10);
        let unit = AnalysisUnit::new("big.py", 0, path.display().to_string());
        assert!(matches!(
            analyzer.analyze(&unit).await,
            Err(UnitError::Skipped(_))
        ));

        let missing = AnalysisUnit::new("gone.py", 1, dir.path().join("gone.py").display().to_string());
        assert!(matches!(
            analyzer.analyze(&missing).await,
            Err(UnitError::Io(_))
        ));
    }
}
