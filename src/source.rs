use crate::{AnalysisUnit, Error, LanguageType, Result, UnitError};
use async_trait::async_trait;
use ignore::WalkBuilder;
use serde_json::Value;
use std::future::Future;
use std::path::{Component, Path, PathBuf};

/// Produces the ordered units of one analysis run.
///
/// Ordinals must be dense (`0..N-1`) and follow the returned order. Ids must be
/// unique within the run and stable across runs over the same source.
pub trait UnitSource: Send + Sync {
    /// Human readable description of the source (a path, a URL)
    fn describe(&self) -> String;

    /// Enumerate the units in source order
    fn units(&self) -> Result<Vec<AnalysisUnit>>;
}

/// Units held in memory, already in source order.
impl UnitSource for Vec<AnalysisUnit> {
    fn describe(&self) -> String {
        format!("memory ({} units)", self.len())
    }

    fn units(&self) -> Result<Vec<AnalysisUnit>> {
        for (expected, unit) in self.iter().enumerate() {
            if unit.ordinal != expected {
                return Err(Error::InvalidInput(format!(
                    "unit {} has ordinal {}, expected {}",
                    unit.id, unit.ordinal, expected
                )));
            }
        }
        Ok(self.clone())
    }
}

/// Analyzes a single unit.
///
/// This is the only capability the coordinator needs: it never branches on
/// language or source kind. A failure is returned as a [`UnitError`] and stays
/// confined to the unit.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, unit: &AnalysisUnit) -> std::result::Result<Value, UnitError>;
}

/// Adapter turning an async closure into an [`Analyzer`].
pub struct FnAnalyzer<F> {
    f: F,
}

/// Build an [`Analyzer`] from a closure.
///
/// # Examples
///
/// ```
/// use codepager::{analyzer_fn, AnalysisUnit, Analyzer};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let analyzer = analyzer_fn(|unit: AnalysisUnit| async move { Ok(json!({ "id": unit.id })) });
/// let content = analyzer.analyze(&AnalysisUnit::new("a", 0, "a")).await.unwrap();
/// assert_eq!(content["id"], "a");
/// # }
/// ```
pub fn analyzer_fn<F, Fut>(f: F) -> FnAnalyzer<F>
where
    F: Fn(AnalysisUnit) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Value, UnitError>> + Send,
{
    FnAnalyzer { f }
}

#[async_trait]
impl<F, Fut> Analyzer for FnAnalyzer<F>
where
    F: Fn(AnalysisUnit) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Value, UnitError>> + Send,
{
    async fn analyze(&self, unit: &AnalysisUnit) -> std::result::Result<Value, UnitError> {
        (self.f)(unit.clone()).await
    }
}

/// Units from a local directory tree, one per file.
///
/// The walk honors `.gitignore` files. Files are ordered by their path relative
/// to the root; the affinity key of a file is its parent directory.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
    ignore_dirs: Vec<String>,
    include_unknown: bool,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignore_dirs: Vec::new(),
            include_unknown: false,
        }
    }

    pub fn with_ignore_dirs(mut self, dirs: Vec<String>) -> Self {
        self.ignore_dirs = dirs;
        self
    }

    pub fn with_unknown_languages(mut self, include: bool) -> Self {
        self.include_unknown = include;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_ignored(&self, relative: &Path) -> bool {
        relative.components().any(|component| match component {
            Component::Normal(name) => self
                .ignore_dirs
                .iter()
                .any(|dir| name.to_str() == Some(dir.as_str())),
            _ => false,
        })
    }
}

impl UnitSource for FsSource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn units(&self) -> Result<Vec<AnalysisUnit>> {
        if !self.root.exists() {
            return Err(Error::DirectoryNotFound(self.root.clone()));
        }
        if !self.root.is_dir() {
            return Err(Error::Configuration(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        let mut files = Vec::new();
        for entry in WalkBuilder::new(&self.root).build().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            if self.is_ignored(relative) {
                continue;
            }
            if !self.include_unknown && LanguageType::from_path(path) == LanguageType::Unknown {
                continue;
            }
            // Empty files carry nothing to analyze
            if entry.metadata().map(|m| m.len() == 0).unwrap_or(true) {
                continue;
            }
            files.push((relative.to_path_buf(), path.to_path_buf()));
        }

        files.sort_by(|a, b| a.0.cmp(&b.0));

        let units = files
            .into_iter()
            .enumerate()
            .map(|(ordinal, (relative, absolute))| {
                let affinity = relative
                    .parent()
                    .map(slash_path)
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| ".".to_string());
                AnalysisUnit::new(
                    slash_path(&relative),
                    ordinal,
                    absolute.display().to_string(),
                )
                .with_affinity(affinity)
            })
            .collect::<Vec<_>>();

        tracing::debug!(root = %self.root.display(), units = units.len(), "enumerated units");
        Ok(units)
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
