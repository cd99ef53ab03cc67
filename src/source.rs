use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use tracing::debug;

use crate::{error::BotTestError, types::TestCaseRecord};

#[async_trait]
pub trait TestCaseSource: Send + Sync {
    async fn test_cases(&self) -> Result<Vec<TestCaseRecord>, BotTestError>;
}

/// Records held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    records: Vec<TestCaseRecord>,
}

impl StaticSource {
    pub fn new(records: Vec<TestCaseRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl TestCaseSource for StaticSource {
    async fn test_cases(&self) -> Result<Vec<TestCaseRecord>, BotTestError> {
        Ok(self.records.clone())
    }
}

/// Suite file or directory of suite files, re-read on every call.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TestCaseSource for FileSource {
    async fn test_cases(&self) -> Result<Vec<TestCaseRecord>, BotTestError> {
        load_records(&self.path)
    }
}

/// Loads records from a yaml/yml/json file, or from every such file in a
/// directory in file name order.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<TestCaseRecord>, BotTestError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(BotTestError::Source(format!("{} does not exist", path.display())));
    }
    if !path.is_dir() {
        return parse_file(path);
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(path)? {
        let p = entry?.path();
        let ext = p.extension().and_then(|s| s.to_str()).unwrap_or("");
        if matches!(ext, "yaml" | "yml" | "json") {
            files.push(p);
        }
    }
    files.sort();

    let mut records = Vec::new();
    for file in files {
        records.extend(parse_file(&file)?);
    }
    Ok(records)
}

fn parse_file(path: &Path) -> Result<Vec<TestCaseRecord>, BotTestError> {
    let bytes = fs::read(path)?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    let records: Vec<TestCaseRecord> = if ext == "json" {
        serde_json::from_slice(&bytes)?
    } else {
        serde_yaml::from_slice(&bytes)?
    };
    debug!(path = %path.display(), records = records.len(), "loaded suite file");
    Ok(records)
}

/// Where test cases come from: one source, or one per language.
#[derive(Clone)]
pub enum SourceRegistry {
    Single(Arc<dyn TestCaseSource>),
    ByLanguage(Vec<(String, Arc<dyn TestCaseSource>)>),
}

impl SourceRegistry {
    pub fn single(source: impl TestCaseSource + 'static) -> Self {
        SourceRegistry::Single(Arc::new(source))
    }

    pub fn by_language() -> Self {
        SourceRegistry::ByLanguage(Vec::new())
    }

    /// Registers a language source. Converts a single-source registry into a
    /// language-keyed one.
    pub fn with_language(self, lang: impl Into<String>, source: impl TestCaseSource + 'static) -> Self {
        let lang = lang.into();
        let source: Arc<dyn TestCaseSource> = Arc::new(source);
        let mut entries = match self {
            SourceRegistry::Single(_) => Vec::new(),
            SourceRegistry::ByLanguage(entries) => entries,
        };
        match entries.iter_mut().find(|(key, _)| *key == lang) {
            Some(entry) => entry.1 = source,
            None => entries.push((lang, source)),
        }
        SourceRegistry::ByLanguage(entries)
    }

    pub fn languages(&self) -> Vec<&str> {
        match self {
            SourceRegistry::Single(_) => Vec::new(),
            SourceRegistry::ByLanguage(entries) => entries.iter().map(|(lang, _)| lang.as_str()).collect(),
        }
    }

    /// Picks the source for `lang`, falling back to the first registered language.
    pub fn resolve(&self, lang: Option<&str>) -> Result<Arc<dyn TestCaseSource>, BotTestError> {
        match self {
            SourceRegistry::Single(source) => Ok(Arc::clone(source)),
            SourceRegistry::ByLanguage(entries) => {
                if let Some((_, source)) = lang.and_then(|lang| entries.iter().find(|(key, _)| key == lang)) {
                    return Ok(Arc::clone(source));
                }
                let (first, source) = entries.first().ok_or(BotTestError::NoSource)?;
                debug!(requested = ?lang, fallback = %first, "using first registered test case source");
                Ok(Arc::clone(source))
            }
        }
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceRegistry::Single(_) => f.write_str("SourceRegistry::Single"),
            SourceRegistry::ByLanguage(_) => f
                .debug_tuple("SourceRegistry::ByLanguage")
                .field(&self.languages())
                .finish(),
        }
    }
}
