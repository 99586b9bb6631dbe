//! Filesystem-backed [`Corpus`].
//!
//! Walks `corpus.root` recursively, applying include and exclude globs, and
//! returns every matching UTF-8 file as a [`Document`] keyed by its
//! `/`-separated path relative to the root. Matching files that cannot be
//! read are reported separately so a reindex keeps their previous entries.
//!
//! # Configuration
//!
//! ```toml
//! [corpus]
//! root = "./notes"
//! include_globs = ["**/*.md", "**/*.txt"]
//! exclude_globs = ["drafts/**"]
//! follow_symlinks = false
//! ```
//!
//! # Default Excludes
//!
//! `**/.git/**`, `**/target/**`, and `**/node_modules/**` are always
//! excluded, on top of the configured patterns.

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use notes_rag_core::corpus::{Corpus, CorpusScan, UnreadableDocument};
use notes_rag_core::models::Document;

use crate::config::CorpusConfig;

const DEFAULT_EXCLUDES: [&str; 3] = ["**/.git/**", "**/target/**", "**/node_modules/**"];

pub struct FsCorpus {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
}

impl FsCorpus {
    pub fn new(config: &CorpusConfig) -> Result<Self> {
        let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        excludes.extend(config.exclude_globs.iter().cloned());

        Ok(Self {
            root: config.root.clone(),
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&excludes)?,
            follow_symlinks: config.follow_symlinks,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a corpus-relative path passes the include/exclude filters.
    pub fn is_eligible(&self, relative: &str) -> bool {
        !self.exclude.is_match(relative) && self.include.is_match(relative)
    }

    /// Resolve a corpus-relative path, rejecting absolute paths and `..`.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let rel = Path::new(relative);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("Path escapes the corpus root: {}", relative);
        }
        Ok(self.root.join(rel))
    }

    /// Map an absolute or root-relative filesystem path to its corpus path.
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = if path.is_absolute() || path.starts_with(&self.root) {
            path.strip_prefix(&self.root).ok()?
        } else {
            path
        };
        Some(normalize(relative))
    }

    /// Read one document with its modification time, or `None` if the
    /// file no longer exists.
    pub async fn read_path(&self, relative: &str) -> Result<Option<Document>> {
        let full = self.resolve(relative)?;
        if !tokio::fs::try_exists(&full).await? {
            return Ok(None);
        }
        let relative = relative.to_string();
        let document = tokio::task::spawn_blocking(move || read_file(&full, relative)).await??;
        Ok(Some(document))
    }

    fn scan(&self) -> Result<CorpusScan> {
        if !self.root.exists() {
            bail!("Corpus root does not exist: {}", self.root.display());
        }

        let mut documents = Vec::new();
        let mut unreadable = Vec::new();
        let walker = WalkDir::new(&self.root).follow_links(self.follow_symlinks);
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = normalize(relative);

            if !self.is_eligible(&rel_str) {
                continue;
            }

            match read_file(path, rel_str.clone()) {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable file");
                    unreadable.push(UnreadableDocument {
                        path: rel_str,
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        documents.sort_by(|a, b| a.path.cmp(&b.path));
        unreadable.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(CorpusScan {
            documents,
            unreadable,
        })
    }
}

#[async_trait]
impl Corpus for FsCorpus {
    async fn read_all_documents(&self) -> Result<Vec<Document>> {
        Ok(self.scan()?.documents)
    }

    async fn scan_documents(&self) -> Result<CorpusScan> {
        // walkdir is synchronous; corpora are small enough to scan inline.
        self.scan()
    }

    async fn read_document(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .with_context(|| format!("Failed to read {}", full.display()))
    }
}

fn normalize(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn read_file(path: &Path, relative_path: String) -> Result<Document> {
    let metadata = std::fs::metadata(path)?;
    let modified_at = metadata
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64;

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("{} is not valid UTF-8 text", path.display()))?;

    Ok(Document {
        path: relative_path,
        content,
        modified_at,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {pattern}"))?);
    }
    Ok(builder.build()?)
}
