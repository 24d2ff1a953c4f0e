use crate::config::IngestConfig;
use crate::utils::error::WorkerError;
use anyhow::Result;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const NORMALIZED_EXTENSIONS: &[&str] = &["md"];
const RAW_EXTENSIONS: &[&str] = &["html", "htm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Markdown already produced by an earlier normalization.
    Normalized,
    /// Filing markup that still needs normalizing.
    Raw,
}

/// A discovered filing, keyed by upper-cased ticker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDocument {
    pub ticker: String,
    /// File stem as found on disk; the side file reuses it.
    pub stem: String,
    pub path: PathBuf,
    pub kind: SourceKind,
}

#[derive(Debug, Clone)]
pub struct RawDocument {
    pub ticker: String,
    pub path: PathBuf,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct NormalizedDocument {
    pub ticker: String,
    pub source: PathBuf,
    pub content: String,
}

pub struct DocumentLoader;

impl DocumentLoader {
    /// Ticker for a filing path: the file stem, upper-cased.
    pub fn ticker_from_path(path: &Path) -> Option<String> {
        path.file_stem()
            .and_then(|s| s.to_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_uppercase)
    }

    /// Enumerate candidates from both directories, normalized files first.
    ///
    /// Only fails when neither directory can be read.
    pub fn discover(config: &IngestConfig) -> Result<Vec<CandidateDocument>> {
        let normalized = Self::scan(&config.normalized_dir, NORMALIZED_EXTENSIONS);
        let raw = Self::scan(&config.raw_dir, RAW_EXTENSIONS);

        if let (Err(normalized_err), Err(raw_err)) = (&normalized, &raw) {
            warn!("⚠️  Cannot read {:?}: {}", config.normalized_dir, normalized_err);
            warn!("⚠️  Cannot read {:?}: {}", config.raw_dir, raw_err);
            return Err(WorkerError::DirectoryUnreadable(config.raw_dir.clone()).into());
        }

        let allowlist: Vec<String> = config
            .ticker_allowlist
            .iter()
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect();

        let mut candidates: BTreeMap<String, CandidateDocument> = BTreeMap::new();
        let sources = [
            (normalized, SourceKind::Normalized, &config.normalized_dir),
            (raw, SourceKind::Raw, &config.raw_dir),
        ];

        for (scan, kind, dir) in sources {
            let paths = match scan {
                Ok(paths) => paths,
                Err(e) => {
                    warn!("⚠️  Skipping {:?}: {}", dir, e);
                    continue;
                }
            };

            for path in paths {
                let Some(ticker) = Self::ticker_from_path(&path) else {
                    continue;
                };
                if !allowlist.is_empty() && !allowlist.contains(&ticker) {
                    continue;
                }
                if let Some(existing) = candidates.get(&ticker) {
                    if existing.kind == kind {
                        warn!("Duplicate filing for {}: keeping {:?}, ignoring {:?}", ticker, existing.path, path);
                    }
                    continue;
                }

                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or(&ticker)
                    .to_string();
                candidates.insert(
                    ticker.clone(),
                    CandidateDocument {
                        ticker,
                        stem,
                        path,
                        kind,
                    },
                );
            }
        }

        debug!("Discovered {} candidate filings", candidates.len());

        Ok(candidates.into_values().collect())
    }

    /// Files directly under `dir` with one of `extensions`, in name order.
    fn scan(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, walkdir::Error> {
        let mut paths = Vec::new();

        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => return Err(e),
                Err(e) => {
                    warn!("Skipping unreadable entry in {:?}: {}", dir, e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let matches = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| extensions.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false);

            if matches {
                paths.push(entry.into_path());
            }
        }

        Ok(paths)
    }

    pub fn load_raw(candidate: &CandidateDocument) -> Result<RawDocument> {
        let payload = fs::read(&candidate.path).map_err(WorkerError::from)?;
        debug!("Loaded file: {:?} ({} bytes)", candidate.path, payload.len());

        Ok(RawDocument {
            ticker: candidate.ticker.clone(),
            path: candidate.path.clone(),
            payload,
        })
    }

    /// Read a Markdown file, replacing invalid UTF-8 sequences.
    pub fn load_normalized(candidate: &CandidateDocument) -> Result<NormalizedDocument> {
        let bytes = fs::read(&candidate.path).map_err(WorkerError::from)?;
        debug!("Loaded file: {:?} ({} bytes)", candidate.path, bytes.len());

        Ok(NormalizedDocument {
            ticker: candidate.ticker.clone(),
            source: candidate.path.clone(),
            content: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    /// Write `<dir>/<stem>.md` and return its path.
    pub fn write_normalized(dir: &Path, stem: &str, document: &NormalizedDocument) -> Result<PathBuf> {
        fs::create_dir_all(dir).map_err(WorkerError::from)?;
        let path = dir.join(format!("{}.md", stem));
        fs::write(&path, &document.content).map_err(WorkerError::from)?;
        debug!("Wrote normalized side file {:?}", path);
        Ok(path)
    }
}
