mod item;
mod stats;

pub use item::CatalogItem;
pub use stats::RatioStats;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to list {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("catalog build task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Immutable snapshot of every discoverable image plus derived statistics.
///
/// `by_category` stores indices into `items`, so each item exists exactly once.
#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<CatalogItem>,
    by_category: BTreeMap<String, Vec<usize>>,
    stats: RatioStats,
    built_at: DateTime<Utc>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::from_items(Vec::new())
    }

    pub fn from_items(items: Vec<CatalogItem>) -> Self {
        let mut by_category: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, item) in items.iter().enumerate() {
            by_category
                .entry(item.category.clone())
                .or_default()
                .push(idx);
        }
        let stats = RatioStats::from_items(&items);

        Self {
            items,
            by_category,
            stats,
            built_at: Utc::now(),
        }
    }

    /// Scan `root` recursively and read dimensions for every image file.
    ///
    /// A missing root (or a subtree that vanishes mid-scan) contributes nothing.
    /// Unreadable images are skipped.
    pub fn build(root: &Path) -> Result<Self, CatalogError> {
        let files = scan_image_files(root)?;

        // Phase 1: parallel header reads; collect keeps traversal order
        let items: Vec<CatalogItem> = files
            .par_iter()
            .filter_map(|path| match CatalogItem::from_path(root, path) {
                Ok(item) => Some(item),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable image");
                    None
                }
            })
            .collect();

        Ok(Self::from_items(items))
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items of one category in catalog order; empty for unknown categories
    pub fn category_items(&self, category: &str) -> Vec<&CatalogItem> {
        self.by_category
            .get(category)
            .map(|indices| indices.iter().map(|&idx| &self.items[idx]).collect())
            .unwrap_or_default()
    }

    /// Sorted category names
    pub fn categories(&self) -> Vec<&str> {
        self.by_category.keys().map(String::as_str).collect()
    }

    pub fn stats(&self) -> RatioStats {
        self.stats
    }

    pub fn dominant_landscape_ratio(&self) -> Option<f64> {
        self.stats.dominant_landscape_ratio
    }

    pub fn dominant_portrait_ratio(&self) -> Option<f64> {
        self.stats.dominant_portrait_ratio
    }

    pub fn dominant_all_ratio(&self) -> Option<f64> {
        self.stats.dominant_all_ratio
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::empty()
    }
}

fn scan_image_files(root: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) {
                    continue;
                }
                let path = e.path().unwrap_or(root).to_path_buf();
                return Err(CatalogError::Walk { path, source: e });
            }
        };

        if entry.file_type().is_file() && crate::utils::is_image_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}
