use crate::catalog::{Catalog, CatalogError, CatalogItem};
use crate::history::DedupStore;
use crate::ratio::{resolve_target_ratio, RatioParams, UaTrustMode};
use crate::selector::{select, DedupContext, NoResultReason, Selection, SelectionMeta};
use rand::Rng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionSettings {
    pub top_k: usize,
    pub dedup_enabled: bool,
    pub dedup_window: usize,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            top_k: 30,
            dedup_enabled: true,
            dedup_window: 20,
        }
    }
}

impl SelectionSettings {
    /// The dedup key to track, if repeat avoidance applies to this request
    fn tracked_key<'q>(&self, key: Option<&'q str>) -> Option<&'q str> {
        if !self.dedup_enabled || self.dedup_window == 0 {
            return None;
        }
        key.map(str::trim).filter(|k| !k.is_empty())
    }
}

/// Resolved request parameters for one selection
#[derive(Debug, Clone, Default)]
pub struct SelectionQuery<'a> {
    pub ratio: RatioParams<'a>,
    pub category: Option<&'a str>,
    pub user_agent: &'a str,
    pub dedup_key: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pick {
    pub item: CatalogItem,
    pub meta: SelectionMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PickOutcome {
    Picked(Pick),
    NotFound(NoResultReason),
}

/// Read-only view for health/introspection
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub generated_at: String,
    pub total_count: usize,
    pub categories: Vec<String>,
    pub dominant_landscape_ratio: Option<f64>,
    pub dominant_portrait_ratio: Option<f64>,
    pub dominant_all_ratio: Option<f64>,
    pub dedup_enabled: bool,
    pub dedup_window: usize,
    pub dedup_keys: usize,
    pub top_k: usize,
    pub ua_trust_mode: UaTrustMode,
}

/// Owns the current catalog snapshot and the dedup ledger.
///
/// Readers clone the `Arc<Catalog>` and never observe a partial rebuild;
/// a rebuild constructs a new catalog off-lock and swaps it in.
#[derive(Debug)]
pub struct WallpaperEngine {
    root: PathBuf,
    catalog: RwLock<Arc<Catalog>>,
    history: DedupStore,
    settings: SelectionSettings,
    ua_trust: UaTrustMode,
}

impl WallpaperEngine {
    pub fn new(root: PathBuf, settings: SelectionSettings, ua_trust: UaTrustMode) -> Self {
        Self {
            root,
            catalog: RwLock::new(Arc::new(Catalog::empty())),
            history: DedupStore::new(settings.dedup_window),
            settings,
            ua_trust,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot(&self) -> Arc<Catalog> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, catalog: Arc<Catalog>) {
        *self
            .catalog
            .write()
            .unwrap_or_else(PoisonError::into_inner) = catalog;
    }

    /// Rebuild from disk and swap the snapshot; the old one stays on error.
    pub async fn rebuild(&self) -> Result<Arc<Catalog>, CatalogError> {
        let root = self.root.clone();
        let catalog = tokio::task::spawn_blocking(move || Catalog::build(&root)).await??;
        let catalog = Arc::new(catalog);
        self.replace(catalog.clone());
        Ok(catalog)
    }

    /// Periodic rebuild loop; the first tick is skipped since startup already built.
    pub fn spawn_refresh(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match self.rebuild().await {
                    Ok(catalog) => info!(
                        total_count = catalog.len(),
                        categories = catalog.categories().len(),
                        "wallpaper index refreshed"
                    ),
                    Err(e) => error!(error = %e, "failed to refresh wallpaper index"),
                }
            }
        })
    }

    /// Resolve a target ratio, select one item and record it for the dedup key.
    ///
    /// Read-select-record runs under the key's dedup shard lock so concurrent
    /// requests for one client see each other's picks.
    pub fn pick<R>(&self, query: &SelectionQuery<'_>, rng: &mut R) -> PickOutcome
    where
        R: Rng + ?Sized,
    {
        let catalog = self.snapshot();
        let decision =
            resolve_target_ratio(&query.ratio, query.user_agent, &catalog, self.ua_trust);
        let category = query.category.map(str::trim).filter(|c| !c.is_empty());

        let selection = match self.settings.tracked_key(query.dedup_key) {
            Some(key) => self.history.pick_and_record(key, |history| {
                let dedup = DedupContext::Enabled {
                    window: self.settings.dedup_window,
                    history,
                };
                let selection = select(
                    &catalog,
                    category,
                    &decision,
                    self.settings.top_k,
                    dedup,
                    rng,
                );
                let picked_id = match &selection {
                    Selection::Picked { item, .. } => Some(item.id.clone()),
                    Selection::NoResult(_) => None,
                };
                (selection, picked_id)
            }),
            None => select(
                &catalog,
                category,
                &decision,
                self.settings.top_k,
                DedupContext::Disabled,
                rng,
            ),
        };

        match selection {
            Selection::Picked { item, meta } => PickOutcome::Picked(Pick {
                item: item.clone(),
                meta,
            }),
            Selection::NoResult(reason) => PickOutcome::NotFound(reason),
        }
    }

    pub fn dedup_key_count(&self) -> usize {
        self.history.key_count()
    }

    #[cfg(test)]
    pub fn recent_ids(&self, key: &str, n: usize) -> Vec<String> {
        self.history.recent_ids(key, n)
    }

    pub fn health(&self) -> HealthReport {
        let catalog = self.snapshot();
        HealthReport {
            generated_at: catalog.built_at().to_rfc3339(),
            total_count: catalog.len(),
            categories: catalog.categories().into_iter().map(String::from).collect(),
            dominant_landscape_ratio: catalog.dominant_landscape_ratio(),
            dominant_portrait_ratio: catalog.dominant_portrait_ratio(),
            dominant_all_ratio: catalog.dominant_all_ratio(),
            dedup_enabled: self.settings.dedup_enabled,
            dedup_window: self.settings.dedup_window,
            dedup_keys: self.dedup_key_count(),
            top_k: self.settings.top_k,
            ua_trust_mode: self.ua_trust,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::write_png;
    use crate::ratio::RatioSource;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn engine(root: &Path, settings: SelectionSettings) -> WallpaperEngine {
        WallpaperEngine::new(root.to_path_buf(), settings, UaTrustMode::Auto)
    }

    fn picked(outcome: PickOutcome) -> Pick {
        match outcome {
            PickOutcome::Picked(pick) => pick,
            PickOutcome::NotFound(reason) => panic!("expected a pick, got {reason:?}"),
        }
    }

    #[tokio::test]
    async fn test_rebuild_swaps_snapshot_and_keeps_old_for_readers() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(tmp.path(), SelectionSettings::default());
        let before = engine.snapshot();
        assert!(before.is_empty());

        write_png(tmp.path(), "nature/a.png", 32, 18);
        let rebuilt = engine.rebuild().await.unwrap();

        assert_eq!(rebuilt.len(), 1);
        assert_eq!(engine.snapshot().len(), 1);
        assert!(before.is_empty());
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_snapshot() {
        let tmp = TempDir::new().unwrap();
        let parent = tmp.path().join("x");
        let root = parent.join("wall");
        write_png(&root, "a.png", 32, 18);
        let engine = engine(&root, SelectionSettings::default());
        engine.rebuild().await.unwrap();
        assert_eq!(engine.snapshot().len(), 1);

        // A regular file in the root's path is a listing error, not a missing root
        std::fs::remove_dir_all(&parent).unwrap();
        std::fs::write(&parent, b"not a directory").unwrap();

        let err = engine.rebuild().await.unwrap_err();
        assert!(matches!(err, CatalogError::Walk { .. }), "got {err:?}");
        assert_eq!(engine.snapshot().len(), 1);
        assert_eq!(engine.snapshot().items()[0].id, "a.png");
    }

    #[test]
    fn test_concurrent_picks_for_one_client_never_repeat_back_to_back() {
        let tmp = TempDir::new().unwrap();
        write_png(tmp.path(), "a.png", 32, 18);
        write_png(tmp.path(), "b.png", 32, 18);
        let settings = SelectionSettings {
            top_k: 30,
            dedup_enabled: true,
            dedup_window: 1,
        };
        let engine = Arc::new(engine(tmp.path(), settings));
        engine.replace(Arc::new(Catalog::build(tmp.path()).unwrap()));

        const THREADS: usize = 8;
        const PICKS: usize = 50;
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    let mut rng = StdRng::seed_from_u64(t as u64);
                    let query = SelectionQuery {
                        dedup_key: Some("shared-frame"),
                        ..Default::default()
                    };
                    for _ in 0..PICKS {
                        let pick = picked(engine.pick(&query, &mut rng));
                        assert_eq!(pick.meta.dedup_window_used, Some(1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let history = engine.recent_ids("shared-frame", 2 * THREADS * PICKS);
        assert_eq!(history.len(), crate::history::history_cap(1));
        for pair in history.windows(2) {
            assert_ne!(pair[0], pair[1], "back-to-back repeat in {history:?}");
        }
    }

    #[tokio::test]
    async fn test_empty_engine_reports_empty_index() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp.path().join("missing"), SelectionSettings::default());
        engine.rebuild().await.unwrap();

        let mut rng = StdRng::seed_from_u64(0);
        let outcome = engine.pick(&SelectionQuery::default(), &mut rng);
        assert_eq!(outcome, PickOutcome::NotFound(NoResultReason::EmptyIndex));
        assert_eq!(engine.dedup_key_count(), 0);
    }

    #[tokio::test]
    async fn test_pick_records_history_for_client() {
        let tmp = TempDir::new().unwrap();
        for i in 0..4 {
            write_png(tmp.path(), &format!("wall/{i}.png"), 32, 18);
        }
        let settings = SelectionSettings {
            top_k: 10,
            dedup_enabled: true,
            dedup_window: 3,
        };
        let engine = engine(tmp.path(), settings);
        engine.rebuild().await.unwrap();

        let query = SelectionQuery {
            dedup_key: Some("client-1"),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = Vec::new();
        for _ in 0..4 {
            let pick = picked(engine.pick(&query, &mut rng));
            assert!(pick.meta.dedup_applied);
            assert_eq!(pick.meta.dedup_window_used, Some(3));
            assert!(!seen.contains(&pick.item.id), "repeat within window");
            seen.push(pick.item.id);
        }
        assert_eq!(engine.recent_ids("client-1", 10), seen);
        assert_eq!(engine.dedup_key_count(), 1);
    }

    #[tokio::test]
    async fn test_dedup_disabled_does_not_track() {
        let tmp = TempDir::new().unwrap();
        write_png(tmp.path(), "a.png", 32, 18);
        let settings = SelectionSettings {
            dedup_enabled: false,
            ..Default::default()
        };
        let engine = engine(tmp.path(), settings);
        engine.rebuild().await.unwrap();

        let query = SelectionQuery {
            dedup_key: Some("client-1"),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        let pick = picked(engine.pick(&query, &mut rng));
        assert!(!pick.meta.dedup_applied);
        assert_eq!(engine.dedup_key_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_dedup_key_is_untracked() {
        let tmp = TempDir::new().unwrap();
        write_png(tmp.path(), "a.png", 32, 18);
        let engine = engine(tmp.path(), SelectionSettings::default());
        engine.rebuild().await.unwrap();

        let query = SelectionQuery {
            dedup_key: Some("   "),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        let pick = picked(engine.pick(&query, &mut rng));
        assert!(!pick.meta.dedup_applied);
        assert_eq!(engine.dedup_key_count(), 0);
    }

    #[tokio::test]
    async fn test_explicit_size_and_category() {
        let tmp = TempDir::new().unwrap();
        write_png(tmp.path(), "phone/tall.png", 18, 32);
        write_png(tmp.path(), "phone/wide.png", 32, 18);
        write_png(tmp.path(), "desk/wide.png", 32, 18);
        let settings = SelectionSettings {
            top_k: 1,
            dedup_enabled: false,
            dedup_window: 0,
        };
        let engine = engine(tmp.path(), settings);
        engine.rebuild().await.unwrap();

        let query = SelectionQuery {
            ratio: RatioParams {
                width: Some("1080"),
                height: Some("1920"),
                aspect: None,
            },
            category: Some("phone"),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64)",
            dedup_key: None,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let pick = picked(engine.pick(&query, &mut rng));
        assert_eq!(pick.item.id, "phone/tall.png");
        assert_eq!(pick.meta.ratio_source, RatioSource::WidthHeight);

        let missing = SelectionQuery {
            category: Some("nature"),
            ..Default::default()
        };
        assert_eq!(
            engine.pick(&missing, &mut rng),
            PickOutcome::NotFound(NoResultReason::NoCategoryMatch)
        );
    }

    #[tokio::test]
    async fn test_health_reflects_snapshot() {
        let tmp = TempDir::new().unwrap();
        write_png(tmp.path(), "nature/a.png", 32, 18);
        write_png(tmp.path(), "city/b.png", 18, 32);
        let engine = engine(tmp.path(), SelectionSettings::default());
        engine.rebuild().await.unwrap();

        let health = engine.health();
        assert_eq!(health.total_count, 2);
        assert_eq!(health.categories, vec!["city", "nature"]);
        assert_eq!(health.dominant_landscape_ratio, Some(1.78));
        assert_eq!(health.dominant_portrait_ratio, Some(0.56));
        // Tie between the two; city/ is traversed first
        assert_eq!(health.dominant_all_ratio, Some(0.56));
        assert_eq!(health.top_k, 30);
    }
}
