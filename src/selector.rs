use crate::catalog::{Catalog, CatalogItem};
use crate::history::DedupHistory;
use crate::ratio::{DeviceClass, RatioDecision, RatioSource};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;

/// Why a selection produced nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoResultReason {
    EmptyIndex,
    NoCategoryMatch,
    NoCandidate,
}

impl NoResultReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoResultReason::EmptyIndex => "empty_index",
            NoResultReason::NoCategoryMatch => "no_category_match",
            NoResultReason::NoCandidate => "no_candidate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionMeta {
    pub ratio_source: RatioSource,
    pub target_ratio: Option<f64>,
    pub device_hint: DeviceClass,
    /// Size of the set the final pick was drawn from
    pub pool_size: usize,
    pub dedup_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_window_used: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection<'a> {
    Picked {
        item: &'a CatalogItem,
        meta: SelectionMeta,
    },
    NoResult(NoResultReason),
}

/// Dedup state visible to one selection
#[derive(Debug, Clone, Copy)]
pub enum DedupContext<'h> {
    Disabled,
    Enabled {
        window: usize,
        history: Option<&'h DedupHistory>,
    },
}

/// Log distance, symmetric for too-wide and too-narrow mismatches
pub fn ratio_distance(ratio: f64, target: f64) -> f64 {
    (ratio.ln() - target.ln()).abs()
}

/// Pick one item from the catalog.
///
/// Candidates are ranked by closeness to the target ratio (or shuffled when
/// there is no target). The pool grows through `top_k * {1, 2, 4}` and then the
/// whole ranking before the dedup window is relaxed to half, then to zero.
pub fn select<'a, R>(
    catalog: &'a Catalog,
    category: Option<&str>,
    decision: &RatioDecision,
    top_k: usize,
    dedup: DedupContext<'_>,
    rng: &mut R,
) -> Selection<'a>
where
    R: Rng + ?Sized,
{
    if catalog.is_empty() {
        return Selection::NoResult(NoResultReason::EmptyIndex);
    }

    let pool: Vec<&CatalogItem> = match category {
        Some(name) => catalog.category_items(name),
        None => catalog.items().iter().collect(),
    };
    if pool.is_empty() {
        return Selection::NoResult(NoResultReason::NoCategoryMatch);
    }

    let ranked = rank(pool, decision.target, rng);
    let sizes = pool_sizes(top_k, ranked.len());
    let meta = |pool_size: usize, dedup_window_used: Option<usize>| SelectionMeta {
        ratio_source: decision.source,
        target_ratio: decision.target,
        device_hint: decision.device,
        pool_size,
        dedup_applied: dedup_window_used.is_some(),
        dedup_window_used,
    };

    let (window, history) = match dedup {
        DedupContext::Enabled { window, history } if window > 0 => (window, history),
        _ => {
            // Without dedup the first non-empty pool always wins
            for size in sizes {
                let candidates = &ranked[..size];
                if let Some(&item) = candidates.choose(rng) {
                    return Selection::Picked {
                        item,
                        meta: meta(candidates.len(), None),
                    };
                }
            }
            return Selection::NoResult(NoResultReason::NoCandidate);
        }
    };

    for win in dedup_windows(window) {
        let recent: HashSet<&str> = history
            .map(|h| h.recent(win).collect())
            .unwrap_or_default();

        for &size in &sizes {
            let filtered: Vec<&CatalogItem> = ranked[..size]
                .iter()
                .copied()
                .filter(|item| !recent.contains(item.id.as_str()))
                .collect();
            if let Some(&item) = filtered.choose(rng) {
                return Selection::Picked {
                    item,
                    meta: meta(filtered.len(), Some(win)),
                };
            }
        }
    }

    Selection::NoResult(NoResultReason::NoCandidate)
}

fn rank<'a, R>(
    mut pool: Vec<&'a CatalogItem>,
    target: Option<f64>,
    rng: &mut R,
) -> Vec<&'a CatalogItem>
where
    R: Rng + ?Sized,
{
    let Some(target) = target else {
        pool.shuffle(rng);
        return pool;
    };

    let mut scored: Vec<(f64, &CatalogItem)> = pool
        .into_iter()
        .map(|item| (ratio_distance(item.ratio, target), item))
        .collect();
    // Stable: equal distances keep catalog order
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));
    scored.into_iter().map(|(_, item)| item).collect()
}

/// Candidate pool sizes to try, capped at `len`, without repeats
fn pool_sizes(top_k: usize, len: usize) -> Vec<usize> {
    let k = top_k.max(1);
    let mut sizes: Vec<usize> = Vec::with_capacity(4);
    for size in [k, k.saturating_mul(2), k.saturating_mul(4), len] {
        let size = size.min(len);
        if size > 0 && sizes.last() != Some(&size) {
            sizes.push(size);
        }
    }
    sizes
}

fn dedup_windows(window: usize) -> Vec<usize> {
    let mut windows = vec![window];
    for w in [window / 2, 0] {
        if windows.last() != Some(&w) {
            windows.push(w);
        }
    }
    windows
}
