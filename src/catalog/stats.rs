use super::item::{CatalogItem, Orientation};
use serde::Serialize;
use std::collections::HashMap;

/// Mode of the two-decimal rounded ratios.
///
/// Ties go to the value observed first. Returns `None` for an empty input.
pub fn ratio_mode<I>(ratios: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    // Bucket on integer hundredths so equal rounded values hash together
    let mut counts: HashMap<i64, usize> = HashMap::new();
    let mut first_seen: Vec<i64> = Vec::new();

    for ratio in ratios {
        let key = (ratio * 100.0).round() as i64;
        let count = counts.entry(key).or_insert(0);
        if *count == 0 {
            first_seen.push(key);
        }
        *count += 1;
    }

    let mut best: Option<(i64, usize)> = None;
    for key in first_seen {
        let count = counts[&key];
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((key, count));
        }
    }

    best.map(|(key, _)| key as f64 / 100.0)
}

/// Dominant ratios per orientation subset
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatioStats {
    pub dominant_landscape_ratio: Option<f64>,
    pub dominant_portrait_ratio: Option<f64>,
    pub dominant_all_ratio: Option<f64>,
}

impl RatioStats {
    pub fn from_items(items: &[CatalogItem]) -> Self {
        let of = |orientation: Orientation| {
            ratio_mode(
                items
                    .iter()
                    .filter(|item| item.orientation() == orientation)
                    .map(|item| item.ratio),
            )
        };

        Self {
            dominant_landscape_ratio: of(Orientation::Landscape),
            dominant_portrait_ratio: of(Orientation::Portrait),
            dominant_all_ratio: ratio_mode(items.iter().map(|item| item.ratio)),
        }
    }
}
