use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::catalog::{Catalog, RatioStats};
use crate::config::Config;
use crate::engine::{PickOutcome, SelectionQuery, WallpaperEngine};
use crate::ratio::RatioParams;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanSummary {
    directory: String,
    total_count: usize,
    categories: BTreeMap<String, usize>,
    #[serde(flatten)]
    stats: RatioStats,
}

impl ScanSummary {
    fn new(directory: &Path, catalog: &Catalog) -> Self {
        let categories = catalog
            .categories()
            .into_iter()
            .map(|name| (name.to_string(), catalog.category_items(name).len()))
            .collect();
        Self {
            directory: directory.display().to_string(),
            total_count: catalog.len(),
            categories,
            stats: catalog.stats(),
        }
    }
}

/// Query flags for a one-off pick
#[derive(Debug, Default)]
pub struct PickRequest {
    pub width: Option<String>,
    pub height: Option<String>,
    pub aspect: Option<String>,
    pub category: Option<String>,
    pub user_agent: String,
    pub client: Option<String>,
}

pub async fn cmd_scan(wallpaper_dir: &Path, json: bool) -> Result<()> {
    let root = wallpaper_dir.to_path_buf();
    let catalog = tokio::task::spawn_blocking(move || Catalog::build(&root)).await??;
    let summary = ScanSummary::new(wallpaper_dir, &catalog);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Scanned {}", summary.directory);
    println!(
        "Found {} wallpapers in {} categories:",
        summary.total_count,
        summary.categories.len()
    );
    for (name, count) in &summary.categories {
        println!("  {name}: {count}");
    }
    println!("Dominant ratios:");
    println!("  Landscape: {}", format_ratio(summary.stats.dominant_landscape_ratio));
    println!("  Portrait:  {}", format_ratio(summary.stats.dominant_portrait_ratio));
    println!("  All:       {}", format_ratio(summary.stats.dominant_all_ratio));

    Ok(())
}

pub async fn cmd_pick(config: &Config, request: &PickRequest) -> Result<()> {
    let engine = WallpaperEngine::new(
        config.catalog.directory.clone(),
        config.selection_settings(),
        config.selection.ua_trust_mode,
    );
    engine.rebuild().await?;

    let query = SelectionQuery {
        ratio: RatioParams {
            width: request.width.as_deref(),
            height: request.height.as_deref(),
            aspect: request.aspect.as_deref(),
        },
        category: request.category.as_deref(),
        user_agent: &request.user_agent,
        dedup_key: request.client.as_deref(),
    };

    match engine.pick(&query, &mut rand::thread_rng()) {
        PickOutcome::Picked(pick) => {
            println!("{}", serde_json::to_string_pretty(&pick)?);
            Ok(())
        }
        PickOutcome::NotFound(reason) => {
            bail!("no wallpaper found ({})", reason.as_str())
        }
    }
}

fn format_ratio(ratio: Option<f64>) -> String {
    ratio.map_or_else(|| "-".to_string(), |r| format!("{r:.2}"))
}
