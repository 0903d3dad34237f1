use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Component, Path};

/// Category assigned to images sitting directly in the catalog root
pub const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Landscape,
    Portrait,
}

/// One discoverable image, addressed relative to the catalog root.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    /// Relative path with forward-slash separators
    pub id: String,
    pub category: String,
    pub width: u32,
    pub height: u32,
    pub ratio: f64,
    /// `id` with every segment percent-encoded
    pub url_path: String,
}

impl CatalogItem {
    /// Fast path: only read dimensions from image header (no full decode)
    pub fn from_path(root: &Path, path: &Path) -> Result<Self> {
        let (width, height) =
            image::image_dimensions(path).context("Failed to read image dimensions")?;
        let relative = path.strip_prefix(root).with_context(|| {
            format!("{} is outside {}", path.display(), root.display())
        })?;
        Self::new(relative, width, height)
    }

    pub fn new(relative: &Path, width: u32, height: u32) -> Result<Self> {
        anyhow::ensure!(
            width > 0 && height > 0,
            "invalid dimensions {}x{}",
            width,
            height
        );

        let segments: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        anyhow::ensure!(!segments.is_empty(), "empty relative path");

        // A file directly at the root has no category segment
        let category = if segments.len() > 1 {
            segments[0].clone()
        } else {
            UNCATEGORIZED.to_string()
        };
        let url_path = segments
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        Ok(Self {
            id: segments.join("/"),
            category,
            width,
            height,
            ratio: width as f64 / height as f64,
            url_path,
        })
    }

    pub fn orientation(&self) -> Orientation {
        if self.ratio >= 1.0 {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_item_takes_first_segment_as_category() {
        let item = CatalogItem::new(Path::new("nature/forest/pine.jpg"), 1920, 1080).unwrap();
        assert_eq!(item.id, "nature/forest/pine.jpg");
        assert_eq!(item.category, "nature");
        assert!((item.ratio - 1920.0 / 1080.0).abs() < f64::EPSILON);
        assert_eq!(item.orientation(), Orientation::Landscape);
    }

    #[test]
    fn test_root_item_is_uncategorized() {
        let item = CatalogItem::new(Path::new("loose.png"), 1080, 1920).unwrap();
        assert_eq!(item.category, UNCATEGORIZED);
        assert_eq!(item.orientation(), Orientation::Portrait);
    }

    #[test]
    fn test_url_path_encodes_each_segment() {
        let item = CatalogItem::new(Path::new("my photos/a b#1.png"), 10, 10).unwrap();
        assert_eq!(item.id, "my photos/a b#1.png");
        assert_eq!(item.url_path, "my%20photos/a%20b%231.png");
    }

    #[test]
    fn test_square_counts_as_landscape() {
        let item = CatalogItem::new(Path::new("sq.png"), 500, 500).unwrap();
        assert_eq!(item.orientation(), Orientation::Landscape);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(CatalogItem::new(Path::new("bad.png"), 0, 100).is_err());
        assert!(CatalogItem::new(Path::new("bad.png"), 100, 0).is_err());
    }
}
