use scene::FeatureCollection;

use crate::symbology::Paint;

/// Suffix of the emphasis (hover outline) companion of a fill layer.
pub const EMPHASIS_SUFFIX: &str = "-hover-line";

pub fn emphasis_layer_id(fill_id: &str) -> String {
    format!("{fill_id}{EMPHASIS_SUFFIX}")
}

pub fn is_emphasis_layer(layer_id: &str) -> bool {
    layer_id.ends_with(EMPHASIS_SUFFIX)
}

/// Source id implied by the `<prefix>-fill` / `<prefix>-src` naming scheme.
///
/// Only a fallback; the live render stack is the authority on bindings.
pub fn conventional_source_id(layer_id: &str) -> Option<String> {
    let base = layer_id.strip_suffix(EMPHASIS_SUFFIX).unwrap_or(layer_id);
    base.strip_suffix("-fill").map(|prefix| format!("{prefix}-src"))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Fill,
    Line,
    Raster,
}

/// A rendering layer bound to one source.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub id: String,
    pub kind: LayerKind,
    pub source: String,
    pub paint: Paint,
}

impl LayerSpec {
    pub fn fill(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: LayerKind::Fill,
            source: source.into(),
            paint: Paint::boundary_fill(),
        }
    }

    /// Hover outline companion for `fill_id`, reading the same source.
    pub fn emphasis(fill_id: &str, source: impl Into<String>) -> Self {
        Self {
            id: emphasis_layer_id(fill_id),
            kind: LayerKind::Line,
            source: source.into(),
            paint: Paint::hover_outline(),
        }
    }

    pub fn raster(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: LayerKind::Raster,
            source: source.into(),
            paint: Paint::coverage_raster(),
        }
    }

    pub fn binding(&self) -> LayerBinding {
        LayerBinding {
            id: self.id.clone(),
            kind: self.kind,
            source: self.source.clone(),
        }
    }
}

/// What the render stack reports about one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerBinding {
    pub id: String,
    pub kind: LayerKind,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    GeoJson { data: FeatureCollection },
    Raster { tiles: Vec<String>, tile_size: u32 },
}

impl SourceSpec {
    pub fn raster(tile_url: impl Into<String>, tile_size: u32) -> Self {
        SourceSpec::Raster {
            tiles: vec![tile_url.into()],
            tile_size,
        }
    }
}

/// Source and fill layer ids used for one drill level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSlot {
    pub source_id: String,
    pub layer_id: String,
}

impl LayerSlot {
    pub fn new(source_id: impl Into<String>, layer_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            layer_id: layer_id.into(),
        }
    }

    /// `<prefix>-src` / `<prefix>-fill`.
    pub fn named(prefix: &str) -> Self {
        Self::new(format!("{prefix}-src"), format!("{prefix}-fill"))
    }

    pub fn emphasis_layer_id(&self) -> String {
        emphasis_layer_id(&self.layer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{LayerSlot, conventional_source_id, emphasis_layer_id, is_emphasis_layer};
    use pretty_assertions::assert_eq;

    #[test]
    fn naming_scheme() {
        let slot = LayerSlot::named("kecamatan");
        assert_eq!(slot.source_id, "kecamatan-src");
        assert_eq!(slot.layer_id, "kecamatan-fill");
        assert_eq!(slot.emphasis_layer_id(), "kecamatan-fill-hover-line");
        assert!(is_emphasis_layer(&emphasis_layer_id("x")));
        assert!(!is_emphasis_layer("x-fill"));
    }

    #[test]
    fn conventional_source_fallback() {
        assert_eq!(conventional_source_id("desa-fill").as_deref(), Some("desa-src"));
        assert_eq!(
            conventional_source_id("desa-fill-hover-line").as_deref(),
            Some("desa-src")
        );
        assert_eq!(conventional_source_id("gee-lulc-layer"), None);
    }
}
