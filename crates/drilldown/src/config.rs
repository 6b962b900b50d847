use std::fmt;
use std::fs;
use std::path::Path;

use foundation::LngLat;
use layers::{Camera, FitOptions, LayerSlot, RasterSlot};
use scene::{HierarchySchema, RegionLevel};
use serde::{Deserialize, Serialize};
use streaming::CacheConfig;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "I/O error: {err}"),
            ConfigError::Parse(err) => write!(f, "config parse error: {err}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// WFS endpoint of the boundary feature service.
    pub vector_url: String,
    /// Base URL of the coverage tile service (`/lulc` is appended).
    pub raster_url: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            vector_url: "https://aws.simontini.id/geoserver/ows".to_string(),
            raster_url: "https://gee.simontini.id/gee".to_string(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    pub padding: f64,
    pub duration_ms: u64,
}

impl FitConfig {
    pub fn options(&self) -> FitOptions {
        FitOptions::new(self.padding, self.duration_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub center: LngLat,
    pub zoom: f64,
    pub min_zoom: f64,
    /// Used when zooming to a clicked feature.
    pub feature_fit: FitConfig,
    /// Used when zooming to a region found in a freshly loaded source.
    pub region_fit: FitConfig,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            center: [120.216667, -1.5],
            zoom: 4.0,
            min_zoom: 4.0,
            feature_fit: FitConfig {
                padding: 40.0,
                duration_ms: 1000,
            },
            region_fit: FitConfig {
                padding: 100.0,
                duration_ms: 400,
            },
        }
    }
}

impl ViewportConfig {
    pub fn home_camera(&self) -> Camera {
        Camera {
            center: self.center,
            zoom: self.zoom,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelConfig {
    /// Feature type name on the vector service.
    pub layer_name: String,
    /// Prefix of the level's source and layer ids.
    pub slot_prefix: String,
}

impl LevelConfig {
    fn new(layer_name: &str, slot_prefix: &str) -> Self {
        Self {
            layer_name: layer_name.to_string(),
            slot_prefix: slot_prefix.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelsConfig {
    pub level1: LevelConfig,
    pub level2: LevelConfig,
    pub level3: LevelConfig,
}

impl Default for LevelsConfig {
    fn default() -> Self {
        Self {
            level1: LevelConfig::new("LTKL:kabupaten", "kabupaten"),
            level2: LevelConfig::new("LTKL:kecamatan", "kecamatan"),
            level3: LevelConfig::new("LTKL:desa", "desa"),
        }
    }
}

impl LevelsConfig {
    pub fn get(&self, level: RegionLevel) -> &LevelConfig {
        match level {
            RegionLevel::Level1 => &self.level1,
            RegionLevel::Level2 => &self.level2,
            RegionLevel::Level3 => &self.level3,
        }
    }

    pub fn slot(&self, level: RegionLevel) -> LayerSlot {
        LayerSlot::named(&self.get(level).slot_prefix)
    }

    /// Temporary slot used to locate a region before its children load.
    pub fn preview_slot(&self, level: RegionLevel) -> LayerSlot {
        LayerSlot::named(&format!("zoom{}", self.get(level).slot_prefix))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    pub source_id: String,
    pub layer_id: String,
    pub tile_size: u32,
}

impl Default for RasterConfig {
    fn default() -> Self {
        let slot = RasterSlot::default();
        Self {
            source_id: slot.source_id,
            layer_id: slot.layer_id,
            tile_size: slot.tile_size,
        }
    }
}

impl RasterConfig {
    pub fn slot(&self) -> RasterSlot {
        RasterSlot {
            source_id: self.source_id.clone(),
            layer_id: self.layer_id.clone(),
            tile_size: self.tile_size,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YearsConfig {
    pub default: i32,
    pub min: i32,
    pub max: i32,
}

impl Default for YearsConfig {
    fn default() -> Self {
        Self {
            default: 2024,
            min: 1990,
            max: 2024,
        }
    }
}

impl YearsConfig {
    pub fn contains(&self, year: i32) -> bool {
        (self.min..=self.max).contains(&year)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    pub services: ServicesConfig,
    pub viewport: ViewportConfig,
    pub hierarchy: HierarchySchema,
    pub levels: LevelsConfig,
    pub raster: RasterConfig,
    pub cache: CacheConfig,
    pub years: YearsConfig,
}

impl ExplorerConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let payload = fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json_str(&payload)
    }

    pub fn from_json_str(payload: &str) -> Result<Self, ConfigError> {
        let config: ExplorerConfig = serde_json::from_str(payload).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        let years = &self.years;
        if years.min > years.max || !years.contains(years.default) {
            return invalid(format!(
                "year range {}..={} must contain default {}",
                years.min, years.max, years.default
            ));
        }
        if self.viewport.min_zoom > self.viewport.zoom {
            return invalid(format!(
                "min_zoom {} exceeds home zoom {}",
                self.viewport.min_zoom, self.viewport.zoom
            ));
        }
        if self.cache.ttl_ms == 0 {
            return invalid("cache ttl_ms must be positive".to_string());
        }
        if self.raster.tile_size == 0 {
            return invalid("raster tile_size must be positive".to_string());
        }

        let mut prefixes = Vec::new();
        for level in RegionLevel::ALL {
            let lc = self.levels.get(level);
            if lc.layer_name.trim().is_empty() || lc.slot_prefix.trim().is_empty() {
                return invalid(format!("{level} needs a layer_name and slot_prefix"));
            }
            if self.hierarchy.field(level).trim().is_empty() {
                return invalid(format!("{level} needs a hierarchy property name"));
            }
            if prefixes.contains(&lc.slot_prefix) {
                return invalid(format!("duplicate slot prefix {}", lc.slot_prefix));
            }
            prefixes.push(lc.slot_prefix.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, ExplorerConfig};
    use pretty_assertions::assert_eq;
    use scene::RegionLevel;
    use std::io::Write;

    #[test]
    fn defaults_match_the_deployment() {
        let config = ExplorerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.levels.slot(RegionLevel::Level2).layer_id, "kecamatan-fill");
        assert_eq!(
            config.levels.preview_slot(RegionLevel::Level1).source_id,
            "zoomkabupaten-src"
        );
        assert_eq!(config.hierarchy.field(RegionLevel::Level3), "des");
        assert_eq!(config.cache.vector_storage_key, "mapCache_geojson");
        assert_eq!(config.raster.slot().layer_id, "gee-lulc-layer");
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let config = ExplorerConfig::from_json_str(
            r#"{"years": {"default": 2000, "min": 1995, "max": 2010},
                "hierarchy": {"level1": "province"}}"#,
        )
        .unwrap();
        assert_eq!(config.years.default, 2000);
        assert_eq!(config.hierarchy.level1, "province");
        assert_eq!(config.hierarchy.level2, "kec");
        assert_eq!(config.viewport.zoom, 4.0);
    }

    #[test]
    fn inconsistent_configs_are_rejected() {
        let err = ExplorerConfig::from_json_str(r#"{"years": {"default": 2030}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ExplorerConfig::from_json_str(
            r#"{"levels": {"level2": {"layer_name": "x", "slot_prefix": "kabupaten"}}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate slot prefix"));

        assert!(matches!(
            ExplorerConfig::from_json_str("{"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"services": {{"raster_url": "http://localhost:9000/gee"}}}}"#).unwrap();
        let config = ExplorerConfig::from_path(file.path()).unwrap();
        assert_eq!(config.services.raster_url, "http://localhost:9000/gee");
        assert!(matches!(
            ExplorerConfig::from_path("/definitely/not/here.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
