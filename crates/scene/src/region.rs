//! Administrative hierarchy placement of boundary features.
//!
//! A feature's placement is decided once, when its collection is ingested,
//! and stored as a [`Region`] carrying its full ancestry.

use std::collections::BTreeMap;

use foundation::{Aabb2, FeatureId};
use serde::{Deserialize, Serialize};

use crate::feature::{Feature, FeatureCollection};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegionLevel {
    Level1,
    Level2,
    Level3,
}

impl RegionLevel {
    pub const ALL: [RegionLevel; 3] = [RegionLevel::Level1, RegionLevel::Level2, RegionLevel::Level3];

    /// 1-based depth in the hierarchy.
    pub fn depth(self) -> usize {
        match self {
            RegionLevel::Level1 => 1,
            RegionLevel::Level2 => 2,
            RegionLevel::Level3 => 3,
        }
    }

    pub fn from_depth(depth: usize) -> Option<Self> {
        match depth {
            1 => Some(RegionLevel::Level1),
            2 => Some(RegionLevel::Level2),
            3 => Some(RegionLevel::Level3),
            _ => None,
        }
    }

    pub fn deeper(self) -> Option<Self> {
        Self::from_depth(self.depth() + 1)
    }

    pub fn shallower(self) -> Option<Self> {
        Self::from_depth(self.depth() - 1)
    }
}

impl std::fmt::Display for RegionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "level{}", self.depth())
    }
}

/// Property names carrying each level's identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchySchema {
    pub level1: String,
    pub level2: String,
    pub level3: String,
}

impl Default for HierarchySchema {
    fn default() -> Self {
        Self {
            level1: "kab".to_string(),
            level2: "kec".to_string(),
            level3: "des".to_string(),
        }
    }
}

impl HierarchySchema {
    pub fn new(level1: impl Into<String>, level2: impl Into<String>, level3: impl Into<String>) -> Self {
        Self {
            level1: level1.into(),
            level2: level2.into(),
            level3: level3.into(),
        }
    }

    pub fn field(&self, level: RegionLevel) -> &str {
        match level {
            RegionLevel::Level1 => &self.level1,
            RegionLevel::Level2 => &self.level2,
            RegionLevel::Level3 => &self.level3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Region {
    Level1 {
        level1: String,
    },
    Level2 {
        level1: String,
        level2: String,
    },
    Level3 {
        level1: String,
        level2: String,
        level3: String,
    },
}

impl Region {
    pub fn level(&self) -> RegionLevel {
        match self {
            Region::Level1 { .. } => RegionLevel::Level1,
            Region::Level2 { .. } => RegionLevel::Level2,
            Region::Level3 { .. } => RegionLevel::Level3,
        }
    }

    /// Most specific identifier; what a popup shows.
    pub fn name(&self) -> &str {
        match self {
            Region::Level1 { level1 } => level1.as_str(),
            Region::Level2 { level2, .. } => level2.as_str(),
            Region::Level3 { level3, .. } => level3.as_str(),
        }
    }

    pub fn value(&self, level: RegionLevel) -> Option<&str> {
        match (self, level) {
            (Region::Level1 { level1 }, RegionLevel::Level1)
            | (Region::Level2 { level1, .. }, RegionLevel::Level1)
            | (Region::Level3 { level1, .. }, RegionLevel::Level1) => Some(level1.as_str()),
            (Region::Level2 { level2, .. }, RegionLevel::Level2)
            | (Region::Level3 { level2, .. }, RegionLevel::Level2) => Some(level2.as_str()),
            (Region::Level3 { level3, .. }, RegionLevel::Level3) => Some(level3.as_str()),
            _ => None,
        }
    }

    /// This region's ancestor at `level` (itself when `level` matches).
    pub fn ancestor(&self, level: RegionLevel) -> Option<Region> {
        if level > self.level() {
            return None;
        }
        let l1 = self.value(RegionLevel::Level1)?.to_string();
        Some(match level {
            RegionLevel::Level1 => Region::Level1 { level1: l1 },
            RegionLevel::Level2 => Region::Level2 {
                level1: l1,
                level2: self.value(RegionLevel::Level2)?.to_string(),
            },
            RegionLevel::Level3 => self.clone(),
        })
    }

    /// Deepest consistent placement described by `feature`'s properties.
    ///
    /// Walks the schema from the top and stops at the first missing or blank
    /// field, so a feature with `level1` and `level3` but no `level2` is a
    /// level-1 region. Values are kept verbatim; the services match them
    /// exactly.
    pub fn from_properties(feature: &Feature, schema: &HierarchySchema) -> Option<Region> {
        let value = |level| {
            feature
                .property_str(schema.field(level))
                .filter(|v| !v.trim().is_empty())
                .map(str::to_string)
        };
        let level1 = value(RegionLevel::Level1)?;
        let Some(level2) = value(RegionLevel::Level2) else {
            return Some(Region::Level1 { level1 });
        };
        let Some(level3) = value(RegionLevel::Level3) else {
            return Some(Region::Level2 { level1, level2 });
        };
        Some(Region::Level3 {
            level1,
            level2,
            level3,
        })
    }

    /// `(property, value)` equality pairs for the full ancestry, top first.
    pub fn equality_clauses(&self, schema: &HierarchySchema) -> Vec<(String, String)> {
        RegionLevel::ALL
            .iter()
            .filter_map(|&level| {
                self.value(level)
                    .map(|v| (schema.field(level).to_string(), v.to_string()))
            })
            .collect()
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Region::Level1 { level1 } => write!(f, "{level1}"),
            Region::Level2 { level1, level2 } => write!(f, "{level1} / {level2}"),
            Region::Level3 {
                level1,
                level2,
                level3,
            } => write!(f, "{level1} / {level2} / {level3}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexedRegion {
    pub id: FeatureId,
    pub region: Region,
    pub bounds: Option<Aabb2>,
}

/// Per-source lookup from feature id to placement and extent.
#[derive(Clone, Debug, Default)]
pub struct RegionIndex {
    by_id: BTreeMap<FeatureId, IndexedRegion>,
}

impl RegionIndex {
    /// Indexes every identified feature with a recognizable placement.
    /// Call after ids have been assigned.
    pub fn build(collection: &FeatureCollection, schema: &HierarchySchema) -> Self {
        let by_id = collection
            .features
            .iter()
            .filter_map(|feature| {
                let id = feature.id?;
                let region = Region::from_properties(feature, schema)?;
                Some((
                    id,
                    IndexedRegion {
                        id,
                        region,
                        bounds: feature.bounds(),
                    },
                ))
            })
            .collect();
        Self { by_id }
    }

    pub fn get(&self, id: FeatureId) -> Option<&IndexedRegion> {
        self.by_id.get(&id)
    }

    pub fn find(&self, region: &Region) -> Option<&IndexedRegion> {
        self.by_id.values().find(|r| &r.region == region)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedRegion> {
        self.by_id.values()
    }
}
