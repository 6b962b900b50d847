use serde::{Deserialize, Serialize};

use crate::region::{Region, RegionLevel};

/// Drill position derived from breadcrumb depth.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrillState {
    Home,
    AtLevel1,
    AtLevel2,
    AtLevel3,
}

impl DrillState {
    pub fn level(self) -> Option<RegionLevel> {
        match self {
            DrillState::Home => None,
            DrillState::AtLevel1 => Some(RegionLevel::Level1),
            DrillState::AtLevel2 => Some(RegionLevel::Level2),
            DrillState::AtLevel3 => Some(RegionLevel::Level3),
        }
    }
}

/// Navigation trail `{level1?, level2?, level3?}`.
///
/// A deeper field is never set while a shallower one is unset, and setting a
/// field clears everything below it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BreadcrumbParts", into = "BreadcrumbParts")]
pub struct Breadcrumb {
    level1: Option<String>,
    level2: Option<String>,
    level3: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct BreadcrumbParts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    level1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    level2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    level3: Option<String>,
}

impl From<BreadcrumbParts> for Breadcrumb {
    fn from(p: BreadcrumbParts) -> Self {
        Breadcrumb::from_parts(p.level1, p.level2, p.level3)
    }
}

impl From<Breadcrumb> for BreadcrumbParts {
    fn from(b: Breadcrumb) -> Self {
        BreadcrumbParts {
            level1: b.level1,
            level2: b.level2,
            level3: b.level3,
        }
    }
}

impl Breadcrumb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a trail from loose parts, truncating at the first gap.
    pub fn from_parts(
        level1: Option<String>,
        level2: Option<String>,
        level3: Option<String>,
    ) -> Self {
        let keep = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let mut out = Breadcrumb::new();
        let Some(l1) = keep(level1) else {
            return out;
        };
        out.level1 = Some(l1);
        let Some(l2) = keep(level2) else {
            return out;
        };
        out.level2 = Some(l2);
        out.level3 = keep(level3);
        out
    }

    pub fn from_region(region: &Region) -> Self {
        Self::from_parts(
            region.value(RegionLevel::Level1).map(str::to_string),
            region.value(RegionLevel::Level2).map(str::to_string),
            region.value(RegionLevel::Level3).map(str::to_string),
        )
    }

    pub fn level1(&self) -> Option<&str> {
        self.level1.as_deref()
    }

    pub fn level2(&self) -> Option<&str> {
        self.level2.as_deref()
    }

    pub fn level3(&self) -> Option<&str> {
        self.level3.as_deref()
    }

    pub fn get(&self, level: RegionLevel) -> Option<&str> {
        match level {
            RegionLevel::Level1 => self.level1(),
            RegionLevel::Level2 => self.level2(),
            RegionLevel::Level3 => self.level3(),
        }
    }

    /// Sets `level` and clears every deeper field.
    ///
    /// Refused (returns `false`, trail unchanged) when a shallower field is
    /// unset or the value is blank.
    pub fn set(&mut self, level: RegionLevel, value: impl Into<String>) -> bool {
        let value = value.into();
        if value.trim().is_empty() {
            return false;
        }
        if let Some(parent) = level.shallower() {
            if self.get(parent).is_none() {
                return false;
            }
        }
        self.truncate(level);
        match level {
            RegionLevel::Level1 => self.level1 = Some(value),
            RegionLevel::Level2 => self.level2 = Some(value),
            RegionLevel::Level3 => self.level3 = Some(value),
        }
        true
    }

    /// Keeps fields up to and including `level`.
    pub fn truncate(&mut self, level: RegionLevel) {
        if level < RegionLevel::Level3 {
            self.level3 = None;
        }
        if level < RegionLevel::Level2 {
            self.level2 = None;
        }
    }

    pub fn clear(&mut self) {
        *self = Breadcrumb::new();
    }

    pub fn is_empty(&self) -> bool {
        self.level1.is_none()
    }

    pub fn depth(&self) -> usize {
        [&self.level1, &self.level2, &self.level3]
            .iter()
            .take_while(|v| v.is_some())
            .count()
    }

    pub fn deepest(&self) -> Option<RegionLevel> {
        RegionLevel::from_depth(self.depth())
    }

    pub fn state(&self) -> DrillState {
        match self.deepest() {
            None => DrillState::Home,
            Some(RegionLevel::Level1) => DrillState::AtLevel1,
            Some(RegionLevel::Level2) => DrillState::AtLevel2,
            Some(RegionLevel::Level3) => DrillState::AtLevel3,
        }
    }

    /// Region named by the whole trail.
    pub fn region(&self) -> Option<Region> {
        self.deepest().and_then(|level| self.region_at(level))
    }

    /// Region named by the trail up to `level`; `None` if `level` is not set.
    pub fn region_at(&self, level: RegionLevel) -> Option<Region> {
        let level1 = self.level1.clone()?;
        Some(match level {
            RegionLevel::Level1 => Region::Level1 { level1 },
            RegionLevel::Level2 => Region::Level2 {
                level1,
                level2: self.level2.clone()?,
            },
            RegionLevel::Level3 => Region::Level3 {
                level1,
                level2: self.level2.clone()?,
                level3: self.level3.clone()?,
            },
        })
    }

    /// Set fields, top first.
    pub fn trail(&self) -> Vec<(RegionLevel, &str)> {
        RegionLevel::ALL
            .iter()
            .filter_map(|&level| self.get(level).map(|v| (level, v)))
            .collect()
    }
}

impl std::fmt::Display for Breadcrumb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "Home");
        }
        let names: Vec<&str> = self.trail().into_iter().map(|(_, v)| v).collect();
        write!(f, "Home > {}", names.join(" > "))
    }
}
