//! Declarative paint for boundary and coverage layers.
//!
//! Colors that depend on a feature's `hover` state are expressed as a
//! [`ColorRule`] and evaluated by the engine per feature.

pub const HOVER_STATE: &str = "hover";

pub const HIGHLIGHT: &str = "#27CBFC";
pub const DEFAULT_OUTLINE: &str = "white";
pub const TRANSPARENT: &str = "rgba(0,0,0,0)";

#[derive(Debug, Clone, PartialEq)]
pub enum ColorRule {
    Constant(String),
    /// `active` while the feature-state flag `state` is true, else `inactive`.
    WhenState {
        state: String,
        active: String,
        inactive: String,
    },
}

impl ColorRule {
    pub fn constant(color: impl Into<String>) -> Self {
        ColorRule::Constant(color.into())
    }

    pub fn on_hover(active: impl Into<String>, inactive: impl Into<String>) -> Self {
        ColorRule::WhenState {
            state: HOVER_STATE.to_string(),
            active: active.into(),
            inactive: inactive.into(),
        }
    }

    /// Resolves the color given a lookup of the feature's state flags.
    pub fn evaluate(&self, flag: impl Fn(&str) -> bool) -> &str {
        match self {
            ColorRule::Constant(c) => c.as_str(),
            ColorRule::WhenState {
                state,
                active,
                inactive,
            } => {
                if flag(state.as_str()) {
                    active.as_str()
                } else {
                    inactive.as_str()
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Paint {
    Fill {
        color: ColorRule,
        opacity: f32,
        outline: ColorRule,
    },
    Line {
        color: ColorRule,
        width: f32,
        opacity: f32,
    },
    Raster {
        opacity: f32,
    },
}

impl Paint {
    /// Transparent fill whose outline lights up under the pointer.
    pub fn boundary_fill() -> Self {
        Paint::Fill {
            color: ColorRule::constant("transparent"),
            opacity: 0.5,
            outline: ColorRule::on_hover(HIGHLIGHT, DEFAULT_OUTLINE),
        }
    }

    /// Thick stroke drawn only for the hovered feature.
    pub fn hover_outline() -> Self {
        Paint::Line {
            color: ColorRule::on_hover(HIGHLIGHT, TRANSPARENT),
            width: 2.0,
            opacity: 0.98,
        }
    }

    pub fn coverage_raster() -> Self {
        Paint::Raster { opacity: 1.0 }
    }
}
