/// Stable per-feature identifier; feature-state flags (hover) are keyed by it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureId(pub u64);

impl FeatureId {
    pub fn new(n: u64) -> Self {
        FeatureId(n)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
