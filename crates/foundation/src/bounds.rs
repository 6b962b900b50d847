/// Geographic position as `[lon, lat]` in WGS84 degrees.
pub type LngLat = [f64; 2];

/// Axis-aligned bounding box in lon/lat space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb2 {
    pub min: LngLat,
    pub max: LngLat,
}

impl Aabb2 {
    pub fn new(min: LngLat, max: LngLat) -> Self {
        Aabb2 { min, max }
    }

    pub fn from_point(p: LngLat) -> Self {
        Aabb2 { min: p, max: p }
    }

    /// Smallest box containing every finite point; `None` when there are none.
    pub fn from_points(points: impl IntoIterator<Item = LngLat>) -> Option<Self> {
        let mut out: Option<Aabb2> = None;
        for p in points {
            if !(p[0].is_finite() && p[1].is_finite()) {
                continue;
            }
            match out.as_mut() {
                Some(b) => b.extend(p),
                None => out = Some(Aabb2::from_point(p)),
            }
        }
        out
    }

    pub fn extend(&mut self, p: LngLat) {
        self.min[0] = self.min[0].min(p[0]);
        self.min[1] = self.min[1].min(p[1]);
        self.max[0] = self.max[0].max(p[0]);
        self.max[1] = self.max[1].max(p[1]);
    }

    pub fn union(&self, other: &Aabb2) -> Aabb2 {
        let mut out = *self;
        out.extend(other.min);
        out.extend(other.max);
        out
    }

    pub fn center(&self) -> LngLat {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
        ]
    }

    pub fn contains(&self, p: LngLat) -> bool {
        p[0] >= self.min[0] && p[0] <= self.max[0] && p[1] >= self.min[1] && p[1] <= self.max[1]
    }
}
