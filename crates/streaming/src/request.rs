use scene::{HierarchySchema, Region};
use url::form_urlencoded;

/// Identifies one registered in-flight fetch.
///
/// A small, copyable handle so settlement can tell whether the registry entry
/// it finds is still its own.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Request(pub u64);

/// Cancellation epoch. Work issued under an older generation is discarded.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Generation {
        Generation(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Conjunction of `property = 'value'` clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureFilter {
    clauses: Vec<(String, String)>,
}

impl FeatureFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.push((property.into(), value.into()));
        self
    }

    /// Matches `region` by its full ancestry.
    pub fn for_region(region: &Region, schema: &HierarchySchema) -> Self {
        Self {
            clauses: region.equality_clauses(schema),
        }
    }

    pub fn clauses(&self) -> &[(String, String)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// CQL expression, e.g. `kab='Sintang' AND kec='O''Neil'`.
    pub fn to_cql(&self) -> String {
        self.clauses
            .iter()
            .map(|(k, v)| format!("{k}='{}'", v.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

impl std::fmt::Display for FeatureFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_cql())
    }
}

/// One request to the vector feature service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorQuery {
    pub layer_name: String,
    pub filter: Option<FeatureFilter>,
}

impl VectorQuery {
    pub fn all(layer_name: impl Into<String>) -> Self {
        Self {
            layer_name: layer_name.into(),
            filter: None,
        }
    }

    pub fn filtered(layer_name: impl Into<String>, filter: FeatureFilter) -> Self {
        Self {
            layer_name: layer_name.into(),
            filter: Some(filter).filter(|f| !f.is_empty()),
        }
    }

    pub fn cql(&self) -> Option<String> {
        self.filter.as_ref().map(FeatureFilter::to_cql)
    }

    pub fn cache_key(&self) -> String {
        let filter = self.cql().unwrap_or_else(|| "all".to_string());
        format!("geojson_{}_{}", self.layer_name, filter)
    }
}

/// One request to the raster tile service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterQuery {
    pub filters: Vec<(String, String)>,
    pub year: i32,
}

impl RasterQuery {
    pub fn unfiltered(year: i32) -> Self {
        Self {
            filters: Vec::new(),
            year,
        }
    }

    pub fn for_region(region: &Region, schema: &HierarchySchema, year: i32) -> Self {
        Self {
            filters: region.equality_clauses(schema),
            year,
        }
    }

    /// Query parameters in wire order; `year` always last.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut out = self.filters.clone();
        out.push(("year".to_string(), self.year.to_string()));
        out
    }

    pub fn query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params())
            .finish()
    }

    pub fn cache_key(&self) -> String {
        format!("gee_{}", self.query_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{FeatureFilter, Generation, RasterQuery, VectorQuery};
    use pretty_assertions::assert_eq;
    use scene::{HierarchySchema, Region};

    #[test]
    fn cql_doubles_single_quotes() {
        let f = FeatureFilter::new().where_eq("kab", "Sintang").where_eq("kec", "O'Neil");
        assert_eq!(f.to_cql(), "kab='Sintang' AND kec='O''Neil'");
    }

    #[test]
    fn vector_cache_keys() {
        assert_eq!(VectorQuery::all("LTKL:kabupaten").cache_key(), "geojson_LTKL:kabupaten_all");
        let q = VectorQuery::filtered("LTKL:kecamatan", FeatureFilter::new().where_eq("kab", "Alpha"));
        assert_eq!(q.cache_key(), "geojson_LTKL:kecamatan_kab='Alpha'");
        // An empty filter is the same request as no filter.
        assert_eq!(
            VectorQuery::filtered("L", FeatureFilter::new()),
            VectorQuery::all("L")
        );
    }

    #[test]
    fn raster_query_uses_full_ancestry_and_year_last() {
        let region = Region::Level2 {
            level1: "Siak".into(),
            level2: "Sungai Apit".into(),
        };
        let q = RasterQuery::for_region(&region, &HierarchySchema::default(), 2020);
        assert_eq!(q.query_string(), "kab=Siak&kec=Sungai+Apit&year=2020");
        assert_eq!(q.cache_key(), "gee_kab=Siak&kec=Sungai+Apit&year=2020");
        assert_eq!(RasterQuery::unfiltered(2024).cache_key(), "gee_year=2024");
    }

    #[test]
    fn generations_advance() {
        let g = Generation::default();
        assert!(g.next() > g);
        assert_eq!(g.next().to_string(), "g1");
    }
}
