//! Factor catalog snapshots and loaders.
//!
//! A [`FactorCatalog`] is an immutable set of emission factors. It is loaded
//! once (from CSV or JSON), validated, and then only read. The engine talks to
//! it through the [`FactorLookup`] trait so tests and other providers can hand
//! in plain slices instead.

use crate::types::{EmissionFactor, FactorIntensity};
use crate::units::Unit;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Read-only query capability over a set of emission factors
pub trait FactorLookup {
    /// Factor with the given id, if any
    fn factor(&self, id: &str) -> Option<&EmissionFactor>;

    /// All factors whose category matches (ASCII case-insensitive)
    fn factors_in_category(&self, category: &str) -> Vec<&EmissionFactor>;
}

impl FactorLookup for [EmissionFactor] {
    fn factor(&self, id: &str) -> Option<&EmissionFactor> {
        self.iter().find(|f| f.id == id)
    }

    fn factors_in_category(&self, category: &str) -> Vec<&EmissionFactor> {
        self.iter()
            .filter(|f| f.category.eq_ignore_ascii_case(category))
            .collect()
    }
}

/// An immutable, indexed snapshot of the factor catalog
#[derive(Clone, Debug)]
pub struct FactorCatalog {
    factors: Vec<EmissionFactor>,
    by_id: HashMap<String, usize>,
    by_category: HashMap<String, Vec<usize>>,
    origin: String,
    loaded_at: DateTime<Utc>,
}

impl FactorLookup for FactorCatalog {
    fn factor(&self, id: &str) -> Option<&EmissionFactor> {
        self.by_id.get(id).map(|&idx| &self.factors[idx])
    }

    fn factors_in_category(&self, category: &str) -> Vec<&EmissionFactor> {
        self.by_category
            .get(&category.to_ascii_lowercase())
            .map(|indices| indices.iter().map(|&idx| &self.factors[idx]).collect())
            .unwrap_or_default()
    }
}

/// CSV row format for factor tables
#[derive(Debug, Deserialize)]
struct CsvFactorRow {
    id: String,
    category: String,
    subcategory: Option<String>,
    region: String,
    year: i32,
    unit: String,
    co2_per_unit: f64,
    ch4_per_unit: Option<f64>,
    n2o_per_unit: Option<f64>,
    pre_weighted: Option<String>,
    source: String,
    organization_id: Option<String>,
}

impl TryFrom<CsvFactorRow> for EmissionFactor {
    type Error = Error;

    fn try_from(row: CsvFactorRow) -> Result<Self> {
        let pre_weighted = match row.pre_weighted.as_deref() {
            None => false,
            Some(flag) => parse_flag(flag).ok_or_else(|| {
                Error::CatalogValidation(format!(
                    "factor '{}': invalid pre_weighted value '{}'",
                    row.id, flag
                ))
            })?,
        };

        let ch4_per_unit = row.ch4_per_unit.unwrap_or(0.0);
        let n2o_per_unit = row.n2o_per_unit.unwrap_or(0.0);
        let intensity = if pre_weighted {
            FactorIntensity::Blended {
                co2e_per_unit: row.co2_per_unit,
                ch4_per_unit,
                n2o_per_unit,
            }
        } else {
            FactorIntensity::Components {
                co2_per_unit: row.co2_per_unit,
                ch4_per_unit,
                n2o_per_unit,
            }
        };

        Ok(EmissionFactor {
            id: row.id,
            category: row.category,
            subcategory: non_empty(row.subcategory),
            region: row.region.to_ascii_uppercase(),
            year: row.year,
            unit: row.unit,
            intensity,
            source: row.source,
            organization_id: non_empty(row.organization_id),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "" | "false" | "0" | "no" | "n" => Some(false),
        "true" | "1" | "yes" | "y" => Some(true),
        _ => None,
    }
}

impl FactorCatalog {
    /// Build an indexed snapshot from factor records
    pub fn new(factors: Vec<EmissionFactor>, origin: impl Into<String>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_category: HashMap<String, Vec<usize>> = HashMap::new();

        for (idx, factor) in factors.iter().enumerate() {
            by_id.entry(factor.id.clone()).or_insert(idx);
            by_category
                .entry(factor.category.to_ascii_lowercase())
                .or_default()
                .push(idx);
        }

        Self {
            factors,
            by_id,
            by_category,
            origin: origin.into(),
            loaded_at: Utc::now(),
        }
    }

    /// Load a catalog file, choosing the format from the extension
    ///
    /// `.csv` files are read as factor tables, `.json` files as an array of
    /// factor records. The file is held under a shared lock while reading.
    pub fn load(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let file = File::open(path)?;
        file.lock_shared()?;

        let origin = path.display().to_string();
        let loaded = match extension.as_deref() {
            Some("csv") => Self::from_csv_reader(BufReader::new(&file), origin),
            Some("json") => Self::from_json_reader(BufReader::new(&file), origin),
            _ => Err(Error::CatalogValidation(format!(
                "unsupported catalog format: {:?} (expected .csv or .json)",
                path
            ))),
        };

        file.unlock()?;

        let catalog = loaded?;
        tracing::info!("Loaded {} emission factors from {:?}", catalog.len(), path);
        Ok(catalog)
    }

    /// Parse a CSV factor table
    ///
    /// Any malformed row fails the whole load; rows are never skipped.
    pub fn from_csv_reader<R: Read>(reader: R, origin: impl Into<String>) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut factors = Vec::new();
        for (idx, row) in csv_reader.deserialize::<CsvFactorRow>().enumerate() {
            // Header is line 1
            let line = idx + 2;
            let row = row.map_err(|e| {
                Error::CatalogValidation(format!("line {}: {}", line, e))
            })?;
            let factor = EmissionFactor::try_from(row).map_err(|e| {
                Error::CatalogValidation(format!("line {}: {}", line, e))
            })?;
            factors.push(factor);
        }

        Ok(Self::new(factors, origin))
    }

    /// Parse a JSON array of factor records
    pub fn from_json_reader<R: Read>(reader: R, origin: impl Into<String>) -> Result<Self> {
        let factors: Vec<EmissionFactor> = serde_json::from_reader(reader)?;
        Ok(Self::new(factors, origin))
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EmissionFactor> {
        self.factors.iter()
    }

    /// Where this snapshot was loaded from
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Validate the catalog for consistency
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut seen_ids = HashSet::new();
        let mut seen_keys: HashMap<(String, Option<String>, String, i32, Option<String>), &str> =
            HashMap::new();

        for factor in &self.factors {
            let id = factor.id.as_str();
            if id.trim().is_empty() {
                errors.push("Emission factor has empty ID".to_string());
            } else if !seen_ids.insert(id) {
                errors.push(format!("Duplicate factor ID '{}'", id));
            }

            if factor.category.trim().is_empty() {
                errors.push(format!("Factor '{}' has empty category", id));
            }
            if factor.region.trim().is_empty() {
                errors.push(format!("Factor '{}' has empty region", id));
            }
            if factor.source.trim().is_empty() {
                errors.push(format!("Factor '{}' has empty source", id));
            }
            if let Some(owner) = &factor.organization_id {
                if owner.trim().is_empty() {
                    errors.push(format!("Factor '{}' has empty organization ID", id));
                }
            }

            if let Err(e) = Unit::parse(&factor.unit) {
                errors.push(format!("Factor '{}': {}", id, e));
            }

            let coefficients = [
                ("primary", factor.intensity.primary_per_unit()),
                ("ch4", factor.intensity.ch4_per_unit()),
                ("n2o", factor.intensity.n2o_per_unit()),
            ];
            for (name, value) in coefficients {
                if !value.is_finite() || value < 0.0 {
                    errors.push(format!(
                        "Factor '{}': {} coefficient {} must be finite and non-negative",
                        id, name, value
                    ));
                }
            }

            let key = (
                factor.category.to_ascii_lowercase(),
                factor.subcategory.as_ref().map(|s| s.to_ascii_lowercase()),
                factor.region.to_ascii_uppercase(),
                factor.year,
                factor.organization_id.clone(),
            );
            if let Some(first) = seen_keys.insert(key, id) {
                errors.push(format!(
                    "Factors '{}' and '{}' share the same category/subcategory/region/year/organization",
                    first, id
                ));
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_CSV: &str = "\
id,category,subcategory,region,year,unit,co2_per_unit,ch4_per_unit,n2o_per_unit,pre_weighted,source,organization_id
diesel-de-2024,diesel,,DE,2024,liter,2.68,,,false,UBA 2024,
grid-de-2024,electricity,,de,2024,kWh,0.38,,,true,UBA 2024,
grid-de-2024-acme,electricity,,DE,2024,kWh,0.05,,,yes,Acme PPA,acme
ng-global-2023,natural_gas,,GLOBAL,2023,m3,1.88,0.000037,0.0000035,0,IPCC 2006,
";

    fn sample_catalog() -> FactorCatalog {
        FactorCatalog::from_csv_reader(SAMPLE_CSV.as_bytes(), "sample").unwrap()
    }

    #[test]
    fn test_csv_loads_both_shapes() {
        let catalog = sample_catalog();
        assert_eq!(catalog.len(), 4);

        let diesel = catalog.factor("diesel-de-2024").unwrap();
        assert!(!diesel.intensity.is_pre_weighted());
        assert_eq!(diesel.intensity.primary_per_unit(), 2.68);
        assert_eq!(diesel.intensity.ch4_per_unit(), 0.0);
        assert!(diesel.subcategory.is_none());
        assert!(diesel.is_global());

        let grid = catalog.factor("grid-de-2024").unwrap();
        assert!(grid.intensity.is_pre_weighted());
        assert_eq!(grid.region, "DE");

        let acme = catalog.factor("grid-de-2024-acme").unwrap();
        assert_eq!(acme.organization_id.as_deref(), Some("acme"));

        let gas = catalog.factor("ng-global-2023").unwrap();
        assert_eq!(gas.intensity.n2o_per_unit(), 0.0000035);
    }

    #[test]
    fn test_category_lookup_is_case_insensitive() {
        let catalog = sample_catalog();
        assert_eq!(catalog.factors_in_category("Electricity").len(), 2);
        assert!(catalog.factors_in_category("coal").is_empty());
    }

    #[test]
    fn test_malformed_row_reports_line() {
        let csv = "\
id,category,subcategory,region,year,unit,co2_per_unit,ch4_per_unit,n2o_per_unit,pre_weighted,source,organization_id
ok,diesel,,DE,2024,liter,2.68,,,false,UBA,
bad,diesel,,DE,not-a-year,liter,2.68,,,false,UBA,
";
        let err = FactorCatalog::from_csv_reader(csv.as_bytes(), "bad").unwrap_err();
        match err {
            Error::CatalogValidation(msg) => assert!(msg.contains("line 3"), "{}", msg),
            other => panic!("Expected CatalogValidation, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_pre_weighted_flag() {
        let csv = "\
id,category,subcategory,region,year,unit,co2_per_unit,ch4_per_unit,n2o_per_unit,pre_weighted,source,organization_id
x,diesel,,DE,2024,liter,2.68,,,maybe,UBA,
";
        assert!(FactorCatalog::from_csv_reader(csv.as_bytes(), "bad").is_err());
    }

    #[test]
    fn test_load_json_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("factors.json");
        let json = r#"[
            {
                "id": "diesel-global-2024",
                "category": "diesel",
                "region": "GLOBAL",
                "year": 2024,
                "unit": "liter",
                "intensity": { "shape": "components", "co2_per_unit": 2.68 },
                "source": "IPCC"
            },
            {
                "id": "grid-fr-2024",
                "category": "electricity",
                "region": "FR",
                "year": 2024,
                "unit": "kWh",
                "intensity": { "shape": "blended", "co2e_per_unit": 0.052 },
                "source": "ADEME",
                "organization_id": null
            }
        ]"#;
        std::fs::File::create(&path)
            .unwrap()
            .write_all(json.as_bytes())
            .unwrap();

        let catalog = FactorCatalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.factor("grid-fr-2024").unwrap().intensity.is_pre_weighted());
        assert!(catalog.validate().is_empty());
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("factors.xlsx");
        std::fs::write(&path, "whatever").unwrap();
        assert!(matches!(
            FactorCatalog::load(&path),
            Err(Error::CatalogValidation(_))
        ));
    }

    #[test]
    fn test_sample_catalog_validates() {
        let errors = sample_catalog().validate();
        assert!(errors.is_empty(), "Unexpected validation errors: {:?}", errors);
    }

    #[test]
    fn test_validate_flags_problems() {
        let csv = "\
id,category,subcategory,region,year,unit,co2_per_unit,ch4_per_unit,n2o_per_unit,pre_weighted,source,organization_id
a,diesel,,DE,2024,liter,2.68,,,false,UBA,
a,diesel,,XX,2024,liter,2.68,,,false,UBA,
b,diesel,,de,2024,litre,2.70,,,false,Other,
c,coal,,DE,2024,furlong,1.0,,,false,UBA,
d,coal,,DE,2023,kg,-1.0,,,false,UBA,
";
        let catalog = FactorCatalog::from_csv_reader(csv.as_bytes(), "bad").unwrap();
        let errors = catalog.validate();

        assert!(errors.iter().any(|e| e.contains("Duplicate factor ID 'a'")));
        assert!(errors.iter().any(|e| e.contains("'a' and 'b'")));
        assert!(errors.iter().any(|e| e.contains("furlong")));
        assert!(errors.iter().any(|e| e.contains("non-negative")));
    }

    #[test]
    fn test_slice_lookup() {
        let catalog = sample_catalog();
        let factors: Vec<EmissionFactor> = catalog.iter().cloned().collect();
        let slice: &[EmissionFactor] = &factors;
        assert!(slice.factor("diesel-de-2024").is_some());
        assert_eq!(slice.factors_in_category("ELECTRICITY").len(), 2);
    }
}
