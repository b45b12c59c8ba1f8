//! Calculation engine turning activity data into CO2e.
//!
//! A calculation runs in a fixed order and aborts on the first failure:
//! - Validate the input (non-positive quantities never reach the catalog)
//! - Resolve the emission factor
//! - Convert the activity quantity into the factor's unit
//! - Weight the gases and assemble the result with provenance
//!
//! Only the presented `co2e` is rounded. Components and `co2e_unrounded`
//! keep full precision so sums over many results stay consistent.

use crate::catalog::FactorLookup;
use crate::resolver::{resolve, FactorQuery, Resolution};
use crate::types::{ActivityInput, CalculationResult, EmissionFactor, FactorIntensity, FactorUsed};
use crate::units::{self, Unit};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Global warming potentials applied to component factors
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GwpValues {
    pub ch4: f64,
    pub n2o: f64,
}

impl GwpValues {
    /// IPCC Fourth Assessment Report, 100-year horizon
    pub const AR4: GwpValues = GwpValues { ch4: 25.0, n2o: 298.0 };
    /// IPCC Fifth Assessment Report, 100-year horizon
    pub const AR5: GwpValues = GwpValues { ch4: 28.0, n2o: 265.0 };
    /// IPCC Sixth Assessment Report, 100-year horizon
    pub const AR6: GwpValues = GwpValues { ch4: 27.9, n2o: 273.0 };
}

impl Default for GwpValues {
    fn default() -> Self {
        Self::AR4
    }
}

/// Tunables for a calculation, usually built from [`crate::Config`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalculationSettings {
    pub gwp: GwpValues,
    /// Decimal places of the presented `co2e`
    pub co2e_decimal_places: u32,
}

impl Default for CalculationSettings {
    fn default() -> Self {
        Self {
            gwp: GwpValues::default(),
            co2e_decimal_places: 3,
        }
    }
}

/// Calculate the emissions of one activity for `organization_id`
///
/// ## Failure modes
///
/// - `InvalidInput` - non-positive or non-finite quantity, empty category or
///   region, or a unit the factor's unit cannot be reached from (the
///   `UnitError` is attached as the source)
/// - `FactorNotFound` / `AmbiguousFactor` - from resolution
/// - `InvalidFactor` - the resolved factor has an unknown unit or negative
///   coefficients
pub fn calculate<C>(
    catalog: &C,
    input: &ActivityInput,
    organization_id: &str,
    settings: &CalculationSettings,
) -> Result<CalculationResult>
where
    C: FactorLookup + ?Sized,
{
    validate_input(input)?;

    let resolution = resolve(catalog, &FactorQuery::for_input(input, organization_id))?;
    let factor = resolution.factor;
    check_factor(factor)?;

    let converted = units::convert(input.activity_value, &input.activity_unit, &factor.unit)
        .map_err(|cause| Error::InvalidInput {
            field: "activity_unit".into(),
            reason: format!("cannot express activity in factor unit: {}", cause),
            cause: Some(cause),
        })?;

    let co2_component = converted * factor.intensity.primary_per_unit();
    let ch4_component = converted * factor.intensity.ch4_per_unit();
    let n2o_component = converted * factor.intensity.n2o_per_unit();

    let co2e_unrounded = match factor.intensity {
        FactorIntensity::Blended { .. } => co2_component,
        FactorIntensity::Components { .. } => {
            co2_component + ch4_component * settings.gwp.ch4 + n2o_component * settings.gwp.n2o
        }
    };

    let masses = [co2e_unrounded, co2_component, ch4_component, n2o_component];
    if masses.iter().any(|m| !m.is_finite()) {
        return Err(Error::invalid_input(
            "activity_value",
            format!(
                "emissions for {} {} exceed the representable range",
                input.activity_value, input.activity_unit
            ),
        ));
    }

    tracing::debug!(
        "{} {} {} -> {} {} x '{}' = {} kg CO2e",
        input.activity_value,
        input.activity_unit,
        input.category,
        converted,
        factor.unit,
        factor.id,
        co2e_unrounded
    );

    Ok(CalculationResult {
        co2e: round_to(co2e_unrounded, settings.co2e_decimal_places),
        co2e_unrounded,
        co2_component,
        ch4_component,
        n2o_component,
        factor_used: factor_used(&resolution),
        converted_activity_value: converted,
        converted_unit: factor.unit.clone(),
    })
}

fn validate_input(input: &ActivityInput) -> Result<()> {
    if !input.activity_value.is_finite() || input.activity_value <= 0.0 {
        return Err(Error::invalid_input(
            "activity_value",
            format!("must be a positive number, got {}", input.activity_value),
        ));
    }
    if input.category.trim().is_empty() {
        return Err(Error::invalid_input("category", "must not be empty"));
    }
    if input.region.trim().is_empty() {
        return Err(Error::invalid_input("region", "must not be empty"));
    }
    Ok(())
}

fn check_factor(factor: &EmissionFactor) -> Result<()> {
    let invalid = |reason: String| Error::InvalidFactor {
        id: factor.id.clone(),
        reason,
    };

    Unit::parse(&factor.unit).map_err(|e| invalid(e.to_string()))?;

    let coefficients = [
        factor.intensity.primary_per_unit(),
        factor.intensity.ch4_per_unit(),
        factor.intensity.n2o_per_unit(),
    ];
    if coefficients.iter().any(|c| !c.is_finite() || *c < 0.0) {
        return Err(invalid(format!(
            "coefficients must be finite and non-negative, got {:?}",
            coefficients
        )));
    }
    Ok(())
}

fn factor_used(resolution: &Resolution<'_>) -> FactorUsed {
    let factor = resolution.factor;
    FactorUsed {
        id: factor.id.clone(),
        source: factor.source.clone(),
        year: factor.year,
        region: factor.region.clone(),
        organization_id: factor.organization_id.clone(),
        category: factor.category.clone(),
        subcategory: factor.subcategory.clone(),
        match_rule: resolution.rule,
        year_fallback: resolution.year_fallback,
        pre_weighted: factor.intensity.is_pre_weighted(),
    }
}

/// Round for presentation only; values that cannot be scaled are returned as is
fn round_to(value: f64, decimal_places: u32) -> f64 {
    let Ok(exponent) = i32::try_from(decimal_places) else {
        return value;
    };
    let scale = 10f64.powi(exponent);
    let scaled = value * scale;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnitError;
    use crate::types::MatchRule;
    use std::cell::Cell;

    /// Lookup that records how often it is queried
    struct CountingLookup {
        factors: Vec<EmissionFactor>,
        queries: Cell<usize>,
    }

    impl FactorLookup for CountingLookup {
        fn factor(&self, id: &str) -> Option<&EmissionFactor> {
            self.queries.set(self.queries.get() + 1);
            self.factors.as_slice().factor(id)
        }

        fn factors_in_category(&self, category: &str) -> Vec<&EmissionFactor> {
            self.queries.set(self.queries.get() + 1);
            self.factors.as_slice().factors_in_category(category)
        }
    }

    fn diesel_factor() -> EmissionFactor {
        EmissionFactor {
            id: "diesel-de-2024".into(),
            category: "diesel".into(),
            subcategory: None,
            region: "DE".into(),
            year: 2024,
            unit: "liter".into(),
            intensity: FactorIntensity::Components {
                co2_per_unit: 2.68,
                ch4_per_unit: 0.0,
                n2o_per_unit: 0.0,
            },
            source: "UBA 2024".into(),
            organization_id: None,
        }
    }

    fn diesel_input(value: f64, unit: &str) -> ActivityInput {
        ActivityInput {
            activity_value: value,
            activity_unit: unit.into(),
            category: "diesel".into(),
            subcategory: None,
            region: "DE".into(),
            year: 2024,
            factor_id: None,
        }
    }

    #[test]
    fn test_diesel_end_to_end() {
        crate::logging::init_test();
        let factors = vec![diesel_factor()];
        let result = calculate(
            factors.as_slice(),
            &diesel_input(1000.0, "liter"),
            "acme",
            &CalculationSettings::default(),
        )
        .unwrap();

        assert_eq!(result.co2e, 2680.0);
        assert!((result.co2e_unrounded - 2680.0).abs() < 1e-9);
        assert_eq!(result.converted_activity_value, 1000.0);
        assert_eq!(result.converted_unit, "liter");
        assert_eq!(result.ch4_component, 0.0);
        assert_eq!(result.n2o_component, 0.0);
        assert_eq!(result.factor_used.id, "diesel-de-2024");
        assert_eq!(result.factor_used.source, "UBA 2024");
        assert_eq!(result.factor_used.year, 2024);
        assert_eq!(result.factor_used.region, "DE");
        assert_eq!(result.factor_used.organization_id, None);
        assert_eq!(result.factor_used.match_rule, MatchRule::GlobalExact);
        assert!(!result.factor_used.pre_weighted);
    }

    #[test]
    fn test_non_positive_value_rejected_before_lookup() {
        let lookup = CountingLookup {
            factors: vec![diesel_factor()],
            queries: Cell::new(0),
        };

        for value in [-5.0, 0.0, f64::NAN, f64::INFINITY] {
            let err = calculate(
                &lookup,
                &diesel_input(value, "liter"),
                "acme",
                &CalculationSettings::default(),
            )
            .unwrap_err();
            assert_eq!(err.code(), "INVALID_INPUT");
        }

        assert_eq!(lookup.queries.get(), 0);
    }

    #[test]
    fn test_unit_mismatch_surfaces_as_invalid_input() {
        let factors = vec![diesel_factor()];
        let err = calculate(
            factors.as_slice(),
            &diesel_input(10.0, "kg"),
            "acme",
            &CalculationSettings::default(),
        )
        .unwrap_err();

        match &err {
            Error::InvalidInput { field, cause, .. } => {
                assert_eq!(field, "activity_unit");
                assert!(matches!(cause, Some(UnitError::UnitMismatch { .. })));
            }
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_unit_surfaces_as_invalid_input() {
        let factors = vec![diesel_factor()];
        let err = calculate(
            factors.as_slice(),
            &diesel_input(10.0, "hogshead"),
            "acme",
            &CalculationSettings::default(),
        )
        .unwrap_err();

        assert_eq!(err.code(), "INVALID_INPUT");
        assert!(matches!(err.unit_error(), Some(UnitError::UnknownUnit { .. })));
    }

    #[test]
    fn test_activity_converted_into_factor_unit() {
        let factors = vec![diesel_factor()];
        let result = calculate(
            factors.as_slice(),
            &diesel_input(100.0, "US gallons"),
            "acme",
            &CalculationSettings::default(),
        )
        .unwrap();

        assert!((result.converted_activity_value - 378.5411784).abs() < 1e-9);
        assert_eq!(result.converted_unit, "liter");
        assert!((result.co2_component - 378.5411784 * 2.68).abs() < 1e-9);
    }

    #[test]
    fn test_component_factor_weighted_by_gwp() {
        let mut factor = diesel_factor();
        factor.intensity = FactorIntensity::Components {
            co2_per_unit: 2.0,
            ch4_per_unit: 0.001,
            n2o_per_unit: 0.0001,
        };
        let factors = vec![factor];

        let result = calculate(
            factors.as_slice(),
            &diesel_input(100.0, "liter"),
            "acme",
            &CalculationSettings::default(),
        )
        .unwrap();

        // 200 + 0.1 * 25 + 0.01 * 298
        assert!((result.co2e_unrounded - 205.48).abs() < 1e-9);
        assert_eq!(result.co2e, 205.48);
        assert!((result.ch4_component - 0.1).abs() < 1e-12);
        assert!((result.n2o_component - 0.01).abs() < 1e-12);

        let ar5 = CalculationSettings {
            gwp: GwpValues::AR5,
            ..CalculationSettings::default()
        };
        let result = calculate(factors.as_slice(), &diesel_input(100.0, "liter"), "acme", &ar5)
            .unwrap();
        // 200 + 0.1 * 28 + 0.01 * 265
        assert!((result.co2e_unrounded - 205.45).abs() < 1e-9);
    }

    #[test]
    fn test_blended_factor_never_double_counts() {
        let mut factor = diesel_factor();
        factor.intensity = FactorIntensity::Blended {
            co2e_per_unit: 2.70,
            ch4_per_unit: 0.001,
            n2o_per_unit: 0.0001,
        };
        let factors = vec![factor];

        let result = calculate(
            factors.as_slice(),
            &diesel_input(100.0, "liter"),
            "acme",
            &CalculationSettings::default(),
        )
        .unwrap();

        assert!((result.co2e_unrounded - 270.0).abs() < 1e-9);
        assert!((result.ch4_component - 0.1).abs() < 1e-12);
        assert!(result.factor_used.pre_weighted);
    }

    #[test]
    fn test_only_presented_value_is_rounded() {
        let mut factor = diesel_factor();
        factor.intensity = FactorIntensity::Components {
            co2_per_unit: 0.123456789,
            ch4_per_unit: 0.0,
            n2o_per_unit: 0.0,
        };
        let factors = vec![factor];
        let settings = CalculationSettings {
            co2e_decimal_places: 2,
            ..CalculationSettings::default()
        };

        let result = calculate(factors.as_slice(), &diesel_input(3.0, "liter"), "acme", &settings)
            .unwrap();

        assert_eq!(result.co2e, 0.37);
        assert!((result.co2e_unrounded - 0.370370367).abs() < 1e-12);
        assert_eq!(result.co2_component, result.co2e_unrounded);
    }

    #[test]
    fn test_missing_factor_propagates() {
        let factors = vec![diesel_factor()];
        let mut input = diesel_input(10.0, "liter");
        input.category = "unknown_fuel".into();
        input.region = "ZZ".into();

        let err = calculate(factors.as_slice(), &input, "acme", &CalculationSettings::default())
            .unwrap_err();
        assert_eq!(err.code(), "FACTOR_NOT_FOUND");
    }

    #[test]
    fn test_negative_factor_rejected() {
        let mut factor = diesel_factor();
        factor.intensity = FactorIntensity::Components {
            co2_per_unit: -2.68,
            ch4_per_unit: 0.0,
            n2o_per_unit: 0.0,
        };
        let factors = vec![factor];

        let err = calculate(
            factors.as_slice(),
            &diesel_input(10.0, "liter"),
            "acme",
            &CalculationSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidFactor { .. }));
    }

    #[test]
    fn test_repeated_calls_are_byte_identical() {
        let factors = vec![diesel_factor()];
        let input = diesel_input(1234.5678, "us gal");
        let settings = CalculationSettings::default();

        let first = calculate(factors.as_slice(), &input, "acme", &settings).unwrap();
        let second = calculate(factors.as_slice(), &input, "acme", &settings).unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(2680.0000000000005, 3), 2680.0);
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(1.5, 0), 2.0);
    }

    #[test]
    fn test_round_to_leaves_unscalable_values_alone() {
        assert_eq!(round_to(4.0e305, 3), 4.0e305);
        assert_eq!(round_to(1.25, 400), 1.25);
        assert_eq!(round_to(1.25, u32::MAX), 1.25);
    }

    fn kwh_factor(co2_per_unit: f64, ch4_per_unit: f64) -> EmissionFactor {
        EmissionFactor {
            id: "grid-de-2024".into(),
            category: "electricity".into(),
            subcategory: None,
            region: "DE".into(),
            year: 2024,
            unit: "kWh".into(),
            intensity: FactorIntensity::Components {
                co2_per_unit,
                ch4_per_unit,
                n2o_per_unit: 0.0,
            },
            source: "UBA 2024".into(),
            organization_id: None,
        }
    }

    fn electricity_input(value: f64, unit: &str) -> ActivityInput {
        ActivityInput {
            activity_value: value,
            activity_unit: unit.into(),
            category: "electricity".into(),
            subcategory: None,
            region: "DE".into(),
            year: 2024,
            factor_id: None,
        }
    }

    #[test]
    fn test_conversion_overflow_is_invalid_input() {
        let factors = vec![kwh_factor(0.4, 0.0)];
        let err = calculate(
            factors.as_slice(),
            &electricity_input(1e306, "GWh"),
            "acme",
            &CalculationSettings::default(),
        )
        .unwrap_err();

        assert_eq!(err.code(), "INVALID_INPUT");
        assert!(matches!(err.unit_error(), Some(UnitError::OutOfRange { .. })));
    }

    #[test]
    fn test_weighted_overflow_is_invalid_input() {
        // converted quantity fits, ch4 weighting does not
        let factors = vec![kwh_factor(0.4, 1e5)];
        let err = calculate(
            factors.as_slice(),
            &electricity_input(1e306, "kWh"),
            "acme",
            &CalculationSettings::default(),
        )
        .unwrap_err();

        match err {
            Error::InvalidInput { field, .. } => assert_eq!(field, "activity_value"),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_huge_finite_result_is_not_rounded_to_infinity() {
        let factors = vec![kwh_factor(0.4, 0.0)];
        let result = calculate(
            factors.as_slice(),
            &electricity_input(1e306, "kWh"),
            "acme",
            &CalculationSettings::default(),
        )
        .unwrap();

        assert!(result.co2e.is_finite());
        assert_eq!(result.co2e, result.co2e_unrounded);
        assert!(serde_json::to_string(&result).unwrap().contains("\"co2e\":4"));
    }
}
