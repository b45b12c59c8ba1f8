//! Core domain types for the emissions engine.
//!
//! This module defines the fundamental types used throughout the system:
//! - Emission factors and their intensity shapes
//! - Activity inputs handed in by callers
//! - Calculation results with factor provenance

use serde::{Deserialize, Serialize};
use std::fmt;

/// Region code that marks a factor as applying everywhere
pub const GLOBAL_REGION: &str = "GLOBAL";

// ============================================================================
// Emission Factor Types
// ============================================================================

/// Per-unit greenhouse gas coefficients of a factor, in kg per expected unit
///
/// Source catalogs mix two shapes. Component factors list each gas separately
/// and are weighted by GWP at calculation time. Blended factors are already
/// expressed as CO2e; their gas columns, when present, are informational and
/// never added on top.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum FactorIntensity {
    Components {
        co2_per_unit: f64,
        #[serde(default)]
        ch4_per_unit: f64,
        #[serde(default)]
        n2o_per_unit: f64,
    },
    Blended {
        co2e_per_unit: f64,
        #[serde(default)]
        ch4_per_unit: f64,
        #[serde(default)]
        n2o_per_unit: f64,
    },
}

impl FactorIntensity {
    /// True when the leading coefficient already folds in all gases
    pub fn is_pre_weighted(&self) -> bool {
        matches!(self, FactorIntensity::Blended { .. })
    }

    /// Leading coefficient (co2 for component factors, co2e for blended ones)
    pub fn primary_per_unit(&self) -> f64 {
        match self {
            FactorIntensity::Components { co2_per_unit, .. } => *co2_per_unit,
            FactorIntensity::Blended { co2e_per_unit, .. } => *co2e_per_unit,
        }
    }

    pub fn ch4_per_unit(&self) -> f64 {
        match self {
            FactorIntensity::Components { ch4_per_unit, .. }
            | FactorIntensity::Blended { ch4_per_unit, .. } => *ch4_per_unit,
        }
    }

    pub fn n2o_per_unit(&self) -> f64 {
        match self {
            FactorIntensity::Components { n2o_per_unit, .. }
            | FactorIntensity::Blended { n2o_per_unit, .. } => *n2o_per_unit,
        }
    }
}

/// One record of the factor catalog
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmissionFactor {
    pub id: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    /// ISO region code or `GLOBAL`
    pub region: String,
    pub year: i32,
    /// Unit the coefficients are expressed per
    pub unit: String,
    pub intensity: FactorIntensity,
    /// Publisher label, e.g. "DEFRA 2024"
    pub source: String,
    /// Owning organization; absent for public factors
    #[serde(default)]
    pub organization_id: Option<String>,
}

impl EmissionFactor {
    /// A public factor not owned by any organization
    pub fn is_global(&self) -> bool {
        self.organization_id.is_none()
    }

    pub fn is_global_region(&self) -> bool {
        self.region.eq_ignore_ascii_case(GLOBAL_REGION)
    }

    /// Whether `organization_id` may use this factor
    pub fn is_accessible_to(&self, organization_id: &str) -> bool {
        match &self.organization_id {
            None => true,
            Some(owner) => owner == organization_id,
        }
    }
}

// ============================================================================
// Activity Input
// ============================================================================

/// A quantity of activity to be turned into emissions
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActivityInput {
    pub activity_value: f64,
    pub activity_unit: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    pub region: String,
    pub year: i32,
    /// Bypass resolution and use this factor
    #[serde(default)]
    pub factor_id: Option<String>,
}

// ============================================================================
// Result and Provenance Types
// ============================================================================

/// Precedence rule that selected a factor
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// Caller named the factor id
    Explicit,
    /// Organization override at the exact key
    OrganizationExact,
    /// Global factor at the exact key
    GlobalExact,
    /// Global factor for region `GLOBAL`
    RegionFallback,
    /// Global factor without subcategory
    SubcategoryFallback,
    /// Global factor for region `GLOBAL` without subcategory
    CombinedFallback,
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MatchRule::Explicit => "explicit factor id",
            MatchRule::OrganizationExact => "organization override",
            MatchRule::GlobalExact => "exact match",
            MatchRule::RegionFallback => "region fallback",
            MatchRule::SubcategoryFallback => "subcategory fallback",
            MatchRule::CombinedFallback => "region and subcategory fallback",
        };
        f.write_str(label)
    }
}

/// Which factor produced a number, and how it was chosen
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FactorUsed {
    pub id: String,
    pub source: String,
    pub year: i32,
    pub region: String,
    pub organization_id: Option<String>,
    pub category: String,
    pub subcategory: Option<String>,
    pub match_rule: MatchRule,
    /// Factor vintage is older than the requested year
    pub year_fallback: bool,
    pub pre_weighted: bool,
}

/// Outcome of one calculation; all masses in kg
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CalculationResult {
    /// Presented CO2e, rounded to the configured precision
    pub co2e: f64,
    /// CO2e before presentation rounding, for aggregation
    pub co2e_unrounded: f64,
    pub co2_component: f64,
    pub ch4_component: f64,
    pub n2o_component: f64,
    pub factor_used: FactorUsed,
    pub converted_activity_value: f64,
    pub converted_unit: String,
}
