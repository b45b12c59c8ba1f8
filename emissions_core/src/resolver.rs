//! Emission factor resolution.
//!
//! Picks the single best factor for a query by walking a fixed precedence
//! chain, first match wins:
//!
//! 1. **Explicit id** - returned if global or owned by the caller
//! 2. **Organization override** at the exact (category, subcategory, region)
//! 3. **Global** factor at the exact key
//! 4. **Region fallback** - region `GLOBAL`
//! 5. **Subcategory fallback** - no subcategory (only when one was requested)
//! 6. **Combined fallback** - region `GLOBAL` and no subcategory
//!
//! Each of rules 2-6 prefers the requested year and otherwise takes the
//! nearest earlier year. Future vintages are never used.

use crate::catalog::FactorLookup;
use crate::types::{ActivityInput, EmissionFactor, MatchRule};
use crate::{Error, Result};

/// What to resolve a factor for
#[derive(Clone, Copy, Debug)]
pub struct FactorQuery<'a> {
    pub category: &'a str,
    pub subcategory: Option<&'a str>,
    pub region: &'a str,
    pub year: i32,
    pub organization_id: &'a str,
    pub factor_id: Option<&'a str>,
}

impl<'a> FactorQuery<'a> {
    /// Query for the factor an activity input should use
    pub fn for_input(input: &'a ActivityInput, organization_id: &'a str) -> Self {
        Self {
            category: &input.category,
            subcategory: input.subcategory.as_deref(),
            region: &input.region,
            year: input.year,
            organization_id,
            factor_id: input.factor_id.as_deref(),
        }
    }
}

/// The factor chosen for a query and the rule that chose it
#[derive(Clone, Copy, Debug)]
pub struct Resolution<'c> {
    pub factor: &'c EmissionFactor,
    pub rule: MatchRule,
    /// Factor vintage is older than the requested year
    pub year_fallback: bool,
}

/// Rules 2-6 in precedence order
const FALLBACK_CHAIN: [MatchRule; 5] = [
    MatchRule::OrganizationExact,
    MatchRule::GlobalExact,
    MatchRule::RegionFallback,
    MatchRule::SubcategoryFallback,
    MatchRule::CombinedFallback,
];

/// Resolve the emission factor for `query`
///
/// Fails with `FactorNotFound` when an explicit id is unknown or not
/// accessible, or when no rule matches at the requested or any earlier year.
/// Fails with `AmbiguousFactor` when two factors tie at the winning rule and
/// year, which a validated catalog never contains.
pub fn resolve<'c, C>(catalog: &'c C, query: &FactorQuery<'_>) -> Result<Resolution<'c>>
where
    C: FactorLookup + ?Sized,
{
    if let Some(id) = query.factor_id {
        return resolve_explicit(catalog, query, id);
    }

    let candidates = catalog.factors_in_category(query.category);
    tracing::debug!(
        "Resolving factor for {}/{:?} in {} ({}), {} candidates",
        query.category,
        query.subcategory,
        query.region,
        query.year,
        candidates.len()
    );

    for rule in FALLBACK_CHAIN {
        if !rule_applies(rule, query) {
            continue;
        }

        let matching: Vec<&EmissionFactor> = candidates
            .iter()
            .copied()
            .filter(|f| f.year <= query.year && rule_matches(rule, f, query))
            .collect();

        let Some(best_year) = matching.iter().map(|f| f.year).max() else {
            continue;
        };

        let mut at_year: Vec<&EmissionFactor> =
            matching.into_iter().filter(|f| f.year == best_year).collect();

        if at_year.len() > 1 {
            let mut candidates: Vec<String> = at_year.iter().map(|f| f.id.clone()).collect();
            candidates.sort();
            return Err(Error::AmbiguousFactor {
                category: query.category.to_string(),
                region: query.region.to_string(),
                year: query.year,
                candidates,
            });
        }

        let factor = at_year.remove(0);
        let year_fallback = best_year < query.year;
        if year_fallback {
            tracing::info!(
                "No {} factor for {} in {}; using {} vintage '{}'",
                query.year,
                query.category,
                query.region,
                best_year,
                factor.id
            );
        }
        tracing::debug!("Resolved factor '{}' via {}", factor.id, rule);

        return Ok(Resolution {
            factor,
            rule,
            year_fallback,
        });
    }

    Err(Error::factor_not_found(
        query.category,
        query.region,
        query.year,
        "no factor matches at any fallback level",
    ))
}

fn resolve_explicit<'c, C>(catalog: &'c C, query: &FactorQuery<'_>, id: &str) -> Result<Resolution<'c>>
where
    C: FactorLookup + ?Sized,
{
    let not_found = |reason: String| {
        Error::factor_not_found(query.category, query.region, query.year, reason)
    };

    let factor = catalog
        .factor(id)
        .ok_or_else(|| not_found(format!("factor '{}' does not exist", id)))?;

    if !factor.is_accessible_to(query.organization_id) {
        return Err(not_found(format!(
            "factor '{}' is not accessible to organization '{}'",
            id, query.organization_id
        )));
    }

    if !factor.category.eq_ignore_ascii_case(query.category) {
        tracing::warn!(
            "Explicit factor '{}' has category '{}' but activity is '{}'",
            id,
            factor.category,
            query.category
        );
    }

    Ok(Resolution {
        factor,
        rule: MatchRule::Explicit,
        year_fallback: factor.year < query.year,
    })
}

/// Whether a rule is worth trying for this query
fn rule_applies(rule: MatchRule, query: &FactorQuery<'_>) -> bool {
    match rule {
        MatchRule::SubcategoryFallback | MatchRule::CombinedFallback => query.subcategory.is_some(),
        _ => true,
    }
}

/// Whether `factor` satisfies `rule` for `query`, ignoring year
fn rule_matches(rule: MatchRule, factor: &EmissionFactor, query: &FactorQuery<'_>) -> bool {
    let same_region = factor.region.eq_ignore_ascii_case(query.region);
    let same_subcategory = match (query.subcategory, factor.subcategory.as_deref()) {
        (Some(wanted), Some(have)) => wanted.eq_ignore_ascii_case(have),
        (None, None) => true,
        _ => false,
    };
    let no_subcategory = factor.subcategory.is_none();

    match rule {
        MatchRule::Explicit => false,
        MatchRule::OrganizationExact => {
            factor.organization_id.as_deref() == Some(query.organization_id)
                && same_region
                && same_subcategory
        }
        MatchRule::GlobalExact => factor.is_global() && same_region && same_subcategory,
        MatchRule::RegionFallback => {
            factor.is_global() && factor.is_global_region() && same_subcategory
        }
        MatchRule::SubcategoryFallback => factor.is_global() && same_region && no_subcategory,
        MatchRule::CombinedFallback => {
            factor.is_global() && factor.is_global_region() && no_subcategory
        }
    }
}
