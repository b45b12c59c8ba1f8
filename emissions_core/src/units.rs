//! Unit conversion between compatible physical quantities.
//!
//! Every unit belongs to one dimension, and every dimension has a canonical
//! unit (kilogram, liter, kilowatt-hour, kilometer, unit count). Conversion
//! goes through the canonical unit:
//!
//! ```text
//! convert(v, a, b) = v * factor(a -> canonical) / factor(b -> canonical)
//! ```
//!
//! Unit strings are matched case-insensitively against a fixed alias table.
//! Ambiguous spellings such as `ton` are deliberately absent and fail with
//! [`UnitError::UnknownUnit`].

use crate::error::UnitError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// International BTU in kilowatt-hours
const BTU_KWH: f64 = 1055.05585262 / 3_600_000.0;

/// Lookup from lowercase alias to unit, built once
static UNIT_ALIASES: Lazy<HashMap<&'static str, Unit>> = Lazy::new(|| {
    let mut aliases = HashMap::new();
    for unit in Unit::ALL {
        for alias in unit.aliases() {
            aliases.insert(*alias, unit);
        }
    }
    aliases
});

// ============================================================================
// Dimensions
// ============================================================================

/// Physical dimension a unit measures
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Mass,
    Volume,
    Energy,
    Distance,
    Count,
}

impl Dimension {
    /// The unit every other unit of this dimension converts through
    pub fn canonical_unit(self) -> Unit {
        match self {
            Dimension::Mass => Unit::Kilogram,
            Dimension::Volume => Unit::Liter,
            Dimension::Energy => Unit::KilowattHour,
            Dimension::Distance => Unit::Kilometer,
            Dimension::Count => Unit::Each,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Mass => "mass",
            Dimension::Volume => "volume",
            Dimension::Energy => "energy",
            Dimension::Distance => "distance",
            Dimension::Count => "count",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Units
// ============================================================================

/// A recognised unit of measure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Unit {
    // Mass
    Gram,
    Kilogram,
    Tonne,
    Pound,
    Ounce,
    ShortTon,
    LongTon,
    // Volume
    Milliliter,
    Liter,
    CubicMeter,
    UsGallon,
    ImperialGallon,
    Barrel,
    CubicFoot,
    // Energy
    WattHour,
    KilowattHour,
    MegawattHour,
    GigawattHour,
    Joule,
    Kilojoule,
    Megajoule,
    Gigajoule,
    Therm,
    Btu,
    MmBtu,
    // Distance
    Meter,
    Kilometer,
    Mile,
    NauticalMile,
    // Count
    Each,
}

impl Unit {
    /// Every unit in the alias table
    pub const ALL: [Unit; 30] = [
        Unit::Gram,
        Unit::Kilogram,
        Unit::Tonne,
        Unit::Pound,
        Unit::Ounce,
        Unit::ShortTon,
        Unit::LongTon,
        Unit::Milliliter,
        Unit::Liter,
        Unit::CubicMeter,
        Unit::UsGallon,
        Unit::ImperialGallon,
        Unit::Barrel,
        Unit::CubicFoot,
        Unit::WattHour,
        Unit::KilowattHour,
        Unit::MegawattHour,
        Unit::GigawattHour,
        Unit::Joule,
        Unit::Kilojoule,
        Unit::Megajoule,
        Unit::Gigajoule,
        Unit::Therm,
        Unit::Btu,
        Unit::MmBtu,
        Unit::Meter,
        Unit::Kilometer,
        Unit::Mile,
        Unit::NauticalMile,
        Unit::Each,
    ];

    /// Parse a unit string (case-insensitive, surrounding whitespace ignored)
    pub fn parse(s: &str) -> Result<Unit, UnitError> {
        let key = s.trim().to_lowercase();
        UNIT_ALIASES
            .get(key.as_str())
            .copied()
            .ok_or_else(|| UnitError::UnknownUnit { unit: s.to_string() })
    }

    pub fn dimension(self) -> Dimension {
        use Unit::*;
        match self {
            Gram | Kilogram | Tonne | Pound | Ounce | ShortTon | LongTon => Dimension::Mass,
            Milliliter | Liter | CubicMeter | UsGallon | ImperialGallon | Barrel | CubicFoot => {
                Dimension::Volume
            }
            WattHour | KilowattHour | MegawattHour | GigawattHour | Joule | Kilojoule
            | Megajoule | Gigajoule | Therm | Btu | MmBtu => Dimension::Energy,
            Meter | Kilometer | Mile | NauticalMile => Dimension::Distance,
            Each => Dimension::Count,
        }
    }

    /// Multiplier taking one of this unit to the dimension's canonical unit
    pub fn to_canonical(self) -> f64 {
        use Unit::*;
        match self {
            Gram => 0.001,
            Kilogram => 1.0,
            Tonne => 1000.0,
            Pound => 0.453_592_37,
            Ounce => 0.028_349_523_125,
            ShortTon => 907.184_74,
            LongTon => 1016.046_908_8,

            Milliliter => 0.001,
            Liter => 1.0,
            CubicMeter => 1000.0,
            UsGallon => 3.785_411_784,
            ImperialGallon => 4.546_09,
            Barrel => 158.987_294_928,
            CubicFoot => 28.316_846_592,

            WattHour => 0.001,
            KilowattHour => 1.0,
            MegawattHour => 1000.0,
            GigawattHour => 1_000_000.0,
            Joule => 1.0 / 3_600_000.0,
            Kilojoule => 1.0 / 3600.0,
            Megajoule => 1.0 / 3.6,
            Gigajoule => 1000.0 / 3.6,
            Therm => BTU_KWH * 100_000.0,
            Btu => BTU_KWH,
            MmBtu => BTU_KWH * 1_000_000.0,

            Meter => 0.001,
            Kilometer => 1.0,
            Mile => 1.609_344,
            NauticalMile => 1.852,

            Each => 1.0,
        }
    }

    /// Conventional display symbol
    pub fn symbol(self) -> &'static str {
        use Unit::*;
        match self {
            Gram => "g",
            Kilogram => "kg",
            Tonne => "t",
            Pound => "lb",
            Ounce => "oz",
            ShortTon => "short ton",
            LongTon => "long ton",
            Milliliter => "mL",
            Liter => "L",
            CubicMeter => "m3",
            UsGallon => "US gal",
            ImperialGallon => "imp gal",
            Barrel => "bbl",
            CubicFoot => "ft3",
            WattHour => "Wh",
            KilowattHour => "kWh",
            MegawattHour => "MWh",
            GigawattHour => "GWh",
            Joule => "J",
            Kilojoule => "kJ",
            Megajoule => "MJ",
            Gigajoule => "GJ",
            Therm => "therm",
            Btu => "Btu",
            MmBtu => "MMBtu",
            Meter => "m",
            Kilometer => "km",
            Mile => "mi",
            NauticalMile => "nmi",
            Each => "unit",
        }
    }

    /// Accepted lowercase spellings
    fn aliases(self) -> &'static [&'static str] {
        use Unit::*;
        match self {
            Gram => &["g", "gram", "grams", "gramme", "grammes"],
            Kilogram => &["kg", "kgs", "kilogram", "kilograms", "kilogramme", "kilogrammes"],
            Tonne => &[
                "t",
                "tonne",
                "tonnes",
                "metric_ton",
                "metric_tons",
                "metric ton",
                "metric tons",
            ],
            Pound => &["lb", "lbs", "pound", "pounds"],
            Ounce => &["oz", "ounce", "ounces"],
            ShortTon => &["short_ton", "short_tons", "short ton", "short tons", "us_ton", "us ton"],
            LongTon => &["long_ton", "long_tons", "long ton", "long tons", "imperial_ton"],

            Milliliter => &["ml", "milliliter", "milliliters", "millilitre", "millilitres"],
            Liter => &["liter", "l", "liters", "litre", "litres", "ltr"],
            CubicMeter => &["m3", "m³", "cubic_meter", "cubic_meters", "cubic meter", "cubic meters", "cubic_metre", "cubic_metres"],
            UsGallon => &["us_gal", "us gal", "us_gallon", "us_gallons", "us gallon", "us gallons"],
            ImperialGallon => &["imp_gal", "imp gal", "imperial_gallon", "imperial_gallons", "imperial gallon", "uk_gallon"],
            Barrel => &["bbl", "barrel", "barrels"],
            CubicFoot => &["ft3", "ft³", "cf", "cubic_foot", "cubic_feet", "cubic foot", "cubic feet"],

            WattHour => &["wh", "watt_hour", "watt_hours", "watt hour", "watt hours"],
            KilowattHour => &["kwh", "kilowatt_hour", "kilowatt_hours", "kilowatt hour", "kilowatt hours", "kilowatt-hour", "kilowatt-hours"],
            MegawattHour => &["mwh", "megawatt_hour", "megawatt_hours", "megawatt hour", "megawatt hours"],
            GigawattHour => &["gwh", "gigawatt_hour", "gigawatt_hours", "gigawatt hour", "gigawatt hours"],
            Joule => &["j", "joule", "joules"],
            Kilojoule => &["kj", "kilojoule", "kilojoules"],
            Megajoule => &["mj", "megajoule", "megajoules"],
            Gigajoule => &["gj", "gigajoule", "gigajoules"],
            Therm => &["therm", "therms", "thm"],
            Btu => &["btu", "btus"],
            MmBtu => &["mmbtu", "mmbtus", "million_btu"],

            Meter => &["m", "meter", "meters", "metre", "metres"],
            Kilometer => &["km", "kilometer", "kilometers", "kilometre", "kilometres"],
            Mile => &["mi", "mile", "miles"],
            NauticalMile => &["nmi", "nautical_mile", "nautical_miles", "nautical mile", "nautical miles"],

            Each => &["unit", "units", "item", "items", "piece", "pieces", "pcs", "each", "ea"],
        }
    }
}

impl FromStr for Unit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Unit::parse(s)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ============================================================================
// Conversion
// ============================================================================

/// Convert `value` between two unit strings
///
/// Fails with `UnknownUnit` for unrecognised strings, `UnitMismatch` when the
/// units measure different dimensions, `InvalidValue` unless `value` is a
/// positive finite number, and `OutOfRange` when the result overflows.
pub fn convert(value: f64, from: &str, to: &str) -> Result<f64, UnitError> {
    let from_unit = Unit::parse(from)?;
    let to_unit = Unit::parse(to)?;

    if from_unit.dimension() != to_unit.dimension() {
        return Err(UnitError::UnitMismatch {
            from: from.to_string(),
            to: to.to_string(),
            from_dimension: from_unit.dimension(),
            to_dimension: to_unit.dimension(),
        });
    }

    convert_between(value, from_unit, to_unit)
}

/// Convert `value` between two parsed units of the same dimension
pub fn convert_between(value: f64, from: Unit, to: Unit) -> Result<f64, UnitError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(UnitError::InvalidValue { value });
    }

    if from.dimension() != to.dimension() {
        return Err(UnitError::UnitMismatch {
            from: from.symbol().to_string(),
            to: to.symbol().to_string(),
            from_dimension: from.dimension(),
            to_dimension: to.dimension(),
        });
    }

    if from == to {
        return Ok(value);
    }

    let converted = value * from.to_canonical() / to.to_canonical();
    if !converted.is_finite() {
        return Err(UnitError::OutOfRange {
            value,
            from: from.symbol().to_string(),
            to: to.symbol().to_string(),
        });
    }
    Ok(converted)
}
