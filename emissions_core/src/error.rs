//! Error types for the emissions_core library.

use crate::units::Dimension;
use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Failure raised by the unit converter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UnitError {
    /// Unit string is not in the alias table
    #[error("Unknown unit: '{unit}'")]
    UnknownUnit { unit: String },

    /// Units belong to different physical dimensions
    #[error("Cannot convert '{from}' ({from_dimension}) to '{to}' ({to_dimension})")]
    UnitMismatch {
        from: String,
        to: String,
        from_dimension: Dimension,
        to_dimension: Dimension,
    },

    /// Quantity is zero, negative, or not finite
    #[error("Quantity must be a positive finite number, got {value}")]
    InvalidValue { value: f64 },

    /// Converted quantity does not fit in an f64
    #[error("Converting {value} '{from}' to '{to}' exceeds the representable range")]
    OutOfRange { value: f64, from: String, to: String },
}

impl UnitError {
    /// Short code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            UnitError::UnknownUnit { .. } => "UNKNOWN_UNIT",
            UnitError::UnitMismatch { .. } => "UNIT_MISMATCH",
            UnitError::InvalidValue { .. } => "INVALID_VALUE",
            UnitError::OutOfRange { .. } => "OUT_OF_RANGE",
        }
    }
}

/// Core error type for emissions_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Activity input rejected before or during calculation
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput {
        field: String,
        reason: String,
        #[source]
        cause: Option<UnitError>,
    },

    /// Precedence chain exhausted, or explicit factor not usable
    #[error("No emission factor for '{category}' in {region} ({year}): {reason}")]
    FactorNotFound {
        category: String,
        region: String,
        year: i32,
        reason: String,
    },

    /// More than one factor matched at the same specificity level
    #[error("Ambiguous emission factor for '{category}' in {region} ({year}): {candidates:?}")]
    AmbiguousFactor {
        category: String,
        region: String,
        year: i32,
        candidates: Vec<String>,
    },

    /// Resolved factor carries coefficients that cannot produce a valid result
    #[error("Emission factor '{id}' is unusable: {reason}")]
    InvalidFactor { id: String, reason: String },

    /// Converter failure outside of a calculation
    #[error(transparent)]
    Unit(#[from] UnitError),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog load or validation error
    #[error("Catalog validation error: {0}")]
    CatalogValidation(String),

    /// Audit trail unreadable
    #[error("Audit trail error: {0}")]
    Audit(String),
}

impl Error {
    /// Create an InvalidInput error with no underlying cause
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            field: field.into(),
            reason: reason.into(),
            cause: None,
        }
    }

    /// Create a FactorNotFound error
    pub fn factor_not_found(
        category: impl Into<String>,
        region: impl Into<String>,
        year: i32,
        reason: impl Into<String>,
    ) -> Self {
        Error::FactorNotFound {
            category: category.into(),
            region: region.into(),
            year,
            reason: reason.into(),
        }
    }

    /// The converter failure behind this error, if any
    pub fn unit_error(&self) -> Option<&UnitError> {
        match self {
            Error::InvalidInput { cause, .. } => cause.as_ref(),
            Error::Unit(e) => Some(e),
            _ => None,
        }
    }

    /// Get a short error code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput { .. } => "INVALID_INPUT",
            Error::FactorNotFound { .. } => "FACTOR_NOT_FOUND",
            Error::AmbiguousFactor { .. } => "AMBIGUOUS_FACTOR",
            Error::InvalidFactor { .. } => "INVALID_FACTOR",
            Error::Unit(e) => e.code(),
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Csv(_) => "CSV_ERROR",
            Error::Toml(_) => "TOML_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::CatalogValidation(_) => "CATALOG_INVALID",
            Error::Audit(_) => "AUDIT_ERROR",
        }
    }
}
