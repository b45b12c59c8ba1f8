use clap::{Parser, Subcommand};
use emissions_core::*;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "emissions")]
#[command(about = "Emission factor resolution and CO2e calculation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Factor catalog file (.csv or .json), overrides the config
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Organization the calculation runs for, overrides the config
    #[arg(long, global = true)]
    org: Option<String>,
}

/// Activity key shared by `calculate` and `resolve`
#[derive(clap::Args)]
struct ActivityKey {
    /// Factor category, e.g. diesel or electricity
    #[arg(long)]
    category: String,

    #[arg(long)]
    subcategory: Option<String>,

    /// ISO region code or GLOBAL
    #[arg(long)]
    region: String,

    /// Reporting year
    #[arg(long)]
    year: i32,

    /// Use this factor and skip the precedence chain
    #[arg(long)]
    factor_id: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Calculate CO2e for one activity
    Calculate {
        /// Activity quantity
        #[arg(allow_negative_numbers = true)]
        value: f64,

        /// Unit of the quantity, e.g. liter or kWh
        unit: String,

        #[command(flatten)]
        key: ActivityKey,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Append an audit record to this file, overrides the config
        #[arg(long)]
        audit: Option<PathBuf>,

        /// Skip the audit trail even if one is configured
        #[arg(long, conflicts_with = "audit")]
        no_audit: bool,
    },

    /// Show which factor an activity would use
    Resolve {
        #[command(flatten)]
        key: ActivityKey,

        /// Print the factor as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert a quantity between units of the same dimension
    Convert {
        #[arg(allow_negative_numbers = true)]
        value: f64,
        from: String,
        to: String,
    },

    /// Check a catalog file for problems
    Validate,
}

fn main() {
    // Initialize logging
    emissions_core::logging::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("error[{}]: {}", e.code(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let catalog_path = cli.catalog.clone().or_else(|| config.catalog.path.clone());

    match cli.command {
        Commands::Calculate {
            value,
            unit,
            key,
            json,
            audit,
            no_audit,
        } => {
            let audit_path = if no_audit {
                None
            } else {
                audit.or_else(|| config.audit.path.clone())
            };
            cmd_calculate(
                &config,
                catalog_path.as_deref(),
                cli.org.as_deref(),
                activity_input(value, unit, key),
                json,
                audit_path.as_deref(),
            )
        }
        Commands::Resolve { key, json } => {
            cmd_resolve(&config, catalog_path.as_deref(), cli.org.as_deref(), key, json)
        }
        Commands::Convert { value, from, to } => cmd_convert(value, &from, &to),
        Commands::Validate => cmd_validate(catalog_path.as_deref()),
    }
}

fn activity_input(value: f64, unit: String, key: ActivityKey) -> ActivityInput {
    ActivityInput {
        activity_value: value,
        activity_unit: unit,
        category: key.category,
        subcategory: key.subcategory,
        region: key.region,
        year: key.year,
        factor_id: key.factor_id,
    }
}

fn require_catalog(path: Option<&Path>) -> Result<&Path> {
    path.ok_or_else(|| {
        Error::Config("no factor catalog given; pass --catalog or set [catalog] path".into())
    })
}

fn organization_id(config: &Config, org: Option<&str>) -> Result<String> {
    org.map(str::to_string)
        .or_else(|| config.organization.default_id.clone())
        .ok_or_else(|| {
            Error::Config(
                "no organization given; pass --org or set [organization] default_id".into(),
            )
        })
}

fn cmd_calculate(
    config: &Config,
    catalog_path: Option<&Path>,
    org: Option<&str>,
    input: ActivityInput,
    json: bool,
    audit_path: Option<&Path>,
) -> Result<()> {
    let organization_id = organization_id(config, org)?;
    let handle = CatalogHandle::open(require_catalog(catalog_path)?)?;
    let settings = config.calculation.settings();

    let result = handle.calculate(&input, &organization_id, &settings)?;

    if let Some(path) = audit_path {
        let mut sink = JsonlAuditSink::new(path);
        sink.append(&AuditRecord::new(
            organization_id.as_str(),
            input.clone(),
            result.clone(),
        ))?;
        tracing::info!("Audit record written to {:?}", path);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        display_result(&input, &result);
    }
    Ok(())
}

fn cmd_resolve(
    config: &Config,
    catalog_path: Option<&Path>,
    org: Option<&str>,
    key: ActivityKey,
    json: bool,
) -> Result<()> {
    let organization_id = organization_id(config, org)?;
    let catalog = load_validated(require_catalog(catalog_path)?)?;

    let query = FactorQuery {
        category: &key.category,
        subcategory: key.subcategory.as_deref(),
        region: &key.region,
        year: key.year,
        organization_id: &organization_id,
        factor_id: key.factor_id.as_deref(),
    };
    let resolution = resolve(&catalog, &query)?;

    if json {
        let out = serde_json::json!({
            "factor": resolution.factor,
            "match_rule": resolution.rule,
            "year_fallback": resolution.year_fallback,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        display_factor(resolution.factor);
        println!("  Matched by: {}", resolution.rule);
        if resolution.year_fallback {
            println!("  Note:       no {} factor, using {} vintage", key.year, resolution.factor.year);
        }
    }
    Ok(())
}

fn cmd_convert(value: f64, from: &str, to: &str) -> Result<()> {
    let converted = convert(value, from, to)?;
    println!("{} {} = {} {}", value, from, converted, to);
    Ok(())
}

fn cmd_validate(catalog_path: Option<&Path>) -> Result<()> {
    let path = require_catalog(catalog_path)?;
    let catalog = FactorCatalog::load(path)?;
    let errors = catalog.validate();

    if !errors.is_empty() {
        eprintln!("Catalog validation errors:");
        for error in &errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::CatalogValidation(format!(
            "{} problem(s) in {}",
            errors.len(),
            catalog.origin()
        )));
    }

    println!("Catalog OK: {} factors in {}", catalog.len(), catalog.origin());
    Ok(())
}

fn display_result(input: &ActivityInput, result: &CalculationResult) {
    println!("\n=== {} ===", input.category);
    println!(
        "Activity:   {} {} ({} {})",
        input.activity_value, input.activity_unit, result.converted_activity_value, result.converted_unit
    );
    println!("CO2e:       {} kg", result.co2e);
    if !result.factor_used.pre_weighted {
        println!("  CO2:      {} kg", result.co2_component);
        println!("  CH4:      {} kg", result.ch4_component);
        println!("  N2O:      {} kg", result.n2o_component);
    }

    let factor = &result.factor_used;
    println!("\nFactor:     {} ({})", factor.id, factor.source);
    println!("  Region:   {}  Year: {}", factor.region, factor.year);
    println!("  Matched by: {}", factor.match_rule);
    if factor.year_fallback {
        println!("  Note:     no {} factor, using {} vintage", input.year, factor.year);
    }
    println!();
}

fn display_factor(factor: &EmissionFactor) {
    println!("\n=== {} ===", factor.id);
    match &factor.subcategory {
        Some(sub) => println!("  Category:   {} / {}", factor.category, sub),
        None => println!("  Category:   {}", factor.category),
    }
    println!("  Region:     {}  Year: {}", factor.region, factor.year);
    println!("  Source:     {}", factor.source);
    if factor.intensity.is_pre_weighted() {
        println!(
            "  Intensity:  {} kg CO2e per {}",
            factor.intensity.primary_per_unit(),
            factor.unit
        );
    } else {
        println!(
            "  Intensity:  {} kg CO2 / {} kg CH4 / {} kg N2O per {}",
            factor.intensity.primary_per_unit(),
            factor.intensity.ch4_per_unit(),
            factor.intensity.n2o_per_unit(),
            factor.unit
        );
    }
    if let Some(owner) = &factor.organization_id {
        println!("  Owner:      {}", owner);
    }
}
