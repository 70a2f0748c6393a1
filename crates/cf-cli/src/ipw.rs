use anyhow::{Context, Result};
use std::path::PathBuf;

use cf_inference::bootstrap_ci::BootstrapCiMethod;
use cf_inference::sensitivity::{
    BinaryConfounder, adjust_interval, adjust_with_binary_confounder, tip_with_binary_confounder,
    tipping_sweep,
};
use cf_inference::{
    PipelineConfig, SimulationConfig, assess_balance, run_pipeline, simulate_confounded,
};

use crate::data::{read_observations, write_observations};

/// Column selection shared by `run` and `balance`.
pub struct InputSpec<'a> {
    pub input: &'a PathBuf,
    pub treatment: &'a str,
    pub outcome: &'a str,
    pub covariates: &'a [String],
}

/// Command-line overrides applied on top of the JSON config.
#[derive(Default)]
pub struct RunOverrides {
    pub n_bootstrap: Option<usize>,
    pub seed: Option<u64>,
    pub conf_level: Option<f64>,
    pub ci_method: Option<String>,
    pub include_apparent: bool,
    pub compare_fixed_weights: bool,
    pub sequential: bool,
}

fn parse_ci_method(s: &str) -> Result<BootstrapCiMethod> {
    match s.to_ascii_lowercase().as_str() {
        "studentized" | "t-boot" => Ok(BootstrapCiMethod::Studentized),
        "student-t" | "t" => Ok(BootstrapCiMethod::StudentT),
        "percentile" => Ok(BootstrapCiMethod::Percentile),
        _ => anyhow::bail!(
            "unknown CI method '{s}' (expected studentized, student-t or percentile)"
        ),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_json_file(p)
            .with_context(|| format!("failed to load config {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

// ---------------------------------------------------------------------------
// simulate
// ---------------------------------------------------------------------------

pub fn cmd_simulate(config: &SimulationConfig, output: Option<&PathBuf>) -> Result<()> {
    let table = simulate_confounded(config)?;
    tracing::info!(rows = table.n_rows(), treated = table.n_treated(), "simulated dataset");
    match output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            write_observations(&table, file)?;
        }
        None => write_observations(&table, std::io::stdout().lock())?,
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// run / balance
// ---------------------------------------------------------------------------

pub fn cmd_run(
    spec: &InputSpec<'_>,
    config_path: Option<&PathBuf>,
    overrides: &RunOverrides,
    output: Option<&PathBuf>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(n) = overrides.n_bootstrap {
        config.bootstrap.n_resamples = n;
    }
    if let Some(seed) = overrides.seed {
        config.bootstrap.seed = seed;
    }
    if let Some(cl) = overrides.conf_level {
        config.bootstrap.conf_level = cl;
    }
    if let Some(m) = overrides.ci_method.as_deref() {
        config.bootstrap.ci_method = parse_ci_method(m)?;
    }
    config.bootstrap.include_apparent |= overrides.include_apparent;
    config.compare_fixed_weights |= overrides.compare_fixed_weights;
    if overrides.sequential {
        config.bootstrap.parallel = false;
    }

    let table = read_observations(spec.input, spec.treatment, spec.outcome, spec.covariates)
        .with_context(|| format!("failed to load {}", spec.input.display()))?;
    let report = run_pipeline(&table, &config)?;
    tracing::info!("{}", report.bootstrap_summary);
    crate::write_json(output, &serde_json::to_value(&report)?)
}

pub fn cmd_balance(
    spec: &InputSpec<'_>,
    config_path: Option<&PathBuf>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let table = read_observations(spec.input, spec.treatment, spec.outcome, spec.covariates)
        .with_context(|| format!("failed to load {}", spec.input.display()))?;
    let report = assess_balance(&table, &config)?;
    crate::write_json(output, &serde_json::to_value(&report)?)
}

// ---------------------------------------------------------------------------
// sensitivity
// ---------------------------------------------------------------------------

/// Arguments of the `sensitivity` command.
pub struct SensitivityArgs {
    pub effect: f64,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub strengths: Vec<f64>,
    pub prevalence_treated: Option<f64>,
    pub prevalence_control: Option<f64>,
    pub confounder_outcome_effect: Option<f64>,
}

pub fn cmd_sensitivity(args: &SensitivityArgs, output: Option<&PathBuf>) -> Result<()> {
    let mut out = serde_json::json!({ "effect": args.effect });

    if !args.strengths.is_empty() {
        out["tipping_points"] = serde_json::to_value(tipping_sweep(args.effect, &args.strengths)?)?;
    }

    match (args.prevalence_treated, args.prevalence_control) {
        (Some(p1), Some(p0)) => {
            if let Some(gamma) = args.confounder_outcome_effect {
                out["adjusted_effect"] =
                    serde_json::json!(adjust_with_binary_confounder(args.effect, p1, p0, gamma)?);
                if let (Some(lo), Some(hi)) = (args.lower, args.upper) {
                    let c = BinaryConfounder {
                        prevalence_treated: p1,
                        prevalence_control: p0,
                        confounder_outcome_effect: gamma,
                    };
                    out["adjusted_interval"] =
                        serde_json::to_value(adjust_interval(args.effect, lo, hi, &c)?)?;
                }
            } else {
                out["binary_tipping_point"] =
                    serde_json::json!(tip_with_binary_confounder(args.effect, p1, p0)?);
            }
        }
        (None, None) => {
            if args.confounder_outcome_effect.is_some() {
                anyhow::bail!("--confounder-outcome-effect requires both prevalence flags");
            }
        }
        _ => anyhow::bail!("--prevalence-treated and --prevalence-control must be given together"),
    }

    if out.as_object().is_some_and(|o| o.len() == 1) {
        anyhow::bail!("nothing to compute: pass --strengths or the prevalence flags");
    }
    crate::write_json(output, &out)
}
