//! causalfit CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod data;
mod ipw;

use cf_inference::SimulationConfig;

#[derive(Parser)]
#[command(name = "causalfit")]
#[command(about = "causalfit - propensity-weighted treatment effects with bootstrap inference")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a confounded synthetic dataset (CSV)
    Simulate {
        /// Number of rows
        #[arg(long, default_value = "1752")]
        n_rows: usize,

        /// True average treatment effect
        #[arg(long, default_value = "-10", allow_hyphen_values = true)]
        true_ate: f64,

        /// Outcome noise standard deviation
        #[arg(long, default_value = "5")]
        noise_sd: f64,

        /// Strength of covariate-driven treatment assignment (0 = randomized)
        #[arg(long, default_value = "1")]
        confounding: f64,

        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output CSV file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Full IPW workflow: propensity, weights, diagnostics, effect, bootstrap, sensitivity
    Run {
        /// Input CSV with a header row
        #[arg(short, long)]
        input: PathBuf,

        /// Treatment column (0/1/true/false)
        #[arg(long, default_value = "treatment")]
        treatment: String,

        /// Outcome column
        #[arg(long, default_value = "outcome")]
        outcome: String,

        /// Covariate columns (comma-separated). Defaults to every other column.
        #[arg(long, value_delimiter = ',')]
        covariates: Vec<String>,

        /// Pipeline config (JSON). Flags below override it.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bootstrap resamples
        #[arg(long)]
        n_bootstrap: Option<usize>,

        /// Bootstrap seed
        #[arg(long)]
        seed: Option<u64>,

        /// Confidence level
        #[arg(long)]
        conf_level: Option<f64>,

        /// Bootstrap interval: studentized, student-t or percentile
        #[arg(long)]
        ci_method: Option<String>,

        /// Include the apparent-sample estimate in the bootstrap distribution
        #[arg(long)]
        include_apparent: bool,

        /// Also run the fixed-weights bootstrap for comparison
        #[arg(long)]
        compare_fixed_weights: bool,

        /// Fit resamples on a single thread
        #[arg(long)]
        sequential: bool,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Propensity model, weights, balance table and overlap only
    Balance {
        /// Input CSV with a header row
        #[arg(short, long)]
        input: PathBuf,

        /// Treatment column (0/1/true/false)
        #[arg(long, default_value = "treatment")]
        treatment: String,

        /// Outcome column
        #[arg(long, default_value = "outcome")]
        outcome: String,

        /// Covariate columns (comma-separated). Defaults to every other column.
        #[arg(long, value_delimiter = ',')]
        covariates: Vec<String>,

        /// Pipeline config (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Tipping points and confounder adjustments for an effect or bound
    Sensitivity {
        /// Effect (or interval bound) to analyse
        #[arg(long, allow_hyphen_values = true)]
        effect: f64,

        /// Interval lower bound (with --upper: adjust the whole interval)
        #[arg(long, allow_hyphen_values = true)]
        lower: Option<f64>,

        /// Interval upper bound
        #[arg(long, allow_hyphen_values = true)]
        upper: Option<f64>,

        /// Exposure-confounder strengths to sweep (comma-separated)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        strengths: Vec<f64>,

        /// Binary confounder prevalence among the treated
        #[arg(long)]
        prevalence_treated: Option<f64>,

        /// Binary confounder prevalence among the controls
        #[arg(long)]
        prevalence_control: Option<f64>,

        /// Confounder-outcome effect of the binary confounder
        #[arg(long, allow_hyphen_values = true)]
        confounder_outcome_effect: Option<f64>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Simulate { n_rows, true_ate, noise_sd, confounding, seed, output } => {
            let config = SimulationConfig { n_rows, true_ate, noise_sd, confounding, seed };
            ipw::cmd_simulate(&config, output.as_ref())
        }
        Commands::Run {
            input,
            treatment,
            outcome,
            covariates,
            config,
            n_bootstrap,
            seed,
            conf_level,
            ci_method,
            include_apparent,
            compare_fixed_weights,
            sequential,
            output,
        } => {
            let spec = ipw::InputSpec {
                input: &input,
                treatment: &treatment,
                outcome: &outcome,
                covariates: &covariates,
            };
            let overrides = ipw::RunOverrides {
                n_bootstrap,
                seed,
                conf_level,
                ci_method,
                include_apparent,
                compare_fixed_weights,
                sequential,
            };
            ipw::cmd_run(&spec, config.as_ref(), &overrides, output.as_ref())
        }
        Commands::Balance { input, treatment, outcome, covariates, config, output } => {
            let spec = ipw::InputSpec {
                input: &input,
                treatment: &treatment,
                outcome: &outcome,
                covariates: &covariates,
            };
            ipw::cmd_balance(&spec, config.as_ref(), output.as_ref())
        }
        Commands::Sensitivity {
            effect,
            lower,
            upper,
            strengths,
            prevalence_treated,
            prevalence_control,
            confounder_outcome_effect,
            output,
        } => {
            let args = ipw::SensitivityArgs {
                effect,
                lower,
                upper,
                strengths,
                prevalence_treated,
                prevalence_control,
                confounder_outcome_effect,
            };
            ipw::cmd_sensitivity(&args, output.as_ref())
        }
        Commands::Version => {
            println!("causalfit {}", cf_core::VERSION);
            Ok(())
        }
    }
}

fn write_json(output: Option<&PathBuf>, value: &serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}
