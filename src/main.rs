//! # Finecast CLI
//!
//! The `finecast` binary serves the prediction API and offers one-shot
//! commands for operators.
//!
//! ## Usage
//!
//! ```bash
//! finecast --config ./config/finecast.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `finecast serve` | Start the HTTP API |
//! | `finecast predict` | Run one prediction from the command line |
//! | `finecast labels` | Print the accepted classification labels |
//!
//! ## Examples
//!
//! ```bash
//! # Start the API
//! finecast serve --config ./config/finecast.toml
//!
//! # One-shot prediction
//! finecast predict \
//!   --description "Former employees retained access to patient records" \
//!   --lawfulness no_valid_basis \
//!   --rights non_compliance \
//!   --risk insufficient_protection \
//!   --governance not_accountable
//! ```

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use finecast::config::load_config;
use finecast::models::{
    Accountability, CaseInput, Lawfulness, RightsCompliance, RiskManagement,
};
use finecast::oracle::HttpOracle;
use finecast::pipeline::Predictor;
use finecast::server::run_server;
use finecast::store::HttpPrecedentStore;

/// Finecast — precedent-based breach impact prediction for GDPR
/// enforcement cases.
#[derive(Parser)]
#[command(
    name = "finecast",
    about = "Precedent-based breach impact prediction for GDPR enforcement cases",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/finecast.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API.
    Serve,

    /// Run one prediction against the configured store and oracle.
    Predict {
        /// Free-text description of the breach case.
        #[arg(long)]
        description: String,

        /// Lawfulness of processing label.
        #[arg(long)]
        lawfulness: String,

        /// Data subject rights compliance label.
        #[arg(long)]
        rights: String,

        /// Risk management and safeguards label.
        #[arg(long)]
        risk: String,

        /// Accountability and governance label.
        #[arg(long)]
        governance: String,
    },

    /// Print the accepted values of the four classification fields.
    Labels,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("finecast=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = load_config(&cli.config)?;
            run_server(&config).await
        }
        Commands::Predict {
            description,
            lawfulness,
            rights,
            risk,
            governance,
        } => {
            let config = load_config(&cli.config)?;
            let input = CaseInput::parse(&description, &lawfulness, &rights, &risk, &governance)
                .map_err(|e| anyhow::anyhow!("{e}"))?;

            let store = HttpPrecedentStore::new(&config.store, &config.retrieval)?;
            let oracle = HttpOracle::new(&config.oracle)?;
            let predictor = Predictor::new(Arc::new(store), Arc::new(oracle), &config);

            let result = predictor.predict(input).await?;

            println!("Similar cases:");
            for (i, (case, assessment)) in result.similar_cases.iter().enumerate() {
                println!(
                    "{}. [{:>3}%] {} — EUR {} ({}, {})",
                    i + 1,
                    assessment.similarity,
                    case.company,
                    case.fine,
                    case.authority,
                    case.date
                );
                println!("    {}", assessment.explanation);
                println!("    id: {}", case.id);
            }
            println!();
            println!("Predicted fine: EUR {}", result.prediction.predicted_fine);
            println!("{}", result.prediction.explanation);
            Ok(())
        }
        Commands::Labels => {
            println!("{}:", Lawfulness::FIELD);
            for value in Lawfulness::VALUES {
                println!("  {value}");
            }
            println!("{}:", RightsCompliance::FIELD);
            for value in RightsCompliance::VALUES {
                println!("  {value}");
            }
            println!("{}:", RiskManagement::FIELD);
            for value in RiskManagement::VALUES {
                println!("  {value}");
            }
            println!("{}:", Accountability::FIELD);
            for value in Accountability::VALUES {
                println!("  {value}");
            }
            Ok(())
        }
    }
}
