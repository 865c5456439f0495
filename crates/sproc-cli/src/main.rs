use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sproc_adapters::codes::{
    CodeTables, CONTRACT_TYPE_CA, CONTRACT_TYPE_ES, PROCEDURE_CA, STATUS_ID, STATUS_TITLE, URGENCY_CA,
};
use sproc_sync::{Administration, IntegrationConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "sproc-cli")]
#[command(about = "Public procurement open-data integration")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Normalize, reconcile and export the open-data sources.
    Integrate(IntegrateArgs),
    /// Validate and summarize the code tables under `rules/`.
    Tables {
        #[arg(long)]
        workspace_root: Option<PathBuf>,
    },
}

#[derive(Debug, Default, Args)]
struct IntegrateArgs {
    #[arg(long)]
    input_dir: Option<PathBuf>,
    #[arg(long)]
    place_dir: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// zaragoza, madrid, gencat or all
    #[arg(long)]
    administration: Option<Administration>,
    #[arg(long)]
    workspace_root: Option<PathBuf>,
}

impl IntegrateArgs {
    fn apply(self, mut config: IntegrationConfig) -> IntegrationConfig {
        if let Some(dir) = self.input_dir {
            config.input_dir = dir;
        }
        if let Some(dir) = self.place_dir {
            config.place_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(administration) = self.administration {
            config.administration = administration;
        }
        if let Some(root) = self.workspace_root {
            config.workspace_root = root;
        }
        config
    }
}

fn env_bool(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_bool("SPROC_LOG_JSON") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli
        .command
        .unwrap_or_else(|| Commands::Integrate(IntegrateArgs::default()))
    {
        Commands::Integrate(args) => {
            let config = args.apply(IntegrationConfig::from_env());
            info!(administration = %config.administration, "starting integration run");
            let summary = sproc_sync::run_integration(config).await?;
            println!(
                "integration complete: run_id={} minors={} outsiders={} matched={} failed_lookups={} manifest={}",
                summary.run_id,
                summary.counts.minors,
                summary.counts.outsiders,
                summary.counts.matched,
                summary.failed_lookups,
                summary.manifest
            );
        }
        Commands::Tables { workspace_root } => {
            let root = workspace_root.unwrap_or_else(|| IntegrationConfig::from_env().workspace_root);
            let path = root.join("rules").join(sproc_sync::CODE_TABLES_FILE);
            let tables = CodeTables::load(&path)
                .with_context(|| format!("loading code tables {}", path.display()))?;
            println!("code tables v{} ({})", tables.version, path.display());
            for name in [CONTRACT_TYPE_CA, CONTRACT_TYPE_ES, PROCEDURE_CA, URGENCY_CA, STATUS_ID, STATUS_TITLE] {
                let entries = tables.table(name).map(|t| t.len()).unwrap_or_default();
                println!("- {name}: {entries} entries");
            }
        }
    }

    Ok(())
}
