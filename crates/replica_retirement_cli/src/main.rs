use std::path::{Path, PathBuf};

use clap::Parser;
use replica_retirement::{
    settings::get_settings_path, ArcpyAdministrator, JobSettings, RetirementJob,
    RetirementReport, SettingsOverrides, SqlServerCatalog,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod errors;
use errors::Error;

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;

/// Environment variable holding the log filter, e.g. `debug` or
/// `replica_retirement=trace`.
const LOG_ENV_VAR: &str = "GDB_REPLICA_LOG";

/// Unregister a batch of geodatabase replicas and print their identifiers
#[derive(Parser, Debug)]
#[command(name = "unregister-gdb-replicas", version)]
#[command(about = "Unregister a batch of geodatabase replicas", long_about = None)]
struct Cli {
    /// Settings file. Defaults to UnregisterGdbReplicas.toml in the working directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Environment section to use instead of [WhichGeodatabase] qaOrProd
    #[arg(long)]
    environment: Option<String>,

    /// Number of replicas to retire instead of [Default] replicaCount
    #[arg(long)]
    replica_count: Option<u32>,

    /// Stage and list replicas without unregistering them
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            environment: self.environment.clone(),
            replica_count: self.replica_count,
        }
    }
}

fn load_settings(cli: &Cli, base_dir: &Path) -> Result<JobSettings, Error> {
    let path = get_settings_path(cli.config.as_deref(), base_dir);
    info!(path = %path.display(), "Loading settings");
    Ok(JobSettings::load(&path, base_dir, &cli.overrides())?)
}

async fn run(cli: &Cli) -> Result<RetirementReport, Error> {
    let base_dir = std::env::current_dir().map_err(Error::WorkingDirectory)?;
    let settings = load_settings(cli, &base_dir)?;

    let mut catalog = SqlServerCatalog::connect(&settings.connection).await?;
    let administrator = ArcpyAdministrator::new(&settings.arcpy_python);

    let report = RetirementJob::new(&settings)
        .dry_run(cli.dry_run)
        .run(&mut catalog, &administrator)
        .await?;
    Ok(report)
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so stdout only carries the report.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(report) => println!("{}", report),
        Err(e) => {
            error!("Error: {e}");
            std::process::exit(1);
        }
    }
}
