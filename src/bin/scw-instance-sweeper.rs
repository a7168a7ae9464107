//! Scaleway test-run sweeper.
//!
//! Deletes every Instance object tagged with
//! `scw-instance-test-run-<SCW_INSTANCE_TEST_RUN_ID>` and then verifies the
//! set is empty. Credentials come from the same sources as `scw-instance`.

use std::io::{self, Write as _};

use clap::Parser;
use scaleway_instance::config::ProviderConfig;
use scaleway_instance::locality::Zone;
use scaleway_instance::sweeper::{DEFAULT_CONCURRENCY, Sweeper, SweeperConfig, TEST_RUN_ID_ENV};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "scw-instance-sweeper",
    about = "Delete Scaleway Instance test resources for a single test run"
)]
struct Cli {
    /// Scaleway project id used to scope discovery.
    #[arg(long, env = "SCW_DEFAULT_PROJECT_ID")]
    project_id: String,
    /// Test run id used to compute the tag (`scw-instance-test-run-<id>`).
    #[arg(long, env = TEST_RUN_ID_ENV)]
    test_run_id: String,
    /// Zone to sweep; repeat for several. Defaults to every zone of the
    /// configured region.
    #[arg(long = "zone", value_name = "ZONE")]
    zones: Vec<String>,
    /// Maximum number of concurrent deletions.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let provider_config = ProviderConfig::load_without_cli_args().map_err(|err| err.to_string())?;
    let meta = provider_config.meta().map_err(|err| err.to_string())?;
    let zones = if cli.zones.is_empty() {
        meta.default_region.zones()
    } else {
        cli.zones
            .iter()
            .map(|zone| zone.parse::<Zone>().map_err(|err| err.to_string()))
            .collect::<Result<Vec<_>, _>>()?
    };
    let config = SweeperConfig::new(cli.project_id, cli.test_run_id, zones)
        .map_err(|err| err.to_string())?
        .with_concurrency(cli.concurrency);
    let summary = Sweeper::new(meta, config)
        .sweep()
        .await
        .map_err(|err| err.to_string())?;
    writeln!(io::stdout(), "sweep complete: {summary}").map_err(|err| err.to_string())?;
    Ok(())
}
