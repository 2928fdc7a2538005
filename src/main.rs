use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use chart_updates::chart::cache::UpdateCache;
use chart_updates::chart::credentials::FileCredentialStore;
use chart_updates::chart::discovery::{UpdateChecker, UpdateRequest};
use chart_updates::chart::registries::{OciChartGetter, OciRegistry};
use chart_updates::chart::registry::RegistryContext;
use chart_updates::chart::retriever::ChartPuller;
use chart_updates::chart::semver::parse_tolerant;
use chart_updates::config::{self, UpdatesConfig};
use chart_updates::logging;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chart-updates")]
#[command(version, about = "Discover and pull chart updates from OCI registries")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write JSON logs to the data directory instead of stderr
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List versions newer than the installed one, newest first
    Check {
        /// Chart references, e.g. oci://registry.example.com/app/chart
        #[arg(required = true)]
        charts: Vec<String>,

        /// License ID used as registry username and password
        #[arg(long, env = "CHART_UPDATES_LICENSE_ID")]
        license_id: String,

        /// Installed version; omit to list every version
        #[arg(long)]
        current: Option<String>,
    },
    /// Download the archive of one chart version
    Pull {
        chart: String,

        /// License ID used as registry username and password
        #[arg(long, env = "CHART_UPDATES_LICENSE_ID")]
        license_id: String,

        #[arg(long)]
        version: String,

        /// Destination file for the chart archive
        #[arg(long, short)]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => UpdatesConfig::load(path)
            .with_context(|| format!("failed to load config from {path:?}"))?,
        None => UpdatesConfig::default(),
    };

    let _log_guard = if cli.log_file {
        Some(logging::init_file(&config::log_path())?)
    } else {
        logging::init_stderr();
        None
    };

    let registry = Arc::new(OciRegistry::new(&config.registry)?);

    match cli.command {
        Command::Check {
            charts,
            license_id,
            current,
        } => {
            let current_version = current
                .as_deref()
                .map(|v| parse_tolerant(v).with_context(|| format!("invalid version {v:?}")))
                .transpose()?;

            let checker = UpdateChecker::new(
                registry,
                Arc::new(UpdateCache::new()),
                &config.registry,
            );
            let requests = charts
                .into_iter()
                .map(|identity| UpdateRequest {
                    identity,
                    license_id: license_id.clone(),
                    current_version: current_version.clone(),
                })
                .collect();

            let results = checker.check_all(requests).await;
            let show_headers = results.len() > 1;
            let mut failures = 0;

            for (identity, result) in results {
                match result {
                    Ok(updates) => {
                        if show_headers {
                            println!("{identity}:");
                        }
                        for tag in updates.to_tag_list() {
                            println!("{}{tag}", if show_headers { "  " } else { "" });
                        }
                    }
                    Err(e) => {
                        eprintln!("{identity}: {e}");
                        failures += 1;
                    }
                }
            }

            if failures > 0 {
                bail!("{failures} chart(s) could not be checked");
            }
        }
        Command::Pull {
            chart,
            license_id,
            version,
            output,
        } => {
            let credentials = Arc::new(FileCredentialStore::new(config.credentials.dir()));
            let getter = OciChartGetter::new(
                registry,
                credentials.clone(),
                RegistryContext::from_config(&config.registry),
            );
            let puller = ChartPuller::new(credentials, Arc::new(getter));

            let content = puller
                .pull_chart_version(&chart, &license_id, &version)
                .await?;
            tokio::fs::write(&output, &content)
                .await
                .with_context(|| format!("failed to write chart to {output:?}"))?;
            println!("{} bytes written to {}", content.len(), output.display());
        }
    }

    Ok(())
}
