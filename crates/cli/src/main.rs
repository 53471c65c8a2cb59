use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use kubegc_core::{Filter, GcError};
use kubegc_kubehub::{ClientSettings, KubeHub};
use kubegc_sweep::RunConfig;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kubegc", version, about = "Delete orphaned resources selected by label and annotation")]
struct Cli {
    /// kubeconfig file (default: $KUBECONFIG, then ~/.kube/config, then in-cluster)
    #[arg(long = "kubeconfig")]
    kubeconfig: Option<String>,

    /// kubeconfig context to use
    #[arg(long = "context")]
    context: Option<String>,

    /// label selector of resources to check (required)
    #[arg(long = "label-selector")]
    label_selector: Option<String>,

    /// annotation keys a resource must carry to be deleted (required)
    #[arg(long = "filter")]
    filter: Option<String>,

    /// ask the server to validate deletes without persisting them
    #[arg(long = "dry-run", action = ArgAction::Set, default_value_t = true, num_args = 0..=1, default_missing_value = "true")]
    dry_run: bool,

    /// resource types discovered and listed at once
    #[arg(long = "concurrency", default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    concurrency: u16,

    /// Report format printed on stdout after the run
    #[arg(short = 'o', long = "output", value_enum, default_value_t = Output::Human)]
    output: Output,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

impl Cli {
    fn run_config(&self) -> Result<RunConfig, GcError> {
        let label_selector = required(self.label_selector.as_deref(), "label-selector")?;
        let filter_expr = required(self.filter.as_deref(), "filter")?;
        let filter = Filter::parse(filter_expr)?;
        Ok(RunConfig {
            label_selector: label_selector.to_string(),
            filter,
            dry_run: self.dry_run,
            concurrency: usize::from(self.concurrency),
        })
    }

    fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            kubeconfig: self.kubeconfig.as_deref().filter(|p| !p.is_empty()).map(PathBuf::from),
            context: self.context.clone(),
        }
    }
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, GcError> {
    value.map(str::trim).filter(|v| !v.is_empty()).ok_or(GcError::MissingArgument(name))
}

fn init_tracing() {
    let env = std::env::var("KUBEGC_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Address for the Prometheus scrape endpoint, from `KUBEGC_METRICS_ADDR`.
fn metrics_addr(raw: Option<&str>) -> Option<Result<std::net::SocketAddr, String>> {
    let raw = raw.map(str::trim).filter(|a| !a.is_empty())?;
    Some(raw.parse().map_err(|_| raw.to_string()))
}

fn init_metrics() {
    let raw = std::env::var("KUBEGC_METRICS_ADDR").ok();
    match metrics_addr(raw.as_deref()) {
        None => {}
        Some(Ok(sock)) => {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(()) => info!(addr = %sock, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        }
        Some(Err(addr)) => warn!(addr = %addr, "invalid KUBEGC_METRICS_ADDR; expected host:port"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let cfg = cli.run_config()?;
    info!(selector = %cfg.label_selector, filter = %cfg.filter, dry_run = cfg.dry_run, "kubegc invoked");

    let hub = KubeHub::connect(&cli.client_settings())
        .await
        .map_err(|e| GcError::Client(format!("{:#}", e)))?;
    let report = kubegc_sweep::run(&hub, &cfg).await.context("cleanup aborted")?;

    match cli.output {
        Output::Human => {
            if report.results.is_empty() {
                info!("no orphaned resources found");
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    // Per-resource delete failures are already reported; they do not fail the run.
    Ok(())
}
