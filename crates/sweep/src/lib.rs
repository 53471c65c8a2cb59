//! kubegc sweep: find orphaned resources across every served type and delete them
//! in a safe order.
//!
//! Stages run strictly forward: [`discover_types`] → [`scan`] → [`order`] → [`execute`].

#![forbid(unsafe_code)]

use anyhow::Result;
use kubegc_core::{ExecutionResult, Filter};
use kubegc_kubehub::ClusterApi;
use serde::Serialize;
use tracing::info;

pub mod discovery;
pub mod execute;
pub mod order;
pub mod scan;

pub use discovery::discover_types;
pub use execute::execute;
pub use order::order;
pub use scan::{scan, select_orphans, ScanOptions};

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub label_selector: String,
    pub filter: Filter,
    pub dry_run: bool,
    /// Width for discovery and listing; deletes are always sequential.
    pub concurrency: usize,
}

impl RunConfig {
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            label_selector: self.label_selector.clone(),
            filter: self.filter.clone(),
            concurrency: self.concurrency,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub discovered_types: usize,
    pub candidates: usize,
    pub results: Vec<ExecutionResult>,
}

impl RunReport {
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| !r.is_ok()).count()
    }
}

/// One full pass. Only a discovery failure is returned as an error; per-type and
/// per-resource failures end up in the logs and the report.
pub async fn run<C>(api: &C, cfg: &RunConfig) -> Result<RunReport>
where
    C: ClusterApi + ?Sized,
{
    let types = discover_types(api, cfg.concurrency).await?;
    let candidates = scan(api, &types, &cfg.scan_options()).await;
    let count = candidates.len();
    let plan = order(candidates);
    let results = execute(api, plan, cfg.dry_run).await;
    let report = RunReport { dry_run: cfg.dry_run, discovered_types: types.len(), candidates: count, results };
    info!(
        dry_run = report.dry_run,
        types = report.discovered_types,
        candidates = report.candidates,
        failures = report.failures(),
        "cleanup finished"
    );
    Ok(report)
}
