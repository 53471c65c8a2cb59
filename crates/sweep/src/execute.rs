//! Cleanup executor.

use kubegc_core::{DeletionPlan, ExecutionResult, Outcome};
use kubegc_kubehub::ClusterApi;
use metrics::counter;
use tracing::{info, warn};

/// Delete every planned candidate in order, one request at a time.
///
/// A failed delete is recorded as that candidate's outcome and the loop moves on.
/// Each result is logged as its report line when it completes.
pub async fn execute<C>(api: &C, plan: DeletionPlan, dry_run: bool) -> Vec<ExecutionResult>
where
    C: ClusterApi + ?Sized,
{
    let dry_label = if dry_run { "true" } else { "false" };
    let mut results = Vec::with_capacity(plan.len());
    for candidate in plan {
        let outcome = match api.delete(&candidate, dry_run).await {
            Ok(()) => {
                counter!("kubegc_delete_ok_total", 1u64, "dry_run" => dry_label);
                Outcome::Ok
            }
            Err(e) => {
                counter!("kubegc_delete_err_total", 1u64, "dry_run" => dry_label);
                Outcome::Failed(e.to_string())
            }
        };
        let result = ExecutionResult { candidate, dry_run, outcome };
        if result.is_ok() {
            info!(target: "kubegc::report", "{}", result);
        } else {
            warn!(target: "kubegc::report", "{}", result);
        }
        results.push(result);
    }
    results
}
