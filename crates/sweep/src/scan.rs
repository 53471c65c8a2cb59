//! Orphan scanner: list each type by label selector, keep ownerless objects whose
//! annotations satisfy the filter.

use futures::{stream, StreamExt};
use kubegc_core::{Filter, ListedObject, OrphanCandidate, ResourceTypeDescriptor};
use kubegc_kubehub::ClusterApi;
use metrics::histogram;
use tracing::{debug, info, trace};

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Passed verbatim to the server.
    pub label_selector: String,
    pub filter: Filter,
    /// Types listed at once. Output order does not depend on it.
    pub concurrency: usize,
}

/// Scan every type and return the flat candidate set, in catalog order.
///
/// A type that cannot be listed contributes nothing, exactly as if it had no instances.
pub async fn scan<C>(api: &C, types: &[ResourceTypeDescriptor], opts: &ScanOptions) -> Vec<OrphanCandidate>
where
    C: ClusterApi + ?Sized,
{
    let t0 = std::time::Instant::now();
    let per_type: Vec<Vec<OrphanCandidate>> = stream::iter(types)
        .map(|rt| scan_type(api, rt, opts))
        .buffered(opts.concurrency.max(1))
        .collect()
        .await;
    let out: Vec<OrphanCandidate> = per_type.into_iter().flatten().collect();
    histogram!("kubegc_scan_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
    info!(types = types.len(), candidates = out.len(), selector = %opts.label_selector, filter = %opts.filter, "scan complete");
    out
}

async fn scan_type<C>(api: &C, rt: &ResourceTypeDescriptor, opts: &ScanOptions) -> Vec<OrphanCandidate>
where
    C: ClusterApi + ?Sized,
{
    if !rt.is_listable() {
        trace!(gvk = %rt.gvk_key(), "type does not support list");
        return Vec::new();
    }
    match api.list(rt, &opts.label_selector).await {
        Ok(items) => select_orphans(rt, items, &opts.filter),
        Err(e) => {
            debug!(gvk = %rt.gvk_key(), error = %e, "list failed; skipping type");
            Vec::new()
        }
    }
}

/// Keep instances with no owner references whose annotations satisfy `filter`.
pub fn select_orphans(rt: &ResourceTypeDescriptor, items: Vec<ListedObject>, filter: &Filter) -> Vec<OrphanCandidate> {
    items
        .into_iter()
        .filter(|o| {
            if o.has_owner() {
                trace!(gvk = %rt.gvk_key(), name = %o.name, "owned; not a root");
                return false;
            }
            filter.matches(&o.annotations)
        })
        .map(|o| OrphanCandidate::new(rt.clone(), o.namespace, o.name))
        .collect()
}
