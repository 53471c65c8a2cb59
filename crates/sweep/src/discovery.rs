//! Type catalog discovery.

use anyhow::Result;
use futures::{stream, StreamExt};
use kubegc_core::{GcError, ResourceTypeDescriptor};
use kubegc_kubehub::ClusterApi;
use tracing::{info, warn};

/// Enumerate every resource type served under each group's preferred version.
///
/// Failing to list the groups themselves is fatal. A group/version whose resources
/// cannot be listed is logged and skipped. Subresources (`pods/log`) are dropped.
pub async fn discover_types<C>(api: &C, concurrency: usize) -> Result<Vec<ResourceTypeDescriptor>>
where
    C: ClusterApi + ?Sized,
{
    let groups = api.server_groups().await.map_err(|e| GcError::Discovery(format!("{:#}", e)))?;
    let per_group: Vec<_> = stream::iter(groups.iter())
        .map(|g| async move { (g, api.resources_for(&g.preferred_version).await) })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut out = Vec::new();
    for (group, res) in per_group {
        match res {
            Ok(types) => out.extend(types.into_iter().filter(|t| !t.plural.contains('/'))),
            Err(e) => {
                let error = format!("{:#}", e);
                warn!(group_version = %group.preferred_version, error = %error, "skipping group/version");
            }
        }
    }
    info!(groups = groups.len(), types = out.len(), "discovery complete");
    Ok(out)
}
