//! kubegc kubehub – the cluster seam (discovery, list, delete) and its kube-rs implementation

#![forbid(unsafe_code)]

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use kube::{
    api::{Api, DeleteParams, ListParams, PropagationPolicy},
    config::{KubeConfigOptions, Kubeconfig},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Client, Config,
};
use kubegc_core::{ListedObject, OrphanCandidate, ResourceTypeDescriptor};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const PAGE_SIZE: u32 = 500;

/// An API group with the group/version the server prefers for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiGroupInfo {
    /// Empty for the legacy core group.
    pub name: String,
    /// `v1` for the core group, `group/version` otherwise.
    pub preferred_version: String,
}

/// What the sweep needs from a cluster: discovery plus list/delete on dynamic types.
#[async_trait::async_trait]
pub trait ClusterApi: Send + Sync {
    /// All API groups, including the core group. An error means the server is unreachable.
    async fn server_groups(&self) -> Result<Vec<ApiGroupInfo>>;

    /// Resource types served under one `group/version` (subresources included).
    async fn resources_for(&self, group_version: &str) -> Result<Vec<ResourceTypeDescriptor>>;

    /// Instances of a type across all namespaces, filtered server-side by label selector.
    async fn list(&self, resource_type: &ResourceTypeDescriptor, label_selector: &str) -> Result<Vec<ListedObject>>;

    /// Delete with foreground propagation; `dry_run` asks the server not to persist.
    async fn delete(&self, candidate: &OrphanCandidate, dry_run: bool) -> Result<()>;
}

/// Split `apps/v1` into `("apps", "v1")` and `v1` into `("", "v1")`.
pub fn parse_group_version(gv: &str) -> Result<(String, String)> {
    match gv.split('/').collect::<Vec<_>>().as_slice() {
        [version] if !version.is_empty() => Ok((String::new(), (*version).to_string())),
        [group, version] if !group.is_empty() && !version.is_empty() => {
            Ok(((*group).to_string(), (*version).to_string()))
        }
        _ => Err(anyhow!("invalid group/version: {:?} (expect v1 or group/v1)", gv)),
    }
}

fn api_resource(rt: &ResourceTypeDescriptor) -> ApiResource {
    let gvk = GroupVersionKind::gvk(&rt.group, &rt.version, &rt.kind);
    ApiResource::from_gvk_with_plural(&gvk, &rt.plural)
}

fn listed_from(obj: DynamicObject) -> ListedObject {
    let meta = obj.metadata;
    ListedObject {
        namespace: meta.namespace.filter(|ns| !ns.is_empty()),
        name: meta.name.unwrap_or_default(),
        owner_references: meta.owner_references.map(|o| o.len()).unwrap_or(0),
        annotations: meta.annotations.unwrap_or_default(),
    }
}

/// Text recorded for a failed delete: the server's message when there is one.
pub fn error_text(err: &kube::Error) -> String {
    match err {
        kube::Error::Api(ae) if !ae.message.is_empty() => ae.message.clone(),
        other => other.to_string(),
    }
}

/// kube-rs backed [`ClusterApi`].
#[derive(Clone)]
pub struct KubeHub {
    client: Client,
}

impl KubeHub {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(settings: &ClientSettings) -> Result<Self> {
        Ok(Self::new(build_client(settings).await?))
    }
}

#[async_trait::async_trait]
impl ClusterApi for KubeHub {
    async fn server_groups(&self) -> Result<Vec<ApiGroupInfo>> {
        let mut out = Vec::new();
        let core = self.client.list_core_api_versions().await.context("listing core API versions")?;
        if let Some(v) = core.versions.first() {
            out.push(ApiGroupInfo { name: String::new(), preferred_version: v.clone() });
        }
        let groups = self.client.list_api_groups().await.context("listing API groups")?;
        for g in groups.groups {
            let preferred = g
                .preferred_version
                .map(|v| v.group_version)
                .or_else(|| g.versions.first().map(|v| v.group_version.clone()));
            match preferred {
                Some(gv) => out.push(ApiGroupInfo { name: g.name, preferred_version: gv }),
                None => debug!(group = %g.name, "group advertises no versions"),
            }
        }
        Ok(out)
    }

    async fn resources_for(&self, group_version: &str) -> Result<Vec<ResourceTypeDescriptor>> {
        let (group, version) = parse_group_version(group_version)?;
        let list = if group.is_empty() {
            self.client.list_core_api_resources(&version).await
        } else {
            self.client.list_api_group_resources(group_version).await
        }
        .with_context(|| format!("unable to retrieve the complete list of server APIs: {}", group_version))?;
        Ok(list
            .resources
            .into_iter()
            .map(|r| ResourceTypeDescriptor {
                group: group.clone(),
                version: version.clone(),
                kind: r.kind,
                plural: r.name,
                namespaced: r.namespaced,
                verbs: r.verbs,
            })
            .collect())
    }

    async fn list(&self, resource_type: &ResourceTypeDescriptor, label_selector: &str) -> Result<Vec<ListedObject>> {
        let ar = api_resource(resource_type);
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let base = ListParams::default().labels(label_selector);
        let mut items = Vec::new();
        let mut continue_token: Option<String> = None;
        loop {
            let mut params = base.clone().limit(PAGE_SIZE);
            if let Some(token) = continue_token.as_deref() {
                params = params.continue_token(token);
            }
            let page = api.list(&params).await.map_err(|e| anyhow!(error_text(&e)))?;
            items.extend(page.items.into_iter().map(listed_from));
            match page.metadata.continue_ {
                Some(token) if !token.is_empty() => continue_token = Some(token),
                _ => break,
            }
        }
        debug!(gvk = %resource_type.gvk_key(), count = items.len(), "listed");
        Ok(items)
    }

    async fn delete(&self, candidate: &OrphanCandidate, dry_run: bool) -> Result<()> {
        let ar = api_resource(&candidate.resource_type);
        let api: Api<DynamicObject> = match candidate.namespace.as_deref() {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        };
        let dp = DeleteParams {
            dry_run,
            propagation_policy: Some(PropagationPolicy::Foreground),
            ..Default::default()
        };
        api.delete(&candidate.name, &dp).await.map_err(|e| anyhow!(error_text(&e)))?;
        Ok(())
    }
}

/// Where to load cluster credentials from.
#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    /// Explicit kubeconfig path; `None` falls back to `KUBECONFIG`, then `~/.kube/config`.
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
}

/// Resolve the kubeconfig path: explicit flag, then `KUBECONFIG`, then `$HOME/.kube/config` if it exists.
pub fn resolve_kubeconfig_path(
    explicit: Option<&Path>,
    env: Option<OsString>,
    home: Option<PathBuf>,
    exists: impl Fn(&Path) -> bool,
) -> Option<PathBuf> {
    if let Some(p) = explicit.filter(|p| !p.as_os_str().is_empty()) {
        return Some(p.to_path_buf());
    }
    if let Some(p) = env.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(p));
    }
    let default = home?.join(".kube").join("config");
    exists(&default).then_some(default)
}

/// Build a client from a resolved kubeconfig, or infer one (in-cluster) when none resolves.
pub async fn build_client(settings: &ClientSettings) -> Result<Client> {
    let path = resolve_kubeconfig_path(
        settings.kubeconfig.as_deref(),
        std::env::var_os("KUBECONFIG"),
        std::env::var_os("HOME").map(PathBuf::from),
        |p| p.is_file(),
    );
    let options = KubeConfigOptions { context: settings.context.clone(), ..Default::default() };
    let config = match &path {
        Some(p) => {
            let kc = Kubeconfig::read_from(p).with_context(|| format!("reading kubeconfig {}", p.display()))?;
            Config::from_custom_kubeconfig(kc, &options).await.context("loading kubeconfig")?
        }
        None if settings.context.is_some() => Config::from_kubeconfig(&options).await.context("loading kubeconfig")?,
        None => Config::infer().await.context("inferring cluster configuration")?,
    };
    info!(kubeconfig = ?path, context = ?settings.context, cluster = %config.cluster_url, "cluster client configured");
    Client::try_from(config).context("building kube client")
}
