//! kubegc core types: resource type descriptors, listed objects, orphan candidates
//! and execution results.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod selector;

pub use selector::{Filter, Operator, Requirement, SelectorError};

/// Kind of the cluster-scoped container resource deleted last.
pub const NAMESPACE_KIND: &str = "Namespace";

/// One listable/deletable resource type as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTypeDescriptor {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Path segment used to address the type (e.g. `clusterroles`).
    pub plural: String,
    pub namespaced: bool,
    /// Verbs advertised by discovery. Empty when the server did not report any.
    #[serde(default)]
    pub verbs: Vec<String>,
}

impl ResourceTypeDescriptor {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn gvk_key(&self) -> String {
        format!("{}/{}", self.api_version(), self.kind)
    }

    /// True unless discovery reported a verb list that lacks `list`.
    pub fn is_listable(&self) -> bool {
        self.verbs.is_empty() || self.verbs.iter().any(|v| v == "list")
    }
}

/// The parts of a listed instance the scanner looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedObject {
    pub namespace: Option<String>,
    pub name: String,
    /// Number of `metadata.ownerReferences` entries.
    pub owner_references: usize,
    pub annotations: BTreeMap<String, String>,
}

impl ListedObject {
    pub fn has_owner(&self) -> bool {
        self.owner_references > 0
    }
}

/// One instance selected for deletion.
///
/// Only built for instances without owner references whose annotations satisfy the filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanCandidate {
    pub resource_type: ResourceTypeDescriptor,
    /// `None` for cluster-scoped instances.
    pub namespace: Option<String>,
    pub name: String,
}

impl OrphanCandidate {
    pub fn new(resource_type: ResourceTypeDescriptor, namespace: Option<String>, name: impl Into<String>) -> Self {
        // The API reports cluster-scoped objects with either no namespace or an empty one.
        let namespace = namespace.filter(|ns| !ns.is_empty());
        Self { resource_type, namespace, name: name.into() }
    }

    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_none()
    }

    pub fn is_namespace(&self) -> bool {
        self.resource_type.kind == NAMESPACE_KIND
    }
}

/// Ordered candidates, consumed once by the executor.
pub type DeletionPlan = Vec<OrphanCandidate>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Failed(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ok => f.write_str("OK"),
            Outcome::Failed(e) => f.write_str(e),
        }
    }
}

/// Result of one delete request. `Display` renders the report line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub candidate: OrphanCandidate,
    pub dry_run: bool,
    pub outcome: Outcome,
}

impl ExecutionResult {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, Outcome::Ok)
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.dry_run { "(dry-run) " } else { "" };
        let c = &self.candidate;
        match c.namespace.as_deref() {
            None => write!(f, "{}delete {}/{}... {}", prefix, c.resource_type.plural, c.name, self.outcome),
            Some(ns) => write!(
                f,
                "{}delete {}/{} in namespace {}... {}",
                prefix, c.resource_type.plural, c.name, ns, self.outcome
            ),
        }
    }
}

/// Fatal errors: anything here aborts the run before or during discovery.
#[derive(Debug, Error)]
pub enum GcError {
    #[error("missing required argument: --{0}")]
    MissingArgument(&'static str),
    #[error("invalid filter")]
    InvalidFilter(#[from] SelectorError),
    #[error("cannot build cluster client: {0}")]
    Client(String),
    #[error("discovery failed: {0}")]
    Discovery(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rt(group: &str, kind: &str, plural: &str, namespaced: bool) -> ResourceTypeDescriptor {
        ResourceTypeDescriptor {
            group: group.into(),
            version: "v1".into(),
            kind: kind.into(),
            plural: plural.into(),
            namespaced,
            verbs: vec![],
        }
    }

    #[test]
    fn api_version_and_gvk_key() {
        let core = rt("", "ConfigMap", "configmaps", true);
        assert_eq!(core.api_version(), "v1");
        assert_eq!(core.gvk_key(), "v1/ConfigMap");
        let rbac = rt("rbac.authorization.k8s.io", "ClusterRole", "clusterroles", false);
        assert_eq!(rbac.gvk_key(), "rbac.authorization.k8s.io/v1/ClusterRole");
    }

    #[test]
    fn listable_when_verbs_unknown_or_contain_list() {
        let mut t = rt("", "Binding", "bindings", true);
        assert!(t.is_listable());
        t.verbs = vec!["create".into()];
        assert!(!t.is_listable());
        t.verbs.push("list".into());
        assert!(t.is_listable());
    }

    #[test]
    fn empty_namespace_is_cluster_scoped() {
        let c = OrphanCandidate::new(rt("", "Namespace", "namespaces", false), Some(String::new()), "ns-a");
        assert!(c.is_cluster_scoped());
        assert!(c.is_namespace());
    }

    #[test]
    fn report_lines() {
        let cluster = ExecutionResult {
            candidate: OrphanCandidate::new(rt("rbac.authorization.k8s.io", "ClusterRole", "clusterroles", false), None, "foo"),
            dry_run: true,
            outcome: Outcome::Ok,
        };
        assert_eq!(cluster.to_string(), "(dry-run) delete clusterroles/foo... OK");

        let namespaced = ExecutionResult {
            candidate: OrphanCandidate::new(rt("", "ConfigMap", "configmaps", true), Some("ns1".into()), "bar"),
            dry_run: false,
            outcome: Outcome::Failed("configmaps \"bar\" is forbidden".into()),
        };
        assert_eq!(
            namespaced.to_string(),
            "delete configmaps/bar in namespace ns1... configmaps \"bar\" is forbidden"
        );
    }

    #[test]
    fn invalid_filter_leaves_detail_to_source() {
        use std::error::Error as _;
        let err = GcError::from(Filter::parse("owner in (a").unwrap_err());
        assert_eq!(err.to_string(), "invalid filter");
        let source = err.source().expect("selector error as source");
        assert!(source.is::<SelectorError>());
        assert!(!source.to_string().is_empty());
    }

    #[test]
    fn outcome_serializes_tagged() {
        let v = serde_json::to_value(Outcome::Failed("boom".into())).unwrap();
        assert_eq!(v, serde_json::json!({"status": "failed", "error": "boom"}));
        let v = serde_json::to_value(Outcome::Ok).unwrap();
        assert_eq!(v, serde_json::json!({"status": "ok"}));
    }
}
