//! Deletion ordering: cluster-scoped resources first, then namespaced ones, Namespaces last.

use kubegc_core::{DeletionPlan, OrphanCandidate};

/// Stable three-way partition of the candidate set. Relative order inside each
/// bucket is the input order.
pub fn order(candidates: Vec<OrphanCandidate>) -> DeletionPlan {
    let mut cluster_scoped = Vec::new();
    let mut namespaced = Vec::new();
    let mut namespaces = Vec::new();
    for c in candidates {
        if c.is_namespace() {
            namespaces.push(c);
        } else if c.is_cluster_scoped() {
            cluster_scoped.push(c);
        } else {
            namespaced.push(c);
        }
    }
    let mut plan = cluster_scoped;
    plan.extend(namespaced);
    plan.extend(namespaces);
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubegc_core::ResourceTypeDescriptor;

    fn cand(kind: &str, ns: Option<&str>, name: &str) -> OrphanCandidate {
        let rt = ResourceTypeDescriptor {
            group: String::new(),
            version: "v1".into(),
            kind: kind.into(),
            plural: format!("{}s", kind.to_lowercase()),
            namespaced: ns.is_some(),
            verbs: vec![],
        };
        OrphanCandidate::new(rt, ns.map(str::to_string), name)
    }

    fn bucket(c: &OrphanCandidate) -> u8 {
        if c.is_namespace() {
            2
        } else if c.is_cluster_scoped() {
            0
        } else {
            1
        }
    }

    #[test]
    fn namespaces_go_last_and_keep_scan_order() {
        let input = vec![
            cand("Namespace", None, "ns-a"),
            cand("Namespace", None, "ns-b"),
            cand("ConfigMap", Some("ns-a"), "cm"),
        ];
        let names: Vec<_> = order(input).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["cm", "ns-a", "ns-b"]);
    }

    #[test]
    fn cluster_scoped_before_namespaced() {
        let input = vec![
            cand("ConfigMap", Some("ns1"), "bar"),
            cand("ClusterRole", None, "foo"),
            cand("Secret", Some("ns1"), "baz"),
            cand("PersistentVolume", None, "pv"),
        ];
        let names: Vec<_> = order(input).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["foo", "pv", "bar", "baz"]);
    }

    #[test]
    fn partition_is_stable_for_mixed_input() {
        // Deterministic pseudo-random mix of the three buckets.
        let mut seed: u32 = 0x9e37_79b9;
        let mut input = Vec::new();
        for i in 0..200 {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let c = match seed >> 30 {
                0 => cand("Namespace", None, &format!("n{}", i)),
                1 => cand("ClusterRole", None, &format!("c{}", i)),
                _ => cand("ConfigMap", Some("ns"), &format!("m{}", i)),
            };
            input.push(c);
        }
        let plan = order(input.clone());
        assert_eq!(plan.len(), input.len());

        let buckets: Vec<u8> = plan.iter().map(bucket).collect();
        assert!(buckets.windows(2).all(|w| w[0] <= w[1]), "buckets out of order");

        for b in 0..3u8 {
            let from_input: Vec<_> = input.iter().filter(|c| bucket(c) == b).map(|c| c.name.clone()).collect();
            let from_plan: Vec<_> = plan.iter().filter(|c| bucket(c) == b).map(|c| c.name.clone()).collect();
            assert_eq!(from_input, from_plan, "bucket {} not stable", b);
        }
    }

    #[test]
    fn empty_input_gives_empty_plan() {
        assert!(order(Vec::new()).is_empty());
    }
}
