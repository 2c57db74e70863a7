//! Cluster-wide RBAC the operands run with, owned by the scaffolding singleton.

use crate::controller::metadata::OwnedMeta;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};

fn rule(api_group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![api_group.to_string()]),
        resources: Some(resources.iter().map(|r| (*r).to_string()).collect()),
        verbs: verbs.iter().map(|v| (*v).to_string()).collect(),
        ..PolicyRule::default()
    }
}

/// Operand identities that need cluster-wide access: (service account, rules)
fn operand_rules() -> [(&'static str, Vec<PolicyRule>); 2] {
    [
        (
            super::server::NAME,
            vec![
                rule("", &["pods", "nodes"], &["get", "list", "watch"]),
                rule("", &["configmaps"], &["get", "patch", "update"]),
                rule("authentication.k8s.io", &["tokenreviews"], &["create"]),
            ],
        ),
        (
            super::agent::NAME,
            vec![rule("", &["pods", "nodes", "nodes/proxy"], &["get", "list", "watch"])],
        ),
    ]
}

pub fn build_cluster_roles(meta: &OwnedMeta) -> Vec<ClusterRole> {
    operand_rules()
        .into_iter()
        .map(|(name, rules)| ClusterRole {
            metadata: meta.cluster_scoped(name, name),
            rules: Some(rules),
            ..ClusterRole::default()
        })
        .collect()
}

pub fn build_cluster_role_bindings(meta: &OwnedMeta) -> Vec<ClusterRoleBinding> {
    operand_rules()
        .into_iter()
        .map(|(name, _)| ClusterRoleBinding {
            metadata: meta.cluster_scoped(name, name),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: name.to_string(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: name.to_string(),
                namespace: Some(meta.namespace().to_string()),
                ..Subject::default()
            }]),
        })
        .collect()
}
