//! ZeroTrustWorkloadIdentityManager: cluster-wide RBAC plus an aggregate view of the
//! operand records. The `cluster` singleton is recreated whenever it goes missing.

use super::{Context, PassState, RecordReconciler};
use crate::cluster::ClusterApi;
use crate::constants::{
    CONDITION_CLUSTER_ROLE_AVAILABLE, CONDITION_CLUSTER_ROLE_BINDING_AVAILABLE,
    CONDITION_OPERANDS_AVAILABLE, CONDITION_READY, SINGLETON_NAME,
};
use crate::controller::converge::{converge_step, Step};
use crate::controller::manifests::scaffolding;
use crate::controller::metadata::OwnedMeta;
use crate::crd::{
    IdentityRecord, RecordKind, SpireAgent, SpireOidcDiscoveryProvider, SpireServer,
    ZeroTrustWorkloadIdentityManager, ZeroTrustWorkloadIdentityManagerSpec,
};
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;

const KIND: RecordKind = RecordKind::Scaffolding;

#[derive(Debug, Default, Clone, Copy)]
pub struct ScaffoldingReconciler;

/// Why an operand is not ready, or `None` when it is
async fn operand_problem<C, K>(cluster: &C) -> Result<Option<String>>
where
    C: ClusterApi,
    K: IdentityRecord,
{
    let record = cluster
        .get::<K>(None, SINGLETON_NAME)
        .await
        .map_err(ReconcileError::Lookup)?;
    Ok(match record {
        None => Some(format!("{} not found", K::KIND)),
        Some(r) if r.status().is_some_and(|s| s.is_true(CONDITION_READY)) => None,
        Some(_) => Some(format!("{} is not ready", K::KIND)),
    })
}

#[async_trait]
impl RecordReconciler for ScaffoldingReconciler {
    type Record = ZeroTrustWorkloadIdentityManager;

    fn recreate(&self, name: &str) -> Option<ZeroTrustWorkloadIdentityManager> {
        (name == SINGLETON_NAME).then(|| {
            ZeroTrustWorkloadIdentityManager::new(
                SINGLETON_NAME,
                ZeroTrustWorkloadIdentityManagerSpec::default(),
            )
        })
    }

    async fn pass<C: ClusterApi>(
        &self,
        ctx: &Context<C>,
        record: &ZeroTrustWorkloadIdentityManager,
        state: &mut PassState,
    ) -> Result<()> {
        let cluster = &ctx.cluster;
        let create_only = state.create_only;
        let meta = OwnedMeta::new(record, &ctx.config.operand_namespace)?;

        for role in scaffolding::build_cluster_roles(&meta) {
            converge_step(
                cluster,
                &mut state.status,
                Step::new(KIND, CONDITION_CLUSTER_ROLE_AVAILABLE),
                role,
                create_only,
            )
            .await?;
        }

        for binding in scaffolding::build_cluster_role_bindings(&meta) {
            converge_step(
                cluster,
                &mut state.status,
                Step::new(KIND, CONDITION_CLUSTER_ROLE_BINDING_AVAILABLE),
                binding,
                create_only,
            )
            .await?;
        }

        let problems: Vec<String> = [
            operand_problem::<C, SpireServer>(cluster).await?,
            operand_problem::<C, SpireAgent>(cluster).await?,
            operand_problem::<C, SpireOidcDiscoveryProvider>(cluster).await?,
        ]
        .into_iter()
        .flatten()
        .collect();

        if problems.is_empty() {
            state.status.add_condition(
                CONDITION_OPERANDS_AVAILABLE,
                "OperandsReady",
                "all operands are ready",
                true,
            );
        } else {
            state.status.add_condition(
                CONDITION_OPERANDS_AVAILABLE,
                "OperandsNotReady",
                problems.join("; "),
                false,
            );
        }
        Ok(())
    }
}
