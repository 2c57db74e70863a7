//! SpireAgent: ServiceAccount, ConfigMap, DaemonSet.

use super::{Context, PassState, RecordReconciler};
use crate::cluster::ClusterApi;
use crate::constants::{
    CONDITION_CONFIG_MAP_AVAILABLE, CONDITION_DAEMON_SET_AVAILABLE,
    CONDITION_SERVICE_ACCOUNT_AVAILABLE,
};
use crate::controller::converge::{converge_step, Step};
use crate::controller::manifests::{agent, config_hash};
use crate::controller::metadata::OwnedMeta;
use crate::crd::{RecordKind, SpireAgent};
use crate::error::Result;
use async_trait::async_trait;

const KIND: RecordKind = RecordKind::Agent;

#[derive(Debug, Default, Clone, Copy)]
pub struct AgentReconciler;

#[async_trait]
impl RecordReconciler for AgentReconciler {
    type Record = SpireAgent;

    async fn pass<C: ClusterApi>(
        &self,
        ctx: &Context<C>,
        record: &SpireAgent,
        state: &mut PassState,
    ) -> Result<()> {
        let cluster = &ctx.cluster;
        let create_only = state.create_only;
        let meta = OwnedMeta::new(record, &ctx.config.operand_namespace)?;

        converge_step(
            cluster,
            &mut state.status,
            Step::new(KIND, CONDITION_SERVICE_ACCOUNT_AVAILABLE),
            agent::build_service_account(&meta),
            create_only,
        )
        .await?;

        let config_map = agent::build_config_map(record, &meta)?;
        let hash = config_hash(&config_map);
        converge_step(
            cluster,
            &mut state.status,
            Step::new(KIND, CONDITION_CONFIG_MAP_AVAILABLE),
            config_map,
            create_only,
        )
        .await?;

        converge_step(
            cluster,
            &mut state.status,
            Step::new(KIND, CONDITION_DAEMON_SET_AVAILABLE),
            agent::build_daemon_set(record, &meta, &ctx.config, &hash),
            create_only,
        )
        .await?;

        Ok(())
    }
}
