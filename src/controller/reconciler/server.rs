//! SpireServer: ServiceAccount, Service, ConfigMap, StatefulSet.

use super::{Context, PassState, RecordReconciler};
use crate::cluster::ClusterApi;
use crate::constants::{
    CONDITION_CONFIG_MAP_AVAILABLE, CONDITION_SERVICE_ACCOUNT_AVAILABLE,
    CONDITION_SERVICE_AVAILABLE, CONDITION_STATEFUL_SET_AVAILABLE,
};
use crate::controller::converge::{converge_step, Step};
use crate::controller::manifests::{config_hash, server};
use crate::controller::metadata::OwnedMeta;
use crate::crd::{RecordKind, SpireServer};
use crate::error::Result;
use async_trait::async_trait;

const KIND: RecordKind = RecordKind::Server;

#[derive(Debug, Default, Clone, Copy)]
pub struct ServerReconciler;

#[async_trait]
impl RecordReconciler for ServerReconciler {
    type Record = SpireServer;

    async fn pass<C: ClusterApi>(
        &self,
        ctx: &Context<C>,
        record: &SpireServer,
        state: &mut PassState,
    ) -> Result<()> {
        let cluster = &ctx.cluster;
        let create_only = state.create_only;
        let meta = OwnedMeta::new(record, &ctx.config.operand_namespace)?;

        converge_step(
            cluster,
            &mut state.status,
            Step::new(KIND, CONDITION_SERVICE_ACCOUNT_AVAILABLE),
            server::build_service_account(&meta),
            create_only,
        )
        .await?;

        converge_step(
            cluster,
            &mut state.status,
            Step::new(KIND, CONDITION_SERVICE_AVAILABLE),
            server::build_service(&meta),
            create_only,
        )
        .await?;

        let config_map = server::build_config_map(record, &meta)?;
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
            Step::new(KIND, CONDITION_STATEFUL_SET_AVAILABLE),
            server::build_stateful_set(record, &meta, &ctx.config, &hash),
            create_only,
        )
        .await?;

        Ok(())
    }
}
