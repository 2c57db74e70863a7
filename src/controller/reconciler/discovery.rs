//! SpireOidcDiscoveryProvider: ServiceAccount, Service, ConfigMap, Deployment and the
//! optional Route.

use super::{Context, PassState, RecordReconciler};
use crate::cluster::ClusterApi;
use crate::constants::{
    CONDITION_CONFIG_MAP_AVAILABLE, CONDITION_DEPLOYMENT_AVAILABLE, CONDITION_ROUTE_AVAILABLE,
    CONDITION_SERVICE_ACCOUNT_AVAILABLE, CONDITION_SERVICE_AVAILABLE, ROUTE_DISABLED_REASON,
};
use crate::controller::converge::{converge_step, Step};
use crate::controller::manifests::{config_hash, discovery};
use crate::controller::metadata::OwnedMeta;
use crate::crd::{IdentityRecord, RecordKind, SpireOidcDiscoveryProvider};
use crate::error::Result;
use async_trait::async_trait;
use tracing::debug;

const KIND: RecordKind = RecordKind::DiscoveryProvider;

#[derive(Debug, Default, Clone, Copy)]
pub struct DiscoveryProviderReconciler;

fn route_already_disabled(record: &SpireOidcDiscoveryProvider) -> bool {
    record
        .status()
        .and_then(|s| s.condition(CONDITION_ROUTE_AVAILABLE))
        .is_some_and(|c| !c.is_true() && c.reason.as_deref() == Some(ROUTE_DISABLED_REASON))
}

#[async_trait]
impl RecordReconciler for DiscoveryProviderReconciler {
    type Record = SpireOidcDiscoveryProvider;

    async fn pass<C: ClusterApi>(
        &self,
        ctx: &Context<C>,
        record: &SpireOidcDiscoveryProvider,
        state: &mut PassState,
    ) -> Result<()> {
        let cluster = &ctx.cluster;
        let create_only = state.create_only;
        let meta = OwnedMeta::new(record, &ctx.config.operand_namespace)?;

        converge_step(
            cluster,
            &mut state.status,
            Step::new(KIND, CONDITION_SERVICE_ACCOUNT_AVAILABLE),
            discovery::build_service_account(&meta),
            create_only,
        )
        .await?;

        converge_step(
            cluster,
            &mut state.status,
            Step::new(KIND, CONDITION_SERVICE_AVAILABLE),
            discovery::build_service(&meta),
            create_only,
        )
        .await?;

        let config_map = discovery::build_config_map(record, &meta)?;
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
            Step::new(KIND, CONDITION_DEPLOYMENT_AVAILABLE),
            discovery::build_deployment(record, &meta, &ctx.config, &hash),
            create_only,
        )
        .await?;

        if record.spec.managed_route {
            converge_step(
                cluster,
                &mut state.status,
                Step::new(KIND, CONDITION_ROUTE_AVAILABLE),
                discovery::build_route(record, &meta),
                create_only,
            )
            .await?;
        } else if route_already_disabled(record) {
            debug!("Managed route disabled, condition already reflects it");
        } else {
            state.status.add_condition(
                CONDITION_ROUTE_AVAILABLE,
                ROUTE_DISABLED_REASON,
                "managedRoute is false; the route is not managed",
                false,
            );
        }

        Ok(())
    }
}
