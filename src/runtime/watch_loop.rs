//! # Watch Loop
//!
//! One `kube_runtime::Controller` per record kind. Each controller is triggered by
//! generation or annotation changes of its record and by changes to the objects it owns
//! that carry its managed-by labels. Status-only writes do not wake the record's pass;
//! every trigger maps to the record's singleton name, so passes for one record are
//! serialized while different kinds run independently.

use super::error_policy::{classify_stream_error, handle_reconciliation_error, StreamErrorAction};
use crate::cluster::KubeCluster;
use crate::constants::{SINGLETON_NAME, SINGLETON_RECREATE_REQUEUE_SECS};
use crate::controller::metadata::managed_by_selector;
use crate::controller::reconciler::{
    run_pass, AgentReconciler, Context, DiscoveryProviderReconciler, PassOutcome,
    RecordReconciler, ScaffoldingReconciler, ServerReconciler,
};
use crate::crd::{
    IdentityRecord, RecordKind, Route, SpireAgent, SpireOidcDiscoveryProvider, SpireServer,
    ZeroTrustWorkloadIdentityManager,
};
use crate::error::ReconcileError;
use crate::observability;
use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{Action, Controller};
use kube_runtime::reflector::{self, ObjectRef, Store};
use kube_runtime::{predicates, watcher, Predicate, WatchStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type OperatorContext = Arc<Context<KubeCluster>>;

/// Reconcile entry point handed to every controller
async fn reconcile<R>(record: Arc<R::Record>, ctx: OperatorContext) -> Result<Action, ReconcileError>
where
    R: RecordReconciler + Default,
{
    let kind = <R::Record as IdentityRecord>::KIND;
    let outcome = run_pass(&R::default(), &ctx, &record.name_any()).await?;
    Ok(match outcome {
        PassOutcome::Recreated => {
            observability::metrics::increment_requeues_total(kind, "recreated");
            Action::requeue(Duration::from_secs(SINGLETON_RECREATE_REQUEUE_SECS))
        }
        PassOutcome::Idle => Action::await_change(),
        PassOutcome::Converged => {
            observability::metrics::increment_requeues_total(kind, "resync");
            Action::requeue(ctx.config.resync_interval())
        }
    })
}

/// Hash of the record fields that warrant a pass: `metadata.generation` and annotations
fn primary_trigger<K: kube::Resource>(obj: &K) -> Option<u64> {
    predicates::generation
        .combine(predicates::annotations)
        .hash_property(obj)
}

/// Reflected watch of a record kind, filtered to [`primary_trigger`] changes
fn primary_stream<K: IdentityRecord>(
    api: Api<K>,
) -> (
    Store<K>,
    impl futures::Stream<Item = Result<K, watcher::Error>> + Send + 'static,
) {
    let (reader, writer) = reflector::store();
    let stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .predicate_filter(primary_trigger::<K>);
    (reader, stream)
}

fn owned_config(kind: RecordKind) -> watcher::Config {
    watcher::Config::default().labels(&managed_by_selector(kind))
}

fn to_singleton<K, O>(_: O) -> Option<ObjectRef<K>>
where
    K: kube::Resource<DynamicType = ()>,
{
    Some(ObjectRef::new(SINGLETON_NAME))
}

/// Drive a controller's output stream, recreating the scaffolding singleton when the
/// controller reports it missing
async fn drain<K, S>(kind: RecordKind, stream: S, ctx: OperatorContext)
where
    K: IdentityRecord,
    S: futures::Stream<
        Item = Result<
            (ObjectRef<K>, Action),
            kube_runtime::controller::Error<ReconcileError, watcher::Error>,
        >,
    >,
{
    stream
        .for_each(|result| {
            let ctx = Arc::clone(&ctx);
            async move {
                match result {
                    Ok((obj, action)) => {
                        debug!(kind = %kind, name = %obj.name, ?action, "Reconciliation completed");
                    }
                    Err(e) => {
                        if let StreamErrorAction::RecreateSingleton(name) =
                            classify_stream_error(kind, &e)
                        {
                            if let Err(err) = run_pass(&ScaffoldingReconciler, &ctx, &name).await {
                                warn!(error = %err, "Failed to recreate {}", kind);
                            }
                        }
                    }
                }
            }
        })
        .await;
}

/// Whether the OpenShift route API is served by this cluster
async fn route_api_available(client: &Client) -> bool {
    match kube::discovery::group(client, "route.openshift.io").await {
        Ok(_) => true,
        Err(e) => {
            info!(error = %e, "route.openshift.io not available, Route objects will not be watched");
            false
        }
    }
}

/// Run every controller until shutdown
pub async fn run_watch_loop(client: Client, ctx: OperatorContext) -> Result<()> {
    let namespace = ctx.config.operand_namespace.clone();
    let watch_routes = route_api_available(&client).await;

    let server = {
        let kind = RecordKind::Server;
        let (reader, trigger) = primary_stream(Api::<SpireServer>::all(client.clone()));
        let controller = Controller::for_stream(trigger, reader)
            .owns(Api::<ServiceAccount>::namespaced(client.clone(), &namespace), owned_config(kind))
            .owns(Api::<Service>::namespaced(client.clone(), &namespace), owned_config(kind))
            .owns(Api::<ConfigMap>::namespaced(client.clone(), &namespace), owned_config(kind))
            .owns(Api::<StatefulSet>::namespaced(client.clone(), &namespace), owned_config(kind))
            .watches(
                Api::<ZeroTrustWorkloadIdentityManager>::all(client.clone()),
                watcher::Config::default(),
                to_singleton::<SpireServer, _>,
            )
            .shutdown_on_signal()
            .run(
                reconcile::<ServerReconciler>,
                handle_reconciliation_error::<SpireServer, KubeCluster>,
                Arc::clone(&ctx),
            );
        drain(kind, controller, Arc::clone(&ctx))
    };

    let agent = {
        let kind = RecordKind::Agent;
        let (reader, trigger) = primary_stream(Api::<SpireAgent>::all(client.clone()));
        let controller = Controller::for_stream(trigger, reader)
            .owns(Api::<ServiceAccount>::namespaced(client.clone(), &namespace), owned_config(kind))
            .owns(Api::<ConfigMap>::namespaced(client.clone(), &namespace), owned_config(kind))
            .owns(Api::<DaemonSet>::namespaced(client.clone(), &namespace), owned_config(kind))
            .watches(
                Api::<ZeroTrustWorkloadIdentityManager>::all(client.clone()),
                watcher::Config::default(),
                to_singleton::<SpireAgent, _>,
            )
            .shutdown_on_signal()
            .run(
                reconcile::<AgentReconciler>,
                handle_reconciliation_error::<SpireAgent, KubeCluster>,
                Arc::clone(&ctx),
            );
        drain(kind, controller, Arc::clone(&ctx))
    };

    let discovery = {
        let kind = RecordKind::DiscoveryProvider;
        let (reader, trigger) = primary_stream(Api::<SpireOidcDiscoveryProvider>::all(client.clone()));
        let mut controller = Controller::for_stream(trigger, reader)
        .owns(Api::<ServiceAccount>::namespaced(client.clone(), &namespace), owned_config(kind))
        .owns(Api::<Service>::namespaced(client.clone(), &namespace), owned_config(kind))
        .owns(Api::<ConfigMap>::namespaced(client.clone(), &namespace), owned_config(kind))
        .owns(Api::<Deployment>::namespaced(client.clone(), &namespace), owned_config(kind))
        .watches(
            Api::<ZeroTrustWorkloadIdentityManager>::all(client.clone()),
            watcher::Config::default(),
            to_singleton::<SpireOidcDiscoveryProvider, _>,
        );
        if watch_routes {
            controller = controller.owns(Api::<Route>::namespaced(client.clone(), &namespace), owned_config(kind));
        }
        let controller = controller.shutdown_on_signal().run(
            reconcile::<DiscoveryProviderReconciler>,
            handle_reconciliation_error::<SpireOidcDiscoveryProvider, KubeCluster>,
            Arc::clone(&ctx),
        );
        drain(kind, controller, Arc::clone(&ctx))
    };

    let scaffolding = {
        let kind = RecordKind::Scaffolding;
        let (reader, trigger) = primary_stream(Api::<ZeroTrustWorkloadIdentityManager>::all(client.clone()));
        let controller = Controller::for_stream(trigger, reader)
        .owns(Api::<ClusterRole>::all(client.clone()), owned_config(kind))
        .owns(Api::<ClusterRoleBinding>::all(client.clone()), owned_config(kind))
        .watches(
            Api::<SpireServer>::all(client.clone()),
            watcher::Config::default(),
            to_singleton::<ZeroTrustWorkloadIdentityManager, _>,
        )
        .watches(
            Api::<SpireAgent>::all(client.clone()),
            watcher::Config::default(),
            to_singleton::<ZeroTrustWorkloadIdentityManager, _>,
        )
        .watches(
            Api::<SpireOidcDiscoveryProvider>::all(client.clone()),
            watcher::Config::default(),
            to_singleton::<ZeroTrustWorkloadIdentityManager, _>,
        )
        .shutdown_on_signal()
        .run(
            reconcile::<ScaffoldingReconciler>,
            handle_reconciliation_error::<ZeroTrustWorkloadIdentityManager, KubeCluster>,
            Arc::clone(&ctx),
        );
        drain(kind, controller, Arc::clone(&ctx))
    };

    info!("Watch loops started for {}, {}, {} and {}", RecordKind::Server, RecordKind::Agent, RecordKind::DiscoveryProvider, RecordKind::Scaffolding);
    futures::join!(server, agent, discovery, scaffolding);
    info!("Watch loops stopped");
    Ok(())
}
