//! # Webhook Server
//!
//! HTTPS endpoints answering `admission.k8s.io/v1` AdmissionReview requests, one per
//! record kind.

use super::validator::{Rejection, SiblingLookup, Validator};
use crate::config::ServerConfig;
use crate::crd::{IdentityRecord, SpireAgent, SpireOidcDiscoveryProvider, SpireServer};
use crate::observability::metrics;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

fn operation_name(operation: &Operation) -> &'static str {
    match operation {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
    }
}

/// Validate one admission request; deletes and connects are always allowed
pub async fn review<K, L>(validator: &Validator<L>, body: AdmissionReview<K>) -> AdmissionReview<DynamicObject>
where
    K: IdentityRecord,
    L: SiblingLookup,
{
    let start = std::time::Instant::now();
    let kind = K::KIND.kind_name();

    let request: AdmissionRequest<K> = match body.try_into() {
        Ok(request) => request,
        Err(e) => {
            warn!(kind, error = %e, "Malformed admission review");
            return AdmissionResponse::invalid(e.to_string()).into_review();
        }
    };

    let verdict = match request.operation {
        Operation::Create => match &request.object {
            Some(object) => validator.validate_create(object).await,
            None => Err(Rejection::MissingObject),
        },
        Operation::Update => match (&request.old_object, &request.object) {
            (Some(old), Some(new)) => validator.validate_update(old, new).await,
            _ => Err(Rejection::MissingObject),
        },
        Operation::Delete | Operation::Connect => Ok(()),
    };

    let operation = operation_name(&request.operation);
    metrics::observe_admission_duration(kind, start.elapsed().as_secs_f64());
    metrics::increment_admission_requests(kind, operation, verdict.is_ok());

    let response = AdmissionResponse::from(&request);
    match verdict {
        Ok(()) => response.into_review(),
        Err(rejection) => {
            info!(kind, operation, name = %request.name, reason = %rejection, "Denied admission");
            response.deny(rejection.to_string()).into_review()
        }
    }
}

async fn validate_server<L: SiblingLookup + 'static>(
    State(validator): State<Arc<Validator<L>>>,
    Json(body): Json<AdmissionReview<SpireServer>>,
) -> Json<AdmissionReview<DynamicObject>> {
    Json(review(&validator, body).await)
}

async fn validate_agent<L: SiblingLookup + 'static>(
    State(validator): State<Arc<Validator<L>>>,
    Json(body): Json<AdmissionReview<SpireAgent>>,
) -> Json<AdmissionReview<DynamicObject>> {
    Json(review(&validator, body).await)
}

async fn validate_discovery_provider<L: SiblingLookup + 'static>(
    State(validator): State<Arc<Validator<L>>>,
    Json(body): Json<AdmissionReview<SpireOidcDiscoveryProvider>>,
) -> Json<AdmissionReview<DynamicObject>> {
    Json(review(&validator, body).await)
}

pub fn router<L: SiblingLookup + 'static>(validator: Arc<Validator<L>>) -> Router {
    Router::new()
        .route("/validate-spireserver", post(validate_server::<L>))
        .route("/validate-spireagent", post(validate_agent::<L>))
        .route(
            "/validate-spireoidcdiscoveryprovider",
            post(validate_discovery_provider::<L>),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(validator)
}

/// Serve the webhook over TLS until the process exits
pub async fn start_webhook_server<L: SiblingLookup + 'static>(
    config: &ServerConfig,
    validator: Arc<Validator<L>>,
) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.webhook_port));
    let tls = RustlsConfig::from_pem_file(&config.webhook_cert_path, &config.webhook_key_path).await?;

    info!("Admission webhook listening on {}", addr);
    axum_server::bind_rustls(addr, tls)
        .serve(router(validator).into_make_service())
        .await?;
    Ok(())
}
