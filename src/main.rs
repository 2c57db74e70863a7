//! # SPIRE Identity Operator
//!
//! Entry point: starts the health/metrics server, the admission webhook and the
//! per-kind controllers.

use anyhow::Result;
use clap::Parser;
use spire_identity_operator::runtime::{initialize, run_watch_loop};
use spire_identity_operator::webhook::{start_webhook_server, Validator};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "spire-identity-operator")]
#[command(about = "Kubernetes operator for the SPIRE workload identity stack")]
#[command(version)]
struct Args {
    /// Do not serve the validating admission webhook
    #[arg(long, env = "DISABLE_WEBHOOK", default_value = "false")]
    disable_webhook: bool,

    /// Serve only the admission webhook; do not run the controllers
    #[arg(long, env = "DISABLE_CONTROLLERS", default_value = "false")]
    disable_controllers: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let init = initialize().await?;

    let webhook = if args.disable_webhook {
        info!("Admission webhook disabled");
        None
    } else {
        let validator = Arc::new(Validator::new(init.context.cluster.clone()));
        let server_config = init.server_config.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = start_webhook_server(&server_config, validator).await {
                error!("Admission webhook server error: {}", e);
            }
        }))
    };

    if args.disable_controllers {
        info!("Controllers disabled");
        if let Some(handle) = webhook {
            handle.await?;
        }
        return Ok(());
    }

    run_watch_loop(init.client, init.context).await?;

    if let Some(handle) = webhook {
        handle.abort();
    }

    Ok(())
}
