//! Prints the CustomResourceDefinitions served by the operator as a multi-document YAML stream

use anyhow::Result;
use kube::CustomResourceExt;
use spire_identity_operator::crd::{
    SpireAgent, SpireOidcDiscoveryProvider, SpireServer, ZeroTrustWorkloadIdentityManager,
};

fn main() -> Result<()> {
    let crds = [
        SpireServer::crd(),
        SpireAgent::crd(),
        SpireOidcDiscoveryProvider::crd(),
        ZeroTrustWorkloadIdentityManager::crd(),
    ];

    let mut documents = Vec::with_capacity(crds.len());
    for crd in &crds {
        documents.push(serde_yaml::to_string(crd)?);
    }
    print!("{}", documents.join("---\n"));

    Ok(())
}
