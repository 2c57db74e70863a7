//! # SPIRE Identity Operator
//!
//! A Kubernetes operator that deploys the SPIRE workload identity stack from four
//! cluster-scoped singleton records and keeps the records consistent with each other.
//!
//! ## Overview
//!
//! 1. **Converging operands** - Each record kind owns a fixed sequence of steps that
//!    create or update one Kubernetes object each (ServiceAccounts, Services, ConfigMaps,
//!    workloads, Routes, cluster RBAC)
//! 2. **Reporting status** - Conditions collected during a pass are merged into the
//!    record's status in a single write
//! 3. **Admission validation** - A validating webhook rejects records whose trust domain,
//!    cluster name or issuer disagree with their siblings
//!
//! ## Record kinds
//!
//! - `SpireServer`
//! - `SpireAgent`
//! - `SpireOidcDiscoveryProvider`
//! - `ZeroTrustWorkloadIdentityManager` (scaffolding, recreated when deleted)

pub mod cluster;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod error;
pub mod observability;
pub mod runtime;
pub mod validation;
pub mod webhook;
