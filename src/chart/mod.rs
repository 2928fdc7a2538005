//! Chart update discovery and retrieval
//!
//! This module discovers which published chart versions in an OCI registry are
//! newer than the installed one, caches that result per chart, and pulls the
//! archive of a chosen version.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Discovery  │────▶│    Cache    │◀────│   Callers   │
//! │ (list tags) │     │  (catalog)  │     │(get, prune) │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │
//!        ▼
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Registries │◀────│  Retriever  │────▶│ Credentials │
//! │    (oci)    │     │   (pull)    │     │   (store)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: In-memory per-chart update cache with generation-guarded publish
//! - [`catalog`]: `ChartUpdates`, the descending list of newer versions
//! - [`credentials`]: File-backed registry credential store scoped per chart
//! - [`discovery`]: Builds catalogs from registry tags and publishes them
//! - [`error`]: Error types for registry, credential and update operations
//! - [`reference`]: Chart reference normalization and parsing
//! - [`registry`]: Boundary traits for tag listing, content fetch and credentials
//! - [`registries`]: Concrete registry implementations (OCI distribution API)
//! - [`retriever`]: Pulls the archive of one chart version
//! - [`semver`]: Tolerant version parsing

pub mod cache;
pub mod catalog;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod reference;
pub mod registries;
pub mod registry;
pub mod retriever;
pub mod semver;
