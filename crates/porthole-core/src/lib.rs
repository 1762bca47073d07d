//! Porthole Core Library
//!
//! This crate provides the core functionality for Porthole, a client-side
//! mirror of a package server's state tree. The server is the single source
//! of truth; Porthole subscribes to its patch feed and keeps a read-mostly
//! local copy current, so consumers always have data to render even before
//! the live connection establishes.
//!
//! # Architecture
//!
//! - **SnapshotStore**: the in-memory tree plus a monotonic revision
//!   counter; applies patches, serves path-scoped watchers
//! - **Bootstrapper**: persists the snapshot across restarts
//! - **PatchSyncClient**: merges source streams, feeds the store, tracks
//!   connection status
//! - **status**: pure derivation of display statuses from package entries
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let source = Arc::new(WebSocketSource::new(url));
//! let mut client = PatchSyncClient::init(vec![source], Bootstrapper::new(&config));
//! client.start();
//!
//! let mut pkgs = client.watch("/package-data".parse()?);
//! while let Some(value) = pkgs.next().await { /* render */ }
//! ```
//!
//! # Modules
//!
//! - `config`: application configuration
//! - `model`: typed views of the mirrored tree
//! - `patch`: patch batch wire types
//! - `path`: tree paths
//! - `status`: derived package status
//! - `store`: the snapshot store and its persistence
//! - `sync`: the sync client and patch sources

pub mod config;
pub mod model;
pub mod patch;
pub mod path;
pub mod status;
pub mod store;
pub mod sync;

pub use config::Config;
pub use patch::{PatchBatch, PatchOp, Revision};
pub use path::{TreePath, TreePathError};
pub use status::{derive, DependencyStatus, HealthStatus, PackageStatus, PrimaryStatus};
pub use store::{Bootstrapper, Snapshot, SnapshotStore, StoreError, StoreWatcher};
pub use sync::{ConnectionStatus, PatchSyncClient, Source, SourceError, WebSocketSource};
