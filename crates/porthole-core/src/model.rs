//! Data model for the mirrored state tree
//!
//! The store itself holds a dynamic JSON tree; these types are the typed
//! views the rest of the crate decodes subtrees into. Field names follow the
//! server's kebab-case wire shape, so any subtree read from the store
//! deserializes directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::path::TreePath;

/// Package identifier, as keyed under `package-data`
pub type PackageId = String;

/// Health check identifier, as keyed under `main.health`
pub type HealthCheckId = String;

/// Path to the `package-data` map
pub fn package_data_path() -> TreePath {
    TreePath::new(["package-data"])
}

/// Path to a single package's entry
pub fn package_path(id: &str) -> TreePath {
    package_data_path().join(id)
}

/// Path to the server's display preferences
pub fn ui_path() -> TreePath {
    TreePath::new(["ui"])
}

/// Typed view of the tree root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DataModel {
    #[serde(default)]
    pub server_info: ServerInfo,
    #[serde(default)]
    pub ui: UiPrefs,
    #[serde(default)]
    pub package_data: BTreeMap<PackageId, PackageDataEntry>,
}

/// Server identity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub version: String,
}

/// Local display preferences mirrored from the server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UiPrefs {
    /// User-facing device name
    #[serde(default)]
    pub name: Option<String>,
}

/// One package's entry under `package-data`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageDataEntry {
    pub state: PackageState,
    #[serde(default)]
    pub manifest: Manifest,
    /// Present if and only if `state` is `Installed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed: Option<InstalledInfo>,
}

/// Install lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageState {
    Installing,
    Updating,
    Removing,
    Installed,
}

/// Static package metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Manifest {
    #[serde(default)]
    pub id: PackageId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub dependencies: BTreeMap<PackageId, DependencyRequirement>,
}

/// A declared dependency in the manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DependencyRequirement {
    /// An unmet critical dependency forces the dependent's status to Critical
    #[serde(default)]
    pub critical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Runtime data present only while a package is installed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstalledInfo {
    #[serde(default)]
    pub status: Status,
}

/// Live status block of an installed package
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Status {
    /// Whether required configuration has been supplied
    #[serde(default)]
    pub configured: bool,
    #[serde(default)]
    pub main: MainStatus,
    /// Dependencies currently in use; may be empty
    #[serde(default)]
    pub current_dependencies: BTreeMap<PackageId, CurrentDependencyInfo>,
    /// Present only for dependencies currently unsatisfied
    #[serde(default)]
    pub dependency_errors: BTreeMap<PackageId, DependencyError>,
}

/// Main process status plus health probe results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MainStatus {
    #[serde(default)]
    pub status: MainStatusKind,
    /// Only meaningful while `status` is `Running`
    #[serde(default)]
    pub health: BTreeMap<HealthCheckId, HealthCheckResult>,
}

/// Main process state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MainStatusKind {
    Running,
    Stopping,
    #[default]
    Stopped,
    BackingUp,
    Restoring,
}

/// Result of a single named health probe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HealthCheckResult {
    #[serde(default)]
    pub result: HealthResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Health probe outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthResult {
    Success,
    Failure,
    #[default]
    Starting,
    Loading,
}

/// Metadata for a dependency currently in use
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CurrentDependencyInfo {
    /// Health checks on the dependency this package relies on
    #[serde(default)]
    pub health_checks: Vec<HealthCheckId>,
}

/// Why a dependency is currently unsatisfied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DependencyError {
    NotInstalled,
    NotRunning,
    IncorrectVersion { expected: String },
    ConfigUnsatisfied { error: String },
    HealthChecksFailed { check: HealthCheckId },
}
