//! Derived package status
//!
//! Collapses a raw `PackageDataEntry` into the three orthogonal categories
//! the presentation layer renders: what the package is doing (primary),
//! whether its dependencies are satisfied, and how its health checks look.
//! Pure computation; no I/O.

use std::fmt;

use crate::model::{HealthResult, MainStatusKind, PackageDataEntry, PackageState, Status};

/// The three status categories derived from one package entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageStatus {
    pub primary: PrimaryStatus,
    /// `None` unless the package is installed with dependencies in use
    pub dependency: Option<DependencyStatus>,
    /// `None` unless the package is installed (and, health-wise, running)
    pub health: Option<HealthStatus>,
}

/// What the package is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryStatus {
    // lifecycle states
    Installing,
    Updating,
    Removing,
    // main process states
    Running,
    Stopping,
    Stopped,
    BackingUp,
    Restoring,
}

/// Aggregate dependency satisfaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyStatus {
    Critical,
    Issue,
    Satisfied,
}

/// Aggregate health across configuration and probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    NeedsConfig,
    Failure,
    Starting,
    Loading,
    Healthy,
}

/// Derive the display status categories for one package entry
pub fn derive(entry: &PackageDataEntry) -> PackageStatus {
    let installed = match entry.state {
        PackageState::Installing => {
            return PackageStatus {
                primary: PrimaryStatus::Installing,
                dependency: None,
                health: None,
            }
        }
        PackageState::Updating => {
            return PackageStatus {
                primary: PrimaryStatus::Updating,
                dependency: None,
                health: None,
            }
        }
        PackageState::Removing => {
            return PackageStatus {
                primary: PrimaryStatus::Removing,
                dependency: None,
                health: None,
            }
        }
        PackageState::Installed => entry.installed.as_ref(),
    };

    // An installed entry normally carries its runtime block; a patch burst
    // can leave a gap mid-transition, in which case report Stopped.
    let Some(installed) = installed else {
        return PackageStatus {
            primary: PrimaryStatus::Stopped,
            dependency: None,
            health: None,
        };
    };

    PackageStatus {
        primary: primary_of(installed.status.main.status),
        dependency: dependency_status(entry, &installed.status),
        health: health_status(&installed.status),
    }
}

fn primary_of(kind: MainStatusKind) -> PrimaryStatus {
    match kind {
        MainStatusKind::Running => PrimaryStatus::Running,
        MainStatusKind::Stopping => PrimaryStatus::Stopping,
        MainStatusKind::Stopped => PrimaryStatus::Stopped,
        MainStatusKind::BackingUp => PrimaryStatus::BackingUp,
        MainStatusKind::Restoring => PrimaryStatus::Restoring,
    }
}

fn dependency_status(entry: &PackageDataEntry, status: &Status) -> Option<DependencyStatus> {
    if status.current_dependencies.is_empty() {
        return None;
    }

    // Disjunction over error keys; order-independent.
    let critical = status.dependency_errors.keys().any(|id| {
        entry
            .manifest
            .dependencies
            .get(id)
            .is_some_and(|dep| dep.critical)
    });

    Some(if critical {
        DependencyStatus::Critical
    } else if status.dependency_errors.is_empty() {
        DependencyStatus::Satisfied
    } else {
        DependencyStatus::Issue
    })
}

fn health_status(status: &Status) -> Option<HealthStatus> {
    if !status.configured {
        return Some(HealthStatus::NeedsConfig);
    }

    if status.main.status != MainStatusKind::Running {
        return None;
    }

    let results = || status.main.health.values().map(|check| check.result);
    let aggregate = if results().any(|r| r == HealthResult::Failure) {
        HealthStatus::Failure
    } else if results().any(|r| r == HealthResult::Starting) {
        HealthStatus::Starting
    } else if results().any(|r| r == HealthResult::Loading) {
        HealthStatus::Loading
    } else {
        HealthStatus::Healthy
    };
    Some(aggregate)
}

impl fmt::Display for PrimaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrimaryStatus::Installing => "Installing",
            PrimaryStatus::Updating => "Updating",
            PrimaryStatus::Removing => "Removing",
            PrimaryStatus::Running => "Running",
            PrimaryStatus::Stopping => "Stopping",
            PrimaryStatus::Stopped => "Stopped",
            PrimaryStatus::BackingUp => "Backing Up",
            PrimaryStatus::Restoring => "Restoring",
        };
        f.write_str(s)
    }
}

impl fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DependencyStatus::Critical => "Critical Issue",
            DependencyStatus::Issue => "Issue",
            DependencyStatus::Satisfied => "Satisfied",
        };
        f.write_str(s)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::NeedsConfig => "Needs Config",
            HealthStatus::Failure => "Failure",
            HealthStatus::Starting => "Starting",
            HealthStatus::Loading => "Loading",
            HealthStatus::Healthy => "Healthy",
        };
        f.write_str(s)
    }
}
