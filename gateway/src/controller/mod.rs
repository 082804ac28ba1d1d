//! Workload controller: the backend-agnostic boundary for acting on cluster resources on behalf of
//! a tenant.
//!
//! Exactly one backend is built at startup by [`from_config`] and shared as
//! `Arc<dyn WorkloadController>`. Callers only ever see [`ControllerError`], never a backend's own
//! error type.

pub mod kube;

use alloc::sync::Arc;
use core::{fmt, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error as ThisError;

use crate::{app::repository::WorkspaceId, config::ControllerConfig};

/// Identifier of the tenant a workload belongs to. Derived from the owning workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantId(String);

impl TenantId {
    #[must_use]
    pub fn for_workspace(id: WorkspaceId) -> Self {
        Self(format!("ws-{id}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl WorkloadPhase {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            None | Some("Pending") => Self::Pending,
            Some("Running") => Self::Running,
            Some("Succeeded") => Self::Succeeded,
            Some("Failed") => Self::Failed,
            Some(_) => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumePhase {
    Pending,
    Bound,
    Lost,
    Unknown,
}

impl VolumePhase {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            None | Some("Pending") => Self::Pending,
            Some("Bound") => Self::Bound,
            Some("Lost") => Self::Lost,
            Some(_) => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadStatus {
    pub name: String,
    pub phase: WorkloadPhase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeStatus {
    pub name: String,
    pub phase: VolumePhase,
}

/// Backend-neutral failure of a controller operation.
#[derive(Debug, ThisError)]
pub enum ControllerError {
    #[error("workload backend unavailable: {0}")]
    Unavailable(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("workload backend denied access: {0}")]
    PermissionDenied(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("unexpected response from workload backend: {0}")]
    InvalidResponse(String),
    #[error("workload backend error: {0}")]
    Internal(String),
}

#[async_trait]
pub trait WorkloadController: Send + Sync {
    /// Short name of the backend, used in logs and health output.
    fn backend(&self) -> &'static str;

    /// Check that the backend is reachable and accepts our credentials.
    async fn ping(&self) -> Result<(), ControllerError>;

    async fn workload_status(&self, tenant: &TenantId) -> Result<WorkloadStatus, ControllerError>;

    async fn volume_status(&self, tenant: &TenantId) -> Result<VolumeStatus, ControllerError>;

    async fn create_workload(&self, tenant: &TenantId) -> Result<WorkloadStatus, ControllerError>;

    async fn create_volume(&self, tenant: &TenantId) -> Result<VolumeStatus, ControllerError>;
}

pub type SharedController = Arc<dyn WorkloadController>;

/// Build the configured backend and verify it can reach its control plane.
///
/// # Errors
///
/// Returns an error if the credentials are malformed or the backend does not answer its startup
/// probe.
#[tracing::instrument(skip_all)]
pub async fn from_config(
    config: &ControllerConfig,
    timeout: Duration,
) -> eyre::Result<SharedController> {
    match *config {
        ControllerConfig::Kubernetes(ref kube_cfg) => {
            let controller = kube::KubeController::connect(kube_cfg, timeout).await?;
            Ok(Arc::new(controller))
        }
    }
}
