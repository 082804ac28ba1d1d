//! Cluster API backend.
//!
//! Talks to the API server's REST interface directly: pods are workloads, persistent volume claims
//! are storage volumes. Everything lives in one namespace and is named after the tenant.

use alloc::sync::Arc;
use core::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use eyre::WrapErr as _;
use reqwest::{Certificate, StatusCode};
use secrecy::{ExposeSecret as _, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::{
    config::KubeConfig,
    controller::{
        ControllerError, TenantId, VolumePhase, VolumeStatus, WorkloadController, WorkloadPhase,
        WorkloadStatus,
    },
};

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const TENANT_LABEL: &str = "kubeweb/tenant";
const MANAGER: &str = "kubeweb";
const WORKSPACE_MOUNT: &str = "/home/coder";

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PhaseStatus {
    phase: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Object {
    metadata: ObjectMeta,
    #[serde(default)]
    status: PhaseStatus,
}

/// Map an unsuccessful status from the API server to the generic taxonomy.
fn classify(status: StatusCode, what: &str) -> ControllerError {
    match status {
        StatusCode::NOT_FOUND => ControllerError::NotFound(what.to_owned()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ControllerError::PermissionDenied(format!("{what}: {status}"))
        }
        StatusCode::CONFLICT => ControllerError::AlreadyExists(what.to_owned()),
        s if s.is_server_error() => ControllerError::Unavailable(format!("{what}: {s}")),
        s => ControllerError::Internal(format!("{what}: {s}")),
    }
}

fn transport(err: &reqwest::Error) -> ControllerError {
    if err.is_timeout() || err.is_connect() {
        ControllerError::Unavailable(err.to_string())
    } else if err.is_decode() {
        ControllerError::InvalidResponse(err.to_string())
    } else {
        ControllerError::Internal(err.to_string())
    }
}

#[derive(Debug)]
pub struct KubeController {
    http: reqwest::Client,
    base_url: String,
    token: Arc<SecretString>,
    namespace: String,
    image: String,
    volume_size: String,
}

impl KubeController {
    /// Build a client trusting only the configured CA, then probe `/version`.
    ///
    /// # Errors
    ///
    /// Returns an error if the CA data is not base64 PEM, the HTTP client cannot be built, or the
    /// API server does not answer the probe.
    pub async fn connect(cfg: &KubeConfig, timeout: Duration) -> eyre::Result<Self> {
        let pem = STANDARD
            .decode(cfg.ca_cert.trim())
            .wrap_err("KUBE_CERT is not valid base64")?;
        let ca = Certificate::from_pem(&pem).wrap_err("KUBE_CERT is not a PEM certificate")?;

        let http = reqwest::Client::builder()
            .add_root_certificate(ca)
            .timeout(timeout)
            .build()
            .wrap_err("failed to build cluster API client")?;

        let controller = Self::with_client(http, cfg.base_url(), cfg);
        controller
            .ping()
            .await
            .wrap_err_with(|| format!("cluster API at {} is not reachable", controller.base_url))?;
        info!(base_url = %controller.base_url, namespace = %controller.namespace, "Cluster API reachable");
        Ok(controller)
    }

    pub(crate) fn with_client(http: reqwest::Client, base_url: String, cfg: &KubeConfig) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: Arc::clone(&cfg.token),
            namespace: cfg.namespace.clone(),
            image: cfg.workspace_image.clone(),
            volume_size: cfg.volume_size.clone(),
        }
    }

    fn collection_url(&self, kind: &str) -> String {
        format!(
            "{}/api/v1/namespaces/{}/{kind}",
            self.base_url, self.namespace
        )
    }

    fn object_url(&self, kind: &str, name: &str) -> String {
        format!("{}/{name}", self.collection_url(kind))
    }

    fn volume_name(tenant: &TenantId) -> String {
        format!("{tenant}-data")
    }

    async fn get_object(&self, kind: &str, name: &str) -> Result<Object, ControllerError> {
        let resp = self
            .http
            .get(self.object_url(kind, name))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| transport(&e))?;
        if !resp.status().is_success() {
            return Err(classify(resp.status(), name));
        }
        resp.json::<Object>().await.map_err(|e| transport(&e))
    }

    async fn post_object(
        &self,
        kind: &str,
        name: &str,
        body: serde_json::Value,
    ) -> Result<Object, ControllerError> {
        let resp = self
            .http
            .post(self.collection_url(kind))
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport(&e))?;
        if !resp.status().is_success() {
            return Err(classify(resp.status(), name));
        }
        resp.json::<Object>().await.map_err(|e| transport(&e))
    }
}

#[async_trait]
impl WorkloadController for KubeController {
    fn backend(&self) -> &'static str {
        "kubernetes"
    }

    async fn ping(&self) -> Result<(), ControllerError> {
        let resp = self
            .http
            .get(format!("{}/version", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| transport(&e))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(classify(resp.status(), "version"))
        }
    }

    async fn workload_status(&self, tenant: &TenantId) -> Result<WorkloadStatus, ControllerError> {
        let pod = self.get_object("pods", tenant.as_str()).await?;
        Ok(WorkloadStatus {
            phase: WorkloadPhase::parse(pod.status.phase.as_deref()),
            name: pod.metadata.name,
        })
    }

    async fn volume_status(&self, tenant: &TenantId) -> Result<VolumeStatus, ControllerError> {
        let pvc = self
            .get_object("persistentvolumeclaims", &Self::volume_name(tenant))
            .await?;
        Ok(VolumeStatus {
            phase: VolumePhase::parse(pvc.status.phase.as_deref()),
            name: pvc.metadata.name,
        })
    }

    #[tracing::instrument(skip(self), fields(backend = "kubernetes"))]
    async fn create_workload(&self, tenant: &TenantId) -> Result<WorkloadStatus, ControllerError> {
        let body = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": tenant.as_str(),
                "labels": { MANAGED_BY_LABEL: MANAGER, TENANT_LABEL: tenant.as_str() },
            },
            "spec": {
                "containers": [{
                    "name": "workspace",
                    "image": self.image,
                    "volumeMounts": [{ "name": "data", "mountPath": WORKSPACE_MOUNT }],
                }],
                "volumes": [{
                    "name": "data",
                    "persistentVolumeClaim": { "claimName": Self::volume_name(tenant) },
                }],
            },
        });
        let pod = self.post_object("pods", tenant.as_str(), body).await?;
        debug!(name = %pod.metadata.name, "workload created");
        Ok(WorkloadStatus {
            phase: WorkloadPhase::parse(pod.status.phase.as_deref()),
            name: pod.metadata.name,
        })
    }

    #[tracing::instrument(skip(self), fields(backend = "kubernetes"))]
    async fn create_volume(&self, tenant: &TenantId) -> Result<VolumeStatus, ControllerError> {
        let name = Self::volume_name(tenant);
        let body = json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "metadata": {
                "name": name,
                "labels": { MANAGED_BY_LABEL: MANAGER, TENANT_LABEL: tenant.as_str() },
            },
            "spec": {
                "accessModes": ["ReadWriteOnce"],
                "resources": { "requests": { "storage": self.volume_size } },
            },
        });
        let pvc = self
            .post_object("persistentvolumeclaims", &name, body)
            .await?;
        debug!(name = %pvc.metadata.name, "volume created");
        Ok(VolumeStatus {
            phase: VolumePhase::parse(pvc.status.phase.as_deref()),
            name: pvc.metadata.name,
        })
    }
}
