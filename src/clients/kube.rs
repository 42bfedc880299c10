use super::{http_builder, trim_base};
use crate::config::KubeConfig;
use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use serde_json::json;
use std::fs;
use tracing::{debug, info};

/// Result of an idempotent namespace call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceOutcome {
    Created,
    Deleted,
    AlreadyExists,
    NotFound,
}

/// Minimal API server client for namespace administration.
pub struct KubeClient {
    http: reqwest::Client,
    master: String,
    token: Option<String>,
}

impl KubeClient {
    /// Builds a client from the configured credentials.
    ///
    /// Server certificates are verified only when a CA bundle is configured.
    /// A client certificate needs both `cert_file` and `key_file`.
    pub fn new(cfg: &KubeConfig) -> Result<Self> {
        let mut builder = http_builder(cfg.ca_path.is_some());
        if let Some(ca) = &cfg.ca_path {
            let pem = fs::read(ca).with_context(|| format!("read {}", ca.display()))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .with_context(|| format!("parse CA certificate {}", ca.display()))?;
            builder = builder.add_root_certificate(cert);
        }
        match (&cfg.cert_file, &cfg.key_file) {
            (Some(cert), Some(key)) => {
                let mut pem = fs::read(cert).with_context(|| format!("read {}", cert.display()))?;
                pem.push(b'\n');
                pem.extend(fs::read(key).with_context(|| format!("read {}", key.display()))?);
                let identity =
                    reqwest::Identity::from_pem(&pem).context("parse kube client identity")?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => bail!("kube.cert_file and kube.key_file must be set together"),
        }
        let http = builder.build().context("build kube http client")?;
        Ok(Self {
            http,
            master: trim_base(&cfg.master_url),
            token: cfg.token.clone().filter(|t| !t.trim().is_empty()),
        })
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    pub async fn create_namespace(&self, name: &str) -> Result<NamespaceOutcome> {
        let url = format!("{}/api/v1/namespaces", self.master);
        let body = json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": name},
        });
        let resp = self
            .authorized(self.http.post(&url).json(&body))
            .send()
            .await
            .with_context(|| format!("create namespace {name}"))?;
        match resp.status() {
            s if s.is_success() => {
                info!(namespace = name, "created namespace");
                Ok(NamespaceOutcome::Created)
            }
            StatusCode::CONFLICT => {
                debug!(namespace = name, "namespace already exists");
                Ok(NamespaceOutcome::AlreadyExists)
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                bail!("create namespace {name} failed with status {status}: {body}")
            }
        }
    }

    pub async fn delete_namespace(&self, name: &str) -> Result<NamespaceOutcome> {
        let url = format!("{}/api/v1/namespaces/{name}", self.master);
        let resp = self
            .authorized(self.http.delete(&url))
            .send()
            .await
            .with_context(|| format!("delete namespace {name}"))?;
        match resp.status() {
            s if s.is_success() => {
                info!(namespace = name, "deleted namespace");
                Ok(NamespaceOutcome::Deleted)
            }
            StatusCode::NOT_FOUND => {
                debug!(namespace = name, "namespace already gone");
                Ok(NamespaceOutcome::NotFound)
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                bail!("delete namespace {name} failed with status {status}: {body}")
            }
        }
    }
}
