use super::{build_http, trim_base};
use crate::config::{ConfigError, KibanaConfig};
use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde_json::json;
use tracing::{debug, info};

/// What a saved-object call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedObjectOutcome {
    Done,
    /// Create found it existing, or delete found it gone.
    Unchanged,
}

/// Saved-object client. Calls carry a project token when the caller has one;
/// an unsecured Kibana is called without.
pub struct KibanaClient {
    http: reqwest::Client,
    base: String,
}

impl KibanaClient {
    pub fn new(cfg: &KibanaConfig, verify_certificates: bool) -> Result<Self> {
        if cfg.uri.trim().is_empty() {
            return Err(ConfigError::Missing("kibana.uri").into());
        }
        Ok(Self {
            http: build_http(verify_certificates)?,
            base: trim_base(&cfg.uri),
        })
    }

    fn pattern_url(&self, title: &str) -> String {
        format!("{}/api/saved_objects/index-pattern/{title}", self.base)
    }

    fn saved_object(
        &self,
        method: reqwest::Method,
        title: &str,
        token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let req = self
            .http
            .request(method, self.pattern_url(title))
            .header("kbn-xsrf", "required");
        match token {
            Some(token) => req.header(AUTHORIZATION, format!("Bearer {token}")),
            None => req,
        }
    }

    pub async fn create_index_pattern(
        &self,
        token: Option<&str>,
        title: &str,
    ) -> Result<SavedObjectOutcome> {
        let resp = self
            .saved_object(reqwest::Method::POST, title, token)
            .json(&json!({"attributes": {"title": title}}))
            .send()
            .await
            .with_context(|| format!("create index pattern {title}"))?;
        match resp.status() {
            s if s.is_success() => {
                info!(title, "created index pattern");
                Ok(SavedObjectOutcome::Done)
            }
            StatusCode::CONFLICT => {
                debug!(title, "index pattern already exists");
                Ok(SavedObjectOutcome::Unchanged)
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                bail!("create index pattern {title} failed with status {status}: {body}")
            }
        }
    }

    pub async fn delete_index_pattern(
        &self,
        token: Option<&str>,
        title: &str,
    ) -> Result<SavedObjectOutcome> {
        let resp = self
            .saved_object(reqwest::Method::DELETE, title, token)
            .send()
            .await
            .with_context(|| format!("delete index pattern {title}"))?;
        match resp.status() {
            s if s.is_success() => {
                info!(title, "deleted index pattern");
                Ok(SavedObjectOutcome::Done)
            }
            StatusCode::NOT_FOUND => {
                debug!(title, "index pattern already gone");
                Ok(SavedObjectOutcome::Unchanged)
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                bail!("delete index pattern {title} failed with status {status}: {body}")
            }
        }
    }
}
