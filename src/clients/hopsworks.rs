use super::{build_http, ensure_success, trim_base};
use crate::config::{ConfigError, HopsworksConfig};
use anyhow::{Context, Result};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;

/// Platform REST API, authenticated with the service JWT.
pub struct HopsworksClient {
    http: reqwest::Client,
    base: String,
    service_jwt: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

impl HopsworksClient {
    pub fn new(cfg: &HopsworksConfig, verify_certificates: bool) -> Result<Self> {
        if cfg.url.trim().is_empty() {
            return Err(ConfigError::Missing("hopsworks.url").into());
        }
        let service_jwt = cfg
            .service_jwt
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("hopsworks.service_jwt"))?;
        Ok(Self {
            http: build_http(verify_certificates)?,
            base: trim_base(&cfg.url),
            service_jwt,
        })
    }

    /// Fetches the project scoped token used against Elasticsearch and Kibana.
    ///
    /// # Returns
    /// * `Result<String>` - The bare token, without the `Bearer` prefix.
    pub async fn elk_token(&self, project_id: i32) -> Result<String> {
        let url = format!("{}/hopsworks-api/api/jwt/elk/token/{project_id}", self.base);
        let resp = self
            .http
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.service_jwt))
            .send()
            .await
            .with_context(|| format!("request elk token for project {project_id}"))?;
        let resp = ensure_success(resp, &format!("elk token for project {project_id}")).await?;
        let parsed: TokenResponse = resp
            .json()
            .await
            .with_context(|| format!("parse elk token for project {project_id}"))?;
        Ok(parsed.token)
    }
}
