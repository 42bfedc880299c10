use super::{build_http, ensure_success, trim_base};
use crate::config::{ConfigError, ElasticConfig};
use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

/// Basic-auth client for the handful of index administration calls the steps need.
pub struct ElasticClient {
    http: reqwest::Client,
    base: String,
    user: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    hits: CountHits,
}

#[derive(Debug, Deserialize)]
struct CountHits {
    total: CountTotal,
}

#[derive(Debug, Deserialize)]
struct CountTotal {
    value: u64,
}

fn error_reason(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    v.get("error")?.get("reason")?.as_str().map(str::to_string)
}

impl ElasticClient {
    pub fn new(cfg: &ElasticConfig) -> Result<Self> {
        if cfg.uri.trim().is_empty() {
            return Err(ConfigError::Missing("elastic.uri").into());
        }
        if cfg.user.trim().is_empty() {
            return Err(ConfigError::Missing("elastic.user").into());
        }
        let password = cfg
            .password
            .clone()
            .ok_or(ConfigError::Missing("elastic.password"))?;
        Ok(Self {
            http: build_http(cfg.verify_certificates)?,
            base: trim_base(&cfg.uri),
            user: cfg.user.clone(),
            password,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .basic_auth(&self.user, Some(&self.password))
    }

    /// Copies every document of `from` into `to`.
    pub async fn reindex(&self, from: &str, to: &str) -> Result<()> {
        info!(from, to, "reindexing");
        let body = json!({"source": {"index": from}, "dest": {"index": to}});
        let resp = self
            .request(reqwest::Method::POST, "_reindex")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("reindex {from} to {to}"))?;
        let status = resp.status();
        if status.is_success() {
            info!(from, to, "reindexed");
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        match error_reason(&body) {
            Some(reason) if reason.starts_with("no such index") => {
                bail!("could not reindex {from} to {to}: indices do not exist")
            }
            Some(reason) => bail!("could not reindex {from} to {to}: {reason}"),
            None => bail!("could not reindex {from} to {to}: status {status}: {body}"),
        }
    }

    pub async fn index_exists(&self, index: &str) -> Result<bool> {
        let resp = self
            .request(reqwest::Method::HEAD, index)
            .send()
            .await
            .with_context(|| format!("check index {index}"))?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => bail!("could not check existence of index {index}: status {status}"),
        }
    }

    pub async fn item_count(&self, index: &str) -> Result<u64> {
        let resp = self
            .request(reqwest::Method::GET, &format!("{index}/_search"))
            .query(&[("size", "0")])
            .send()
            .await
            .with_context(|| format!("count items of {index}"))?;
        let resp = ensure_success(resp, &format!("count items of {index}")).await?;
        let parsed: CountResponse = resp
            .json()
            .await
            .with_context(|| format!("parse count response of {index}"))?;
        info!(index, count = parsed.hits.total.value, "item count");
        Ok(parsed.hits.total.value)
    }
}
