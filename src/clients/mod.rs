//! REST clients for the services the steps talk to besides the databases.

pub mod elastic;
pub mod hopsworks;
pub mod kibana;
pub mod kube;

pub use elastic::ElasticClient;
pub use hopsworks::HopsworksClient;
pub use kibana::KibanaClient;
pub use kube::KubeClient;

use anyhow::{Context, Result};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Base builder shared by every client.
///
/// The cluster services ship self-signed certificates, so verification is opt-in.
pub(crate) fn http_builder(verify_certificates: bool) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .danger_accept_invalid_certs(!verify_certificates)
}

pub(crate) fn build_http(verify_certificates: bool) -> Result<reqwest::Client> {
    http_builder(verify_certificates)
        .build()
        .context("build http client")
}

/// Turns a non-success response into an error carrying its body.
pub(crate) async fn ensure_success(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("{what} failed with status {status}: {body}")
}

pub(crate) fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
