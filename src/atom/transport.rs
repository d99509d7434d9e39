use crate::sync::config::REQUEST_TIMEOUT_SECS;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;

const API_KEY_HEADER: &str = "REST-API-KEY";

pub trait SourceTransport {
    fn get_json(&self, url: &str) -> Result<Value>;
}

/// Authenticated HTTP access to the source catalogue API.
pub struct HttpTransport {
    http: Client,
    api_key: String,
}

impl HttpTransport {
    pub fn new(api_key: &str, cert_path: Option<&Path>) -> Result<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS));
        if let Some(path) = cert_path {
            let pem = fs::read(path)
                .with_context(|| format!("failed to read source certificate {}", path.display()))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .with_context(|| format!("invalid PEM certificate {}", path.display()))?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder.build().context("failed to build source HTTP client")?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
        })
    }
}

impl SourceTransport for HttpTransport {
    fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .with_context(|| format!("GET {url}"))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {url} returned status {status}");
        }
        response
            .json::<Value>()
            .with_context(|| format!("GET {url} returned invalid JSON"))
    }
}
