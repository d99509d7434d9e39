use crate::aspace::{ApiError, ApiResult, TargetApi};
use crate::sync::config::{REQUEST_TIMEOUT_SECS, TargetCredentials};
use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

const SESSION_HEADER: &str = "X-ArchivesSpace-Session";

/// ArchivesSpace backend client holding one session token for the whole run.
pub struct AspaceClient {
    http: Client,
    base_url: String,
    session: String,
}

fn into_api_result(response: reqwest::Result<Response>) -> ApiResult<Response> {
    let response = response.map_err(|err| ApiError::Transport(err.to_string()))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

fn decode_json(response: Response) -> ApiResult<Value> {
    response
        .json::<Value>()
        .map_err(|err| ApiError::Decode(err.to_string()))
}

impl AspaceClient {
    /// Log in once and keep the session for every later request.
    pub fn connect(creds: &TargetCredentials) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build target HTTP client")?;

        let url = format!("{}/users/{}/login", creds.base_url, creds.username);
        let response = http
            .post(&url)
            .query(&[("password", creds.password.as_str())])
            .send();
        let body = into_api_result(response)
            .and_then(decode_json)
            .with_context(|| format!("login failed for {}", creds.username))?;
        let session = body
            .get("session")
            .and_then(Value::as_str)
            .context("login response missing session token")?
            .to_string();

        tracing::info!(
            base_url = %creds.base_url,
            user = %creds.username,
            "authenticated against target",
        );
        Ok(Self {
            http,
            base_url: creds.base_url.clone(),
            session,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(SESSION_HEADER, &self.session)
    }
}

impl TargetApi for AspaceClient {
    fn list_all_ids(&self, collection: &str) -> ApiResult<Vec<u64>> {
        let request = self
            .authed(self.http.get(self.url(collection)))
            .query(&[("all_ids", "true")]);
        let body = into_api_result(request.send()).and_then(decode_json)?;
        serde_json::from_value::<Vec<u64>>(body)
            .map_err(|err| ApiError::Decode(format!("id listing for {collection}: {err}")))
    }

    fn fetch(&self, uri: &str) -> ApiResult<Value> {
        let request = self.authed(self.http.get(self.url(uri)));
        into_api_result(request.send()).and_then(decode_json)
    }

    fn create(&self, collection: &str, document: &Value) -> ApiResult<Value> {
        let request = self.authed(self.http.post(self.url(collection))).json(document);
        into_api_result(request.send()).and_then(decode_json)
    }

    fn post(&self, uri: &str, document: &Value) -> ApiResult<Value> {
        let request = self.authed(self.http.post(self.url(uri))).json(document);
        into_api_result(request.send()).and_then(decode_json)
    }

    fn delete(&self, uri: &str) -> ApiResult<()> {
        let request = self.authed(self.http.delete(self.url(uri)));
        into_api_result(request.send()).map(|_| ())
    }
}
