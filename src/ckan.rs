use std::thread;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::{PackageId, Resource, ResourceId};
use crate::error::LedgerError;

pub trait CkanClient {
    fn package_show(&self, package: &PackageId) -> Result<Vec<Resource>, LedgerError>;
    fn datastore_dump(&self, resource: &ResourceId) -> Result<String, LedgerError>;
}

impl<T: CkanClient + ?Sized> CkanClient for &T {
    fn package_show(&self, package: &PackageId) -> Result<Vec<Resource>, LedgerError> {
        (**self).package_show(package)
    }

    fn datastore_dump(&self, resource: &ResourceId) -> Result<String, LedgerError> {
        (**self).datastore_dump(resource)
    }
}

#[derive(Debug, Deserialize)]
struct ActionResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<PackageResult>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PackageResult {
    #[serde(default)]
    resources: Vec<Resource>,
}

#[derive(Clone)]
pub struct CkanHttpClient {
    client: Client,
    base_url: Url,
    max_retries: usize,
}

impl CkanHttpClient {
    pub fn new(base_url: Url, timeout: Duration, max_retries: usize) -> Result<Self, LedgerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("shelter-ledger/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| LedgerError::CkanHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| LedgerError::CkanHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url,
            max_retries,
        })
    }

    pub fn package_show_url(&self) -> Result<Url, LedgerError> {
        self.endpoint("api/3/action/package_show")
    }

    pub fn dump_url(&self, resource: &ResourceId) -> Result<Url, LedgerError> {
        self.endpoint(&format!("datastore/dump/{}", resource.as_str()))
    }

    fn endpoint(&self, path: &str) -> Result<Url, LedgerError> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(path)
            .map_err(|err| LedgerError::InvalidBaseUrl(format!("{}: {err}", self.base_url)))
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, LedgerError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .ok()
            .and_then(|body| api_error_message(&body))
            .unwrap_or_else(|| "CKAN request failed".to_string());
        Err(LedgerError::CkanStatus { status, message })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, LedgerError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && is_retryable_status(status) {
                        debug!(status, attempt, "retrying CKAN request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        debug!(error = %err, attempt, "retrying CKAN request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(LedgerError::CkanHttp(err.to_string()));
                }
            }
        }
    }
}

impl CkanClient for CkanHttpClient {
    fn package_show(&self, package: &PackageId) -> Result<Vec<Resource>, LedgerError> {
        let mut url = self.package_show_url()?;
        url.query_pairs_mut().append_pair("id", package.as_str());
        let response = self.send_with_retries(|| self.client.get(url.clone()))?;
        let response = Self::handle_status(response)?;
        let body = response
            .text()
            .map_err(|err| LedgerError::CkanHttp(err.to_string()))?;
        parse_package_show(&body)
    }

    fn datastore_dump(&self, resource: &ResourceId) -> Result<String, LedgerError> {
        let url = self.dump_url(resource)?;
        let response = self.send_with_retries(|| self.client.get(url.clone()))?;
        let response = Self::handle_status(response)?;
        response
            .text()
            .map_err(|err| LedgerError::CkanHttp(err.to_string()))
    }
}

/// Decodes a `package_show` action body into its resource list.
pub fn parse_package_show(body: &str) -> Result<Vec<Resource>, LedgerError> {
    let response: ActionResponse = serde_json::from_str(body)
        .map_err(|err| LedgerError::CkanApi(format!("malformed package_show response: {err}")))?;
    if !response.success {
        let message = response
            .error
            .as_ref()
            .and_then(error_message)
            .unwrap_or_else(|| "package_show reported failure".to_string());
        return Err(LedgerError::CkanApi(message));
    }
    let result = response
        .result
        .ok_or_else(|| LedgerError::CkanApi("package_show returned no result".to_string()))?;
    Ok(result.resources)
}

fn api_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("error").and_then(error_message)
}

fn error_message(error: &Value) -> Option<String> {
    let message = error.get("message").and_then(|value| value.as_str());
    let kind = error.get("__type").and_then(|value| value.as_str());
    match (kind, message) {
        (Some(kind), Some(message)) => Some(format!("{kind}: {message}")),
        (None, Some(message)) => Some(message.to_string()),
        (Some(kind), None) => Some(kind.to_string()),
        (None, None) => None,
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}
