use std::error::Error as _;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::error::RemoteApiError;
use crate::forward::models::{extract_collection, NqeQueryResponse, SnapshotRecord};

/// Page size for NQE bulk queries.
pub const NQE_PAGE_SIZE: u64 = 1000;

/// Hard stop for the pagination loop. Forward reports `totalNumItems` per
/// query and some deployments under-count it, which would otherwise keep
/// the offset loop running forever.
pub const MAX_NQE_PAGES: u64 = 10_000;

/// Thin wrapper around the Forward Networks REST API.
pub struct ForwardClient {
    http: Client,
    base_url: String,
    network_id: Option<String>,
}

impl ForwardClient {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

    /// Build a client for one Forward source.
    ///
    /// # Errors
    ///
    /// Returns `RemoteApiError` when the base URL is empty or the HTTP
    /// client cannot be constructed.
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        verify_tls: bool,
        timeout: Option<Duration>,
        network_id: Option<String>,
    ) -> Result<Self, RemoteApiError> {
        if base_url.is_empty() {
            return Err(RemoteApiError::new(
                "Forward Networks base URL is not configured.",
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| RemoteApiError::new("API token contains invalid characters."))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(timeout.unwrap_or(Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS)))
            .default_headers(headers)
            .user_agent(concat!("forward-db/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteApiError::new(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            network_id,
        })
    }

    /// List all snapshots known to the Forward instance.
    ///
    /// # Errors
    ///
    /// Returns `RemoteApiError` if the request fails or returns an error
    /// status.
    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotRecord>, RemoteApiError> {
        let url = match &self.network_id {
            Some(network) => format!("{}/api/v1/networks/{network}/snapshots", self.base_url),
            None => format!("{}/api/v1/snapshots", self.base_url),
        };
        let payload = self.get_json(&url).await?;

        let mut records = Vec::new();
        for item in extract_collection(payload) {
            match serde_json::from_value::<SnapshotRecord>(item) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unparseable snapshot record");
                }
            }
        }
        Ok(records)
    }

    /// Fetch a single snapshot by id.
    ///
    /// # Errors
    ///
    /// Returns `RemoteApiError` if the request fails or the payload cannot
    /// be parsed.
    pub async fn get_snapshot(&self, snapshot_id: &str) -> Result<SnapshotRecord, RemoteApiError> {
        let url = format!("{}/api/v1/snapshots/{snapshot_id}", self.base_url);
        let mut payload = self.get_json(&url).await?;

        // Some deployments wrap the record in a `data` envelope.
        if let Value::Object(ref mut map) = payload
            && let Some(inner) = map.remove("data")
        {
            payload = inner;
        }
        serde_json::from_value(payload)
            .map_err(|e| RemoteApiError::new(format!("Failed to parse snapshot payload: {e}")))
    }

    /// Execute one page of an NQE query, returning the batch and the
    /// server-reported total record count.
    ///
    /// # Errors
    ///
    /// Returns `RemoteApiError` if the request fails, returns an error
    /// status, or the payload is not a record list.
    pub async fn run_nqe_query(
        &self,
        query_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Value>, u64), RemoteApiError> {
        let url = format!("{}/api/nqe", self.base_url);
        let body = json!({
            "queryId": query_id,
            "queryOptions": {
                "offset": offset,
                "limit": limit,
            },
        });

        let mut request = self.http.post(&url).json(&body);
        if let Some(network) = &self.network_id {
            request = request.query(&[("networkId", network)]);
        }

        let response = request.send().await.map_err(request_error)?;
        let response = check_status(response).await?;
        let parsed: NqeQueryResponse = response
            .json()
            .await
            .map_err(|e| RemoteApiError::new(format!("Failed to parse NQE response: {e}")))?;

        let Some(items) = parsed.items else {
            return Err(RemoteApiError::new(
                "Unexpected NQE response format: query results are not a list.",
            ));
        };
        let total = parsed.total_num_items.unwrap_or(items.len() as u64);
        Ok((items, total))
    }

    /// Pull every record of an NQE query by paging with an increasing
    /// offset. Stops on an empty page, when the accumulated count reaches
    /// the reported total, or at `MAX_NQE_PAGES`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteApiError` on any failed page request.
    pub async fn collect_nqe_records(
        &self,
        query_id: &str,
        page_size: u64,
    ) -> Result<Vec<Value>, RemoteApiError> {
        let mut records: Vec<Value> = Vec::new();
        let mut offset = 0u64;
        let mut pages = 0u64;

        loop {
            let (batch, total) = self.run_nqe_query(query_id, offset, page_size).await?;
            if batch.is_empty() {
                break;
            }
            offset += batch.len() as u64;
            records.extend(batch);
            if offset >= total {
                break;
            }
            pages += 1;
            if pages >= MAX_NQE_PAGES {
                tracing::warn!(
                    query_id,
                    total,
                    collected = records.len(),
                    "NQE pagination hit the page safety bound before reaching the reported total"
                );
                break;
            }
        }
        Ok(records)
    }

    /// Request a site topology diagram for a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `RemoteApiError` if the request fails or the payload is not
    /// an object.
    pub async fn get_site_topology(
        &self,
        site: &str,
        snapshot_id: &str,
        settings: Option<Value>,
    ) -> Result<Value, RemoteApiError> {
        let url = format!("{}/api/v1/diagram/site", self.base_url);
        let mut body = json!({
            "site": site,
            "snapshot": snapshot_id,
            "settings": settings.unwrap_or_else(|| json!({})),
        });
        if let Some(network) = &self.network_id {
            body["network"] = json!(network);
        }

        let response = self.http.post(&url).json(&body).send().await.map_err(request_error)?;
        let response = check_status(response).await?;
        let payload: Value = response
            .json()
            .await
            .map_err(|e| RemoteApiError::new(format!("Failed to parse topology payload: {e}")))?;
        if !payload.is_object() {
            return Err(RemoteApiError::new(
                "Unexpected response payload when requesting topology diagram.",
            ));
        }
        Ok(payload)
    }

    async fn get_json(&self, url: &str) -> Result<Value, RemoteApiError> {
        let mut request = self.http.get(url);
        if let Some(network) = &self.network_id {
            request = request.query(&[("network", network)]);
        }
        let response = request.send().await.map_err(request_error)?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteApiError::new(format!("Failed to parse response: {e}")))
    }
}

/// Translate a non-2xx response into a typed error. 401 gets a dedicated
/// message since it is the most common operator mistake.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteApiError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(RemoteApiError::with_status(
            "Authentication failed, check API token.",
            status.as_u16(),
        ));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RemoteApiError::with_status(
            format!("HTTP {status}: {body}"),
            status.as_u16(),
        ));
    }
    Ok(response)
}

/// Translate a transport-level failure, surfacing a hint when the cause is
/// an untrusted certificate chain.
fn request_error(err: reqwest::Error) -> RemoteApiError {
    if err.is_connect() || err.is_request() {
        let mut source = err.source();
        while let Some(cause) = source {
            let text = cause.to_string();
            if text.contains("certificate") || text.contains("UnknownIssuer") {
                return RemoteApiError::new(
                    "TLS certificate verification failed; self-signed certificate? \
                     Disable TLS verification for this source or install the CA.",
                );
            }
            source = cause.source();
        }
    }
    RemoteApiError::new(format!("Request failed: {err}"))
}
