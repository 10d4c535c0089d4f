/// HTTP client for the room server
///
/// Endpoints (room name is a percent-encoded path segment):
///   GET  /room/{room}/updates   -> {"messages":[...],"clean_stored":bool}
///   POST /room/{room}/post      body: {"content":"...","reply_to":id|null} -> plain text
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::message::{Delta, PostRequest};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// The remote authority for a room's history.
pub trait RoomServer {
    /// Next delta for `room`. Any failure, including a malformed body, is `Network`.
    fn fetch(&self, room: &str) -> impl Future<Output = Result<Delta>> + Send;

    /// Submit one message; resolves to the server's acknowledgment text.
    fn post(&self, room: &str, request: &PostRequest) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Clone)]
pub struct RemoteClient {
    client: Client<HttpConnector, Full<Bytes>>,
    base_url: String,
    timeout: Duration,
}

impl RemoteClient {
    pub fn new(config: &Config) -> Result<Self> {
        config.server_uri()?;
        let client = Client::builder(TokioExecutor::new()).build_http();

        Ok(Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout,
        })
    }

    fn room_url(&self, room: &str, endpoint: &str) -> String {
        format!("{}/room/{}/{}", self.base_url, urlencoding::encode(room), endpoint)
    }

    /// One request/response exchange bounded by the configured timeout
    async fn exchange(&self, req: Request<Full<Bytes>>) -> Result<(StatusCode, Bytes)> {
        let uri = req.uri().clone();
        let exchange = async {
            let resp = self
                .client
                .request(req)
                .await
                .map_err(|e| SyncError::Network(format!("{} failed: {}", uri, e)))?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| SyncError::Network(format!("{} body read error: {}", uri, e)))?
                .to_bytes();
            Ok((status, body))
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| SyncError::Network(format!("{} timed out after {:?}", uri, self.timeout)))?
    }

    pub async fn fetch_updates(&self, room: &str) -> Result<Delta> {
        let req = Request::builder()
            .method(Method::GET)
            .uri(self.room_url(room, "updates"))
            .body(Full::new(Bytes::new()))
            .map_err(|e| SyncError::Network(format!("Invalid updates request: {}", e)))?;

        let (status, body) = self.exchange(req).await?;
        if !status.is_success() {
            return Err(SyncError::Network(format!("updates for {} returned {}", room, status)));
        }

        let delta: Delta = serde_json::from_slice(&body)
            .map_err(|e| SyncError::Network(format!("Malformed updates body: {}", e)))?;
        debug!(
            "Fetched {} messages for {} (clean_stored={})",
            delta.messages.len(),
            room,
            delta.clean_stored
        );
        Ok(delta)
    }

    pub async fn post_message(&self, room: &str, request: &PostRequest) -> Result<String> {
        let body = serde_json::to_vec(request)?;
        let req = Request::builder()
            .method(Method::POST)
            .uri(self.room_url(room, "post"))
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| SyncError::Network(format!("Invalid post request: {}", e)))?;

        // Status is not interpreted; the body is the acknowledgment either way
        let (status, body) = self.exchange(req).await?;
        debug!("Post to {} answered {}", room, status);
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

impl RoomServer for RemoteClient {
    fn fetch(&self, room: &str) -> impl Future<Output = Result<Delta>> + Send {
        self.fetch_updates(room)
    }

    fn post(&self, room: &str, request: &PostRequest) -> impl Future<Output = Result<String>> + Send {
        self.post_message(room, request)
    }
}
