// src/fetch_service.rs

use crate::errors::{FetchError, FetchResult};
use crate::metrics;
use crate::settings;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use url::Url;

/// A fully built request target: base URL, path and query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    pub fn parse(raw: &str) -> FetchResult<Self> {
        Url::parse(raw)
            .map(|url| Self { url })
            .map_err(|e| FetchError::precondition(format!("invalid endpoint {}: {}", raw, e)))
    }

    /// Appends `path` to `base` without dropping the last segment of `base`
    /// (unlike `Url::join` on a base without a trailing slash).
    pub fn join(base: &str, path: &str) -> FetchResult<Self> {
        let raw = format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Self::parse(&raw)
    }

    pub fn with_query(mut self, key: &str, value: impl AsRef<str>) -> Self {
        self.url.query_pairs_mut().append_pair(key, value.as_ref());
        self
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Host and path, without the query string. Used as a low-cardinality metrics label.
    pub fn label(&self) -> String {
        format!("{}{}", self.url.host_str().unwrap_or_default(), self.url.path())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Thin JSON-over-HTTP client shared by every service.
///
/// One request per call: no retries, no backoff, and no timeout unless the
/// settings ask for one. Callers decide what to do with a [`FetchError`].
#[derive(Clone, Debug)]
pub struct FetchService {
    client: reqwest::Client,
}

impl FetchService {
    pub fn new(http: &settings::Http) -> FetchResult<Self> {
        let mut builder = reqwest::Client::builder().user_agent(http.user_agent.clone());
        if let Some(ms) = http.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder.build().map_err(|e| FetchError::Network {
            endpoint: "<client>".to_string(),
            message: format!("failed to build HTTP client: {}", e),
        })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> FetchResult<T> {
        let request = self.client.get(endpoint.as_str());
        self.send(request, endpoint).await
    }

    pub async fn post_json<B, T>(&self, endpoint: &Endpoint, body: &B) -> FetchResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.client.post(endpoint.as_str()).json(body);
        self.send(request, endpoint).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &Endpoint,
    ) -> FetchResult<T> {
        let start = Instant::now();
        let result = Self::execute(request, endpoint).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::record_http_fetch(&endpoint.label(), outcome, start.elapsed());
        debug!(
            "[fetch] {} -> {} in {:?}",
            endpoint.label(),
            outcome,
            start.elapsed()
        );
        result
    }

    async fn execute<T: DeserializeOwned>(
        request: reqwest::RequestBuilder,
        endpoint: &Endpoint,
    ) -> FetchResult<T> {
        let response = request.send().await.map_err(|e| FetchError::Network {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::FetchFailed {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
            });
        }

        let body = response.bytes().await.map_err(|e| FetchError::Network {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        serde_json::from_slice(&body).map_err(|e| FetchError::Parse {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Ping {
        ok: bool,
    }

    #[test]
    fn test_join_keeps_base_path() {
        let endpoint = Endpoint::join("https://api.coingecko.com/api/v3/", "/simple/price")
            .unwrap()
            .with_query("ids", "origin-dollar-governance")
            .with_query("vs_currencies", "usd");
        assert_eq!(
            endpoint.as_str(),
            "https://api.coingecko.com/api/v3/simple/price?ids=origin-dollar-governance&vs_currencies=usd"
        );
        assert_eq!(endpoint.label(), "api.coingecko.com/api/v3/simple/price");
    }

    #[test]
    fn test_invalid_endpoint_is_precondition() {
        let err = Endpoint::parse("not a url").unwrap_err();
        assert_eq!(err.kind(), "precondition");
    }

    #[tokio::test]
    async fn test_get_json_ok_and_status_errors() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/ping")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;
        let _down = server
            .mock("GET", "/down")
            .with_status(502)
            .create_async()
            .await;
        let _garbage = server
            .mock("GET", "/garbage")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let service = FetchService::new(&settings::Http::default()).unwrap();

        let ping: Ping = service
            .get_json(&Endpoint::join(&server.url(), "ping").unwrap())
            .await
            .unwrap();
        assert_eq!(ping, Ping { ok: true });

        let down = Endpoint::join(&server.url(), "down").unwrap();
        let err = service.get_json::<Ping>(&down).await.unwrap_err();
        assert_eq!(
            err,
            FetchError::FetchFailed {
                status: 502,
                endpoint: down.to_string()
            }
        );

        let err = service
            .get_json::<Ping>(&Endpoint::join(&server.url(), "garbage").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[tokio::test]
    async fn test_post_json_sends_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/echo")
            .match_body(mockito::Matcher::JsonString(r#"{"email":"a@b.co"}"#.to_string()))
            .with_status(200)
            .with_body(r#"{"ok":false}"#)
            .create_async()
            .await;

        let service = FetchService::new(&settings::Http::default()).unwrap();
        let body = serde_json::json!({ "email": "a@b.co" });
        let reply: Ping = service
            .post_json(&Endpoint::join(&server.url(), "echo").unwrap(), &body)
            .await
            .unwrap();
        assert_eq!(reply, Ping { ok: false });
        mock.assert_async().await;
    }
}
