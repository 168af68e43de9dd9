//! HTTP transport on top of `reqwest`.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::{Client, Method, RequestBuilder};

use crate::net::host::Host;
use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};

/// Default upper bound for a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks plain HTTP(S) to the nodes.
///
/// A probe is a `HEAD` on the host's root; any response, whatever its status,
/// means the node is up.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(request_timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            request_timeout,
        })
    }

    fn build(&self, host: &Host, method: Method, path: &str) -> Result<RequestBuilder, TransportError> {
        let url = host.url_for(path).map_err(|e| TransportError::Request {
            host: host.key(),
            reason: format!("invalid url: {}", e),
        })?;

        let mut builder = self
            .client
            .request(method, url)
            .header("user-agent", "node-pool");

        if let Some(auth) = host.auth() {
            let (user, pass) = match auth.split_once(':') {
                Some((user, pass)) => (user, Some(pass)),
                None => (auth, None),
            };
            builder = builder.basic_auth(user, pass);
        }
        Ok(builder)
    }

    fn map_error(&self, host: &Host, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                host: host.key(),
                timeout_ms: self.request_timeout.as_millis() as u64,
            }
        } else if err.is_connect() {
            TransportError::Connect {
                host: host.key(),
                reason: err.to_string(),
            }
        } else {
            TransportError::Request {
                host: host.key(),
                reason: err.to_string(),
            }
        }
    }
}

impl Transport for HttpTransport {
    fn ping<'a>(&'a self, host: &'a Host) -> BoxFuture<'a, Result<(), TransportError>> {
        async move {
            let request = self.build(host, Method::HEAD, "")?;
            match request.send().await {
                Ok(response) => {
                    tracing::trace!(host = %host, status = %response.status(), "Ping answered");
                    Ok(())
                }
                Err(e) => Err(self.map_error(host, e)),
            }
        }
        .boxed()
    }

    fn request<'a>(
        &'a self,
        host: &'a Host,
        request: TransportRequest,
    ) -> BoxFuture<'a, Result<TransportResponse, TransportError>> {
        async move {
            let mut builder = self.build(host, request.method, &request.path)?;
            if let Some(body) = request.body {
                builder = builder
                    .header("content-type", "application/json")
                    .body(body);
            }

            let response = builder.send().await.map_err(|e| self.map_error(host, e))?;
            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map_err(|e| self.map_error(host, e))?
                .to_vec();

            Ok(TransportResponse { status, body })
        }
        .boxed()
    }
}
