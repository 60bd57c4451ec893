use hyper::{body, client::HttpConnector, header, Body, Client, Request};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use thiserror::Error;

const USER_AGENT: &str = "ruz";

/// What the transport hands back before any envelope interpretation: the
/// status code, the declared content-type, and the body read as text.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// One HTTP GET round-trip.
///
/// The request executor is generic over this seam so tests can script
/// responses and record calls without touching the network.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError>;
}

/// Errors that can occur performing the HTTP exchange itself.
#[derive(Debug, Error)]
pub enum TransportError {
    /// An argument while building the HTTP request was invalid.
    #[error("an argument while building an HTTP request was invalid")]
    MalformedHttpArgs(#[from] hyper::http::Error),
    /// Failed to send the HTTP request or read the response.
    #[error("failed to perform HTTP request")]
    HttpRequestFailed(#[from] hyper::Error),
    /// The response body was not valid UTF-8.
    #[error("response body is not valid UTF-8")]
    BodyNotUtf8(#[from] std::string::FromUtf8Error),
    /// Failure reported by a non-hyper transport implementation.
    #[error("transport failure: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Default transport: a hyper client over rustls with native roots.
///
/// The connection pool is owned by the client and released when it is
/// dropped; cancellation of an awaiting caller aborts the in-flight request
/// without leaking the connection.
pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

impl HyperTransport {
    pub fn new() -> Self {
        let connector = HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_only()
            .enable_http1()
            .build();
        Self {
            client: Client::builder().build(connector),
        }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let request = Request::builder()
            .uri(url)
            .header(header::USER_AGENT, USER_AGENT)
            .body(Body::empty())?;
        let response = self.client.request(request).await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let bytes = body::to_bytes(response.into_body()).await?;

        Ok(RawResponse {
            status,
            content_type,
            body: String::from_utf8(bytes.to_vec())?,
        })
    }
}
