//! Endpoint resolution and credential attachment
//!
//! Both are collaborator seams: the URL/origin resolver and the session
//! component that owns the auth token live outside this crate. They are
//! consulted on every connection attempt, so a rotated token or a moved
//! endpoint takes effect on the next reconnect.

use std::sync::Arc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue, Uri};
use wirebus_core::{Error, Result};

/// Supplies the WebSocket URL to connect to
pub trait EndpointResolver: Send + Sync {
    fn resolve(&self) -> Result<String>;
}

impl EndpointResolver for String {
    fn resolve(&self) -> Result<String> {
        Ok(self.clone())
    }
}

impl EndpointResolver for &'static str {
    fn resolve(&self) -> Result<String> {
        Ok((*self).to_string())
    }
}

/// Adapts a closure into an [`EndpointResolver`]
pub struct FnResolver<F>(pub F);

impl<F> EndpointResolver for FnResolver<F>
where
    F: Fn() -> Result<String> + Send + Sync,
{
    fn resolve(&self) -> Result<String> {
        (self.0)()
    }
}

/// Supplies the bearer token attached to the handshake, if any
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// Check that `url` is a `ws://` or `wss://` URL with a host
pub fn validate_url(url: &str) -> Result<()> {
    let uri: Uri = url
        .parse()
        .map_err(|e| Error::InvalidEndpoint(format!("{}: {}", url, e)))?;

    match uri.scheme_str() {
        Some("ws") | Some("wss") => {}
        _ => {
            return Err(Error::InvalidEndpoint(format!(
                "{}: scheme must be ws or wss",
                url
            )))
        }
    }

    match uri.host() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(Error::InvalidEndpoint(format!("{}: missing host", url))),
    }
}

/// Resolve the endpoint and build the handshake request for one attempt
pub(crate) fn build_request(
    resolver: &Arc<dyn EndpointResolver>,
    tokens: Option<&Arc<dyn TokenProvider>>,
) -> Result<Request> {
    let url = resolver.resolve()?;
    validate_url(&url)?;

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| Error::InvalidEndpoint(format!("{}: {}", url, e)))?;

    if let Some(token) = tokens.and_then(|t| t.token()) {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| Error::InvalidEndpoint("token is not a valid header value".into()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    Ok(request)
}
