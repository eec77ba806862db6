//! Reverse proxy to the secrets-management UI/API upstream.
//!
//! The caller's gateway token is never relayed: it is stripped together with
//! hop-by-hop headers and the configured CSRF headers.

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, HeaderName, Request, Response};
use std::collections::HashSet;

use super::GatewayError;
use crate::config::ProxyConfig;

const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

pub struct ProxyForwarder {
    http: reqwest::Client,
    target: String,
    /// Lower-cased names removed from requests in addition to hop-by-hop
    /// headers, `host` and `content-length`.
    stripped: HashSet<HeaderName>,
    max_body_bytes: usize,
}

impl ProxyForwarder {
    /// `auth_header` is the header carrying the gateway token.
    pub fn new(config: &ProxyConfig, auth_header: &str) -> Result<Self, anyhow::Error> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::none());

        if config.trust_all_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let mut stripped = HashSet::new();
        for name in std::iter::once(auth_header).chain(config.strip_headers.iter().map(String::as_str)) {
            let name = HeaderName::from_bytes(name.trim().to_ascii_lowercase().as_bytes())
                .map_err(|e| anyhow::anyhow!("invalid header name '{}': {}", name, e))?;
            stripped.insert(name);
        }

        Ok(Self {
            http: builder.build()?,
            target: config.target.trim_end_matches('/').to_string(),
            stripped,
            max_body_bytes: config.max_body_bytes,
        })
    }

    pub fn upstream_url(&self, upstream_path: &str, query: Option<&str>) -> String {
        let path = upstream_path.trim_start_matches('/');
        match query {
            Some(q) if !q.is_empty() => format!("{}/{}?{}", self.target, path, q),
            _ => format!("{}/{}", self.target, path),
        }
    }

    /// Relays `request` to `{target}/{upstream_path}` and returns the
    /// upstream's response. Any failure of the hop is `UpstreamGateway`.
    pub async fn forward(
        &self,
        request: Request<Body>,
        upstream_path: &str,
    ) -> Result<Response<Body>, GatewayError> {
        let (parts, body) = request.into_parts();
        let url = self.upstream_url(upstream_path, parts.uri.query());

        let body = to_bytes(body, self.max_body_bytes).await.map_err(|e| {
            GatewayError::InvalidFormat(format!("request body could not be read: {}", e))
        })?;

        let mut headers = self.request_headers(&parts.headers);
        service_core::observability::inject_trace_context(&mut headers);

        tracing::debug!(method = %parts.method, url = %url, "Forwarding request upstream");

        let upstream = self
            .http
            .request(parts.method.clone(), &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, url = %url, "Upstream request failed");
                GatewayError::UpstreamGateway(format!("upstream request failed: {}", e))
            })?;

        let status = upstream.status();
        let response_headers = self.response_headers(upstream.headers());
        let bytes = upstream.bytes().await.map_err(|e| {
            tracing::error!(error = %e, url = %url, "Reading upstream response failed");
            GatewayError::UpstreamGateway(format!("upstream response failed: {}", e))
        })?;

        metrics::counter!("gateway_proxy_requests_total", "status" => status.as_u16().to_string())
            .increment(1);

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }

    pub fn request_headers(&self, incoming: &HeaderMap) -> HeaderMap {
        let mut out = filter_hop_by_hop(incoming);
        out.remove(header::HOST);
        out.remove(header::CONTENT_LENGTH);
        for name in &self.stripped {
            out.remove(name);
        }
        out
    }

    pub fn response_headers(&self, upstream: &HeaderMap) -> HeaderMap {
        let mut out = filter_hop_by_hop(upstream);
        out.remove(header::CONTENT_LENGTH);
        for name in &self.stripped {
            out.remove(name);
        }
        out
    }
}

/// Copies `headers` minus hop-by-hop headers, including those listed in
/// `Connection`.
fn filter_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let listed: HashSet<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let lower = name.as_str();
        if HOP_BY_HOP_HEADERS.contains(&lower) || listed.contains(lower) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config() -> ProxyConfig {
        ProxyConfig {
            target: "https://upstream.example.com/".to_string(),
            path_prefix: "/proxy".to_string(),
            trust_all_certs: false,
            strip_headers: vec!["x-xsrf-token".to_string(), "X-CSRF-Token".to_string()],
            connect_timeout_ms: 1000,
            timeout_ms: 1000,
            max_body_bytes: 1024,
        }
    }

    #[test]
    fn test_upstream_url() {
        let proxy = ProxyForwarder::new(&config(), "Authorization").unwrap();
        assert_eq!(
            proxy.upstream_url("/ui/secrets", Some("page=2")),
            "https://upstream.example.com/ui/secrets?page=2"
        );
        assert_eq!(proxy.upstream_url("ui", None), "https://upstream.example.com/ui");
        assert_eq!(proxy.upstream_url("", Some("")), "https://upstream.example.com/");
    }

    #[test]
    fn test_request_headers_are_stripped() {
        let proxy = ProxyForwarder::new(&config(), "Authorization").unwrap();

        let mut incoming = HeaderMap::new();
        incoming.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        incoming.insert(header::HOST, HeaderValue::from_static("gateway.local"));
        incoming.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        incoming.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-trace-hop"));
        incoming.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        incoming.insert("x-trace-hop", HeaderValue::from_static("1"));
        incoming.insert("x-xsrf-token", HeaderValue::from_static("a"));
        incoming.insert("x-csrf-token", HeaderValue::from_static("b"));
        incoming.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        incoming.insert("x-custom", HeaderValue::from_static("kept"));

        let out = proxy.request_headers(&incoming);
        assert_eq!(out.len(), 2);
        assert_eq!(out.get(header::ACCEPT).unwrap(), "application/json");
        assert_eq!(out.get("x-custom").unwrap(), "kept");
    }

    #[test]
    fn test_custom_token_header_is_stripped() {
        let proxy = ProxyForwarder::new(&config(), "X-Gateway-Token").unwrap();
        let mut incoming = HeaderMap::new();
        incoming.insert("x-gateway-token", HeaderValue::from_static("t"));
        incoming.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic upstream"));

        let out = proxy.request_headers(&incoming);
        assert!(out.get("x-gateway-token").is_none());
        assert_eq!(out.get(header::AUTHORIZATION).unwrap(), "Basic upstream");
    }

    #[test]
    fn test_response_headers_drop_hop_by_hop() {
        let proxy = ProxyForwarder::new(&config(), "Authorization").unwrap();
        let mut upstream = HeaderMap::new();
        upstream.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        upstream.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        upstream.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));

        let out = proxy.response_headers(&upstream);
        assert!(out.get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(out.get(header::CONTENT_TYPE).unwrap(), "text/html");
        assert_eq!(out.get_all(header::SET_COOKIE).iter().count(), 2);
    }
}
