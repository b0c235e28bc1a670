use std::time::Duration;

/// One entry of the gateway's routing table.
#[derive(Debug, Clone)]
pub struct ProxyRoute {
    /// Path prefix handled locally, e.g. `/fetch-db`.
    pub prefix: String,
    /// Base URL of the upstream service.
    pub upstream: String,
    /// Replacement for `prefix` in the upstream path; `None` keeps the path.
    pub rewrite: Option<String>,
    /// Upper bound on the whole upstream round trip.
    pub timeout: Duration,
}

impl ProxyRoute {
    pub fn passthrough(prefix: &str, upstream: &str, timeout: Duration) -> Self {
        Self {
            prefix: prefix.to_string(),
            upstream: upstream.to_string(),
            rewrite: None,
            timeout,
        }
    }

    pub fn rewritten(prefix: &str, target: &str, upstream: &str, timeout: Duration) -> Self {
        Self {
            rewrite: Some(target.to_string()),
            ..Self::passthrough(prefix, upstream, timeout)
        }
    }

    /// Upstream path for a local `path` that starts with this route's prefix.
    pub fn upstream_path(&self, path: &str) -> String {
        match &self.rewrite {
            Some(target) => {
                let rest = path.strip_prefix(self.prefix.as_str()).unwrap_or("");
                format!("{}{}", target, rest)
            }
            None => path.to_string(),
        }
    }

    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> String {
        let mut url = format!(
            "{}{}",
            self.upstream.trim_end_matches('/'),
            self.upstream_path(path)
        );
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

/// Routes served by the FastAPI inference service.
pub fn inference_routes(upstream: &str, timeout: Duration) -> Vec<ProxyRoute> {
    vec![
        ProxyRoute::passthrough("/upload", upstream, timeout),
        ProxyRoute::passthrough("/docs", upstream, timeout),
        ProxyRoute::passthrough("/openapi.json", upstream, timeout),
        ProxyRoute::passthrough("/redoc", upstream, timeout),
        ProxyRoute::rewritten("/fetch-db", "/api/fetch-db", upstream, timeout),
        ProxyRoute::rewritten("/ai/health", "/health", upstream, timeout),
    ]
}
