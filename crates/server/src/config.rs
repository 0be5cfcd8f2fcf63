// Server configuration.
//
// Environment variables with defaults for local development against an
// evidence store and search index running on localhost.

use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Basic auth for the search index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElasticsearchAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub elasticsearch_url: String,
    pub elasticsearch_auth: Option<ElasticsearchAuth>,
    pub grafeas_url: String,
    /// Evidence store project every operation is scoped to.
    pub project: String,
    /// Alias of the index the evidence store writes occurrences to.
    pub occurrences_alias: String,
    pub index_prefix: String,
    pub search_context_keep_alive: String,
    pub upstream_timeout: Duration,
    pub request_timeout: Duration,
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `PROVENANCE_HOST` | `0.0.0.0` |
    /// | `PROVENANCE_PORT` | `8080` |
    /// | `PROVENANCE_ELASTICSEARCH_URL` | `http://localhost:9200` |
    /// | `PROVENANCE_ELASTICSEARCH_USERNAME` / `_PASSWORD` | *(none)* |
    /// | `PROVENANCE_GRAFEAS_URL` | `http://localhost:8081` |
    /// | `PROVENANCE_PROJECT` | `projects/provenance` |
    /// | `PROVENANCE_OCCURRENCES_ALIAS` | `grafeas-provenance-occurrences` |
    /// | `PROVENANCE_INDEX_PREFIX` | `provenance` |
    /// | `PROVENANCE_SEARCH_CONTEXT_KEEP_ALIVE` | `5m` |
    /// | `PROVENANCE_UPSTREAM_TIMEOUT_SECS` | `30` |
    /// | `PROVENANCE_REQUEST_TIMEOUT_SECS` | `60` |
    /// | `PROVENANCE_LOG_FILTER` | `info` |
    /// | `PROVENANCE_LOG_FORMAT` | `text` (`json` for structured output) |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("PROVENANCE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("PROVENANCE_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let elasticsearch_url =
            env("PROVENANCE_ELASTICSEARCH_URL").unwrap_or_else(|_| "http://localhost:9200".into());
        let elasticsearch_auth = match (
            env("PROVENANCE_ELASTICSEARCH_USERNAME"),
            env("PROVENANCE_ELASTICSEARCH_PASSWORD"),
        ) {
            (Ok(username), Ok(password)) if !username.is_empty() => {
                Some(ElasticsearchAuth { username, password })
            }
            _ => None,
        };

        let grafeas_url =
            env("PROVENANCE_GRAFEAS_URL").unwrap_or_else(|_| "http://localhost:8081".into());
        let project = env("PROVENANCE_PROJECT").unwrap_or_else(|_| "projects/provenance".into());
        let occurrences_alias = env("PROVENANCE_OCCURRENCES_ALIAS")
            .unwrap_or_else(|_| "grafeas-provenance-occurrences".into());
        let index_prefix = env("PROVENANCE_INDEX_PREFIX").unwrap_or_else(|_| "provenance".into());
        let search_context_keep_alive =
            env("PROVENANCE_SEARCH_CONTEXT_KEEP_ALIVE").unwrap_or_else(|_| "5m".into());

        let seconds = |key: &str, default: u64| {
            Duration::from_secs(
                env(key).ok().and_then(|v| v.parse().ok()).filter(|v| *v > 0).unwrap_or(default),
            )
        };
        let upstream_timeout = seconds("PROVENANCE_UPSTREAM_TIMEOUT_SECS", 30);
        let request_timeout = seconds("PROVENANCE_REQUEST_TIMEOUT_SECS", 60);

        let log_filter = env("PROVENANCE_LOG_FILTER").unwrap_or_else(|_| "info".into());
        let log_format = match env("PROVENANCE_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self {
            listen_addr,
            elasticsearch_url,
            elasticsearch_auth,
            grafeas_url,
            project,
            occurrences_alias,
            index_prefix,
            search_context_keep_alive,
            upstream_timeout,
            request_timeout,
            log_filter,
            log_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from_map(
        map: HashMap<&'static str, &'static str>,
    ) -> impl Fn(&str) -> Result<String, std::env::VarError> {
        move |key: &str| map.get(key).map(|v| v.to_string()).ok_or(std::env::VarError::NotPresent)
    }

    #[test]
    fn defaults_when_no_env_vars() {
        let cfg = ServerConfig::from_env_fn(env_from_map(HashMap::new()));
        assert_eq!(cfg.listen_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(cfg.elasticsearch_url, "http://localhost:9200");
        assert!(cfg.elasticsearch_auth.is_none());
        assert_eq!(cfg.grafeas_url, "http://localhost:8081");
        assert_eq!(cfg.project, "projects/provenance");
        assert_eq!(cfg.occurrences_alias, "grafeas-provenance-occurrences");
        assert_eq!(cfg.index_prefix, "provenance");
        assert_eq!(cfg.search_context_keep_alive, "5m");
        assert_eq!(cfg.upstream_timeout, Duration::from_secs(30));
        assert_eq!(cfg.request_timeout, Duration::from_secs(60));
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.log_format, LogFormat::Text);
    }

    #[test]
    fn custom_host_and_port() {
        let mut m = HashMap::new();
        m.insert("PROVENANCE_HOST", "127.0.0.1");
        m.insert("PROVENANCE_PORT", "3000");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn invalid_numbers_use_defaults() {
        let mut m = HashMap::new();
        m.insert("PROVENANCE_PORT", "not_a_number");
        m.insert("PROVENANCE_UPSTREAM_TIMEOUT_SECS", "0");
        m.insert("PROVENANCE_REQUEST_TIMEOUT_SECS", "soon");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.port(), 8080);
        assert_eq!(cfg.upstream_timeout, Duration::from_secs(30));
        assert_eq!(cfg.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn elasticsearch_auth_requires_a_username() {
        let mut m = HashMap::new();
        m.insert("PROVENANCE_ELASTICSEARCH_PASSWORD", "secret");
        assert!(ServerConfig::from_env_fn(env_from_map(m.clone())).elasticsearch_auth.is_none());

        m.insert("PROVENANCE_ELASTICSEARCH_USERNAME", "elastic");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(
            cfg.elasticsearch_auth,
            Some(ElasticsearchAuth { username: "elastic".into(), password: "secret".into() })
        );
    }

    #[test]
    fn collaborator_overrides() {
        let mut m = HashMap::new();
        m.insert("PROVENANCE_GRAFEAS_URL", "http://grafeas:8080");
        m.insert("PROVENANCE_PROJECT", "projects/rode");
        m.insert("PROVENANCE_OCCURRENCES_ALIAS", "grafeas-rode-occurrences");
        m.insert("PROVENANCE_SEARCH_CONTEXT_KEEP_ALIVE", "1m");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.grafeas_url, "http://grafeas:8080");
        assert_eq!(cfg.project, "projects/rode");
        assert_eq!(cfg.occurrences_alias, "grafeas-rode-occurrences");
        assert_eq!(cfg.search_context_keep_alive, "1m");
    }

    #[test]
    fn json_log_format() {
        let mut m = HashMap::new();
        m.insert("PROVENANCE_LOG_FORMAT", "json");
        m.insert("PROVENANCE_LOG_FILTER", "debug,tower_http=trace");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.log_filter, "debug,tower_http=trace");
    }
}
