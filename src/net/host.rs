//! Endpoint descriptors.
//!
//! # Responsibilities
//! - Normalize an address spec (string or structured fields) into a `Host`
//! - Produce the canonical identity string the pool uses as its registry key
//!
//! # Design Decisions
//! - Credentials are carried but never part of the identity
//! - A missing port falls back to `DEFAULT_PORT`, an explicit one is always kept
//! - Trailing slashes are dropped so `http://a:1/` and `http://a:1` collapse

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Port used when an address does not name one.
pub const DEFAULT_PORT: u16 = 9200;

/// Hostname used when structured fields omit it.
pub const DEFAULT_HOSTNAME: &str = "localhost";

/// Errors produced while normalizing an endpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("invalid address '{input}': {reason}")]
    Invalid { input: String, reason: String },

    #[error("unsupported scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),

    #[error("address '{0}' has no hostname")]
    MissingHostname(String),
}

/// Transport scheme of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl FromStr for Scheme {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(HostError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// One backend node, as seen by the pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Host {
    scheme: Scheme,
    hostname: String,
    port: u16,
    /// Either empty or `/segment[/segment...]` without a trailing slash.
    path: String,
    auth: Option<String>,
}

impl Host {
    pub fn new(scheme: Scheme, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            hostname: hostname.into(),
            port,
            path: String::new(),
            auth: None,
        }
    }

    /// Set the path prefix every request to this host is sent under.
    pub fn with_path(mut self, path: &str) -> Self {
        self.path = normalize_path(path);
        self
    }

    /// Attach `user:password` credentials.
    pub fn with_auth(mut self, auth: impl Into<String>) -> Self {
        self.auth = Some(auth.into());
        self
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn auth(&self) -> Option<&str> {
        self.auth.as_deref()
    }

    /// Canonical identity string. Two hosts for the same logical node always
    /// produce the same key.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Build the URL for `path` on this host, below the host's own path prefix.
    pub fn url_for(&self, path: &str) -> Result<Url, url::ParseError> {
        let suffix = if path.is_empty() || path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        Url::parse(&format!("{}{}", self, suffix))
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}{}",
            self.scheme.as_str(),
            self.hostname,
            self.port,
            self.path
        )
    }
}

impl FromStr for Host {
    type Err = HostError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };

        let url = Url::parse(&with_scheme).map_err(|e| HostError::Invalid {
            input: input.to_string(),
            reason: e.to_string(),
        })?;

        let scheme: Scheme = url.scheme().parse()?;
        let hostname = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| HostError::MissingHostname(input.to_string()))?
            .to_string();

        // `Url` drops a port equal to the scheme default, so look at the
        // authority to tell `http://a:80` apart from `http://a`.
        let port = match url.port() {
            Some(port) => port,
            None if has_explicit_port(&with_scheme) => scheme.default_port(),
            None => DEFAULT_PORT,
        };

        let auth = match (url.username(), url.password()) {
            ("", None) => None,
            (user, Some(pass)) => Some(format!("{}:{}", user, pass)),
            (user, None) => Some(user.to_string()),
        };

        Ok(Self {
            scheme,
            hostname,
            port,
            path: normalize_path(url.path()),
            auth,
        })
    }
}

/// Address specification as accepted from configuration: either a string
/// (`"localhost:9200"`, `"https://node-1:9243/es"`) or structured fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndpointSpec {
    Address(String),
    Fields(EndpointFields),
}

/// Structured form of an endpoint. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointFields {
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub auth: Option<String>,
}

impl TryFrom<&EndpointSpec> for Host {
    type Error = HostError;

    fn try_from(spec: &EndpointSpec) -> Result<Self, Self::Error> {
        match spec {
            EndpointSpec::Address(address) => address.parse(),
            EndpointSpec::Fields(fields) => {
                let scheme: Scheme = match &fields.protocol {
                    Some(p) => p.trim_end_matches(':').parse()?,
                    None => Scheme::default(),
                };
                let hostname = fields
                    .host
                    .clone()
                    .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string());
                let mut host = Host::new(scheme, hostname, fields.port.unwrap_or(DEFAULT_PORT));
                if let Some(path) = &fields.path {
                    host = host.with_path(path);
                }
                if let Some(auth) = &fields.auth {
                    host = host.with_auth(auth.clone());
                }
                Ok(host)
            }
        }
    }
}

impl TryFrom<EndpointSpec> for Host {
    type Error = HostError;

    fn try_from(spec: EndpointSpec) -> Result<Self, Self::Error> {
        Host::try_from(&spec)
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

fn has_explicit_port(url: &str) -> bool {
    let after_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = after_scheme.split('/').next().unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or_default();
    // Skip past a bracketed IPv6 literal before looking for the port separator.
    let tail = host_port.rsplit(']').next().unwrap_or_default();
    tail.contains(':')
}
