use std::{borrow::Cow, fmt};

use url::Url;

use crate::storage::CredentialError;

/// Username/secret pair held by a native credential store.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }
}

// Secrets never reach logs through `{:?}`.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Protocol tag stored alongside internet-password items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http,
    Https,
}

/// Decomposed server URL used as the lookup key in every native store.
///
/// The fields are handed to the OS API as-is; nothing here is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerDescriptor {
    url: String,
    protocol: Protocol,
    host: String,
    path: String,
    port: u16,
}

impl ServerDescriptor {
    /// Build a descriptor from parts without validation.
    pub fn new(
        protocol: Protocol,
        host: impl Into<String>,
        path: impl Into<String>,
        port: u16,
    ) -> Self {
        let host = host.into();
        let path = path.into();
        let scheme = match protocol {
            Protocol::Http => "http",
            Protocol::Https => "https",
        };
        let url = match port {
            0 => format!("{scheme}://{host}{path}"),
            port => format!("{scheme}://{host}:{port}{path}"),
        };
        Self {
            url,
            protocol,
            host,
            path,
            port,
        }
    }

    /// Decompose a registry server URL.
    ///
    /// A bare `host[:port][/path]` is read as `https`. Any scheme other than
    /// `https` is stored as `http`. Host, port and path are taken from the
    /// text as written: an explicit port is kept even when it is the scheme's
    /// default, a missing port is `0` and a lone `/` path is treated as no path.
    pub fn parse(server_url: &str) -> Result<Self, CredentialError> {
        let invalid = |reason: String| CredentialError::InvalidServer {
            url: server_url.to_string(),
            reason,
        };

        let candidate = if server_url.contains("://") {
            Cow::Borrowed(server_url)
        } else {
            Cow::Owned(format!("https://{server_url}"))
        };

        // Reject what is not a URL at all; the fields themselves come from
        // the raw text, since `Url` normalises ports, case and escapes.
        let parsed = Url::parse(&candidate).map_err(|err| invalid(err.to_string()))?;

        let rest = candidate
            .split_once("://")
            .map_or(&*candidate, |(_, rest)| rest);
        let authority_end = rest.find(&['/', '?', '#'][..]).unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(authority_end);
        let authority = authority
            .rsplit_once('@')
            .map_or(authority, |(_, host_port)| host_port);
        let path = &tail[..tail.find(&['?', '#'][..]).unwrap_or(tail.len())];

        let (host, port) = split_host_port(authority);
        if host.is_empty() {
            return Err(invalid("missing host".to_string()));
        }
        let port = match port {
            None | Some("") => 0,
            Some(port) => port
                .parse::<u16>()
                .map_err(|err| invalid(format!("invalid port {port:?}: {err}")))?,
        };

        let protocol = if parsed.scheme() == "https" {
            Protocol::Https
        } else {
            Protocol::Http
        };
        let path = match path {
            "/" => "",
            path => path,
        };

        Ok(Self {
            url: server_url.to_string(),
            protocol,
            host: host.to_string(),
            path: path.to_string(),
            port,
        })
    }

    /// The server URL this descriptor was built from.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Explicit port, `0` when the URL had none.
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Split `host[:port]`, keeping bracketed IPv6 hosts whole.
fn split_host_port(authority: &str) -> (&str, Option<&str>) {
    if authority.starts_with('[') {
        if let Some(close) = authority.find(']') {
            let (host, after) = authority.split_at(close + 1);
            return (host, after.strip_prefix(':'));
        }
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    }
}

impl fmt::Display for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl std::str::FromStr for ServerDescriptor {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
