//! Connection string parsing.
//!
//! The client treats addresses as opaque strings. They are only interpreted
//! here, when an endpoint is opened.
//!
//! ```text
//! tcp://127.0.0.1:5555
//! tcp://[::1]:5555
//! ipc:///run/user/1000/service.sock
//! ```

use std::fmt;
#[cfg(unix)]
use std::path::PathBuf;

use url::Url;

use super::TransportError;

/// A parsed remote address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// TCP `host:port` authority, passed to the resolver as-is.
    Tcp(String),
    /// Unix domain socket path.
    #[cfg(unix)]
    Ipc(PathBuf),
}

impl Address {
    /// Parse a connection string of the form `scheme://...`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidAddress` for an empty string, a string
    /// without a scheme, an unsupported scheme, a TCP address without host or
    /// port, or an IPC address without a path.
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        if raw.is_empty() {
            return Err(TransportError::InvalidAddress(
                "invalid zero length address".to_string(),
            ));
        }

        let url = Url::parse(raw)
            .map_err(|e| TransportError::InvalidAddress(format!("{}: {}", raw, e)))?;

        match url.scheme() {
            "tcp" => {
                let host = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| invalid(raw, "missing host"))?;
                let port = url.port().ok_or_else(|| invalid(raw, "missing port"))?;
                if url.path() != "" && url.path() != "/" {
                    return Err(invalid(raw, "tcp address must not carry a path"));
                }
                // host_str keeps the brackets of IPv6 literals, which is the form
                // the resolver expects for "host:port".
                Ok(Address::Tcp(format!("{}:{}", host, port)))
            }
            #[cfg(unix)]
            "ipc" => {
                if url.host_str().is_some_and(|h| !h.is_empty()) {
                    return Err(invalid(raw, "ipc address must be ipc:///absolute/path"));
                }
                let path = url.path();
                if path.is_empty() || path == "/" {
                    return Err(invalid(raw, "missing socket path"));
                }
                Ok(Address::Ipc(PathBuf::from(path)))
            }
            other => Err(invalid(raw, &format!("unsupported scheme '{}'", other))),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp(authority) => write!(f, "tcp://{}", authority),
            #[cfg(unix)]
            Address::Ipc(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}

fn invalid(raw: &str, reason: &str) -> TransportError {
    TransportError::InvalidAddress(format!("{}: {}", raw, reason))
}
