//! Transport selection from a bus address.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::bus::EventBus;
use crate::errors::{BusError, Result};
use crate::memory::InMemoryBus;
use crate::nats::{NatsBus, NatsOptions};

/// Options shared by every transport.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    /// Name announced to the broker.
    pub client_name: String,
    /// Upper bound on establishing the connection.
    pub connect_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            client_name: feedcast_core::constants::NAME.into(),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

/// Parsed form of a bus address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusAddress {
    /// `memory://`: in-process broker.
    Memory,
    /// `nats://[user:pass@]host:port` or bare `host:port`.
    Nats {
        /// `host:port` to dial.
        host: String,
        /// Username, if present.
        user: Option<String>,
        /// Password, if present.
        pass: Option<String>,
    },
}

impl BusAddress {
    /// Parse an address string.
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        let rest = match address.split_once("://") {
            Some(("memory", _)) => return Ok(Self::Memory),
            Some(("nats", rest)) => rest,
            Some((scheme, _)) => {
                return Err(BusError::Connection(format!(
                    "unsupported bus scheme {scheme:?} in {address:?}"
                )));
            }
            None => address,
        };

        let (credentials, host) = match rest.rsplit_once('@') {
            Some((creds, host)) => (Some(creds), host),
            None => (None, rest),
        };
        let host = host.trim_end_matches('/');
        if host.is_empty() {
            return Err(BusError::Connection(format!("missing host in {address:?}")));
        }
        let host = if host.contains(':') {
            host.to_owned()
        } else {
            format!("{host}:4222")
        };

        let (user, pass) = match credentials {
            Some(creds) => match creds.split_once(':') {
                Some((u, p)) => (Some(u.to_owned()), Some(p.to_owned())),
                None => (Some(creds.to_owned()), None),
            },
            None => (None, None),
        };
        Ok(Self::Nats { host, user, pass })
    }
}

/// Open a bus handle for `address`.
///
/// Fails fast: an unreachable broker is an error here, never a background
/// retry.
pub async fn connect(address: &str, options: &ConnectOptions) -> Result<Arc<dyn EventBus>> {
    match BusAddress::parse(address)? {
        BusAddress::Memory => {
            info!("using in-process event bus");
            Ok(Arc::new(InMemoryBus::new()))
        }
        BusAddress::Nats { host, user, pass } => {
            let nats = NatsOptions {
                client_name: options.client_name.clone(),
                connect_timeout: options.connect_timeout,
                user,
                pass,
            };
            Ok(Arc::new(NatsBus::connect(&host, &nats).await?))
        }
    }
}
