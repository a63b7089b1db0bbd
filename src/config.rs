//! Client configuration.
use std::time::Duration;

use crate::{
    endpoint::{EndpointAddr, Timeouts},
    error::{Error, Result},
};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 3312;

/// Endpoints plus the connect and request retry policy.
///
/// Retries count attempts, so `1` means a single try with no retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoints: Vec<EndpointAddr>,
    pub connect_timeout: Option<Duration>,
    pub connect_retries: u32,
    pub request_timeout: Option<Duration>,
    pub request_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![EndpointAddr::Tcp {
                host: DEFAULT_HOST.into(),
                port: DEFAULT_PORT,
            }],
            connect_timeout: None,
            connect_retries: 1,
            request_timeout: None,
            request_retries: 1,
        }
    }
}

fn non_zero(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

impl ClientConfig {
    /// Single endpoint, parsed from `host:port` or a socket path.
    pub fn with_server(mut self, addr: &str) -> Result<Self> {
        self.endpoints = vec![addr.parse()?];
        Ok(self)
    }

    pub fn with_servers<I, S>(mut self, addrs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.endpoints = addrs
            .into_iter()
            .map(|a| a.as_ref().parse::<EndpointAddr>())
            .collect::<Result<_>>()?;
        if self.endpoints.is_empty() {
            return Err(Error::argument("\"servers\" argument must be not empty"));
        }
        Ok(self)
    }

    /// A zero timeout disables the limit.
    pub fn with_connect_timeout(mut self, timeout: Duration, retries: u32) -> Result<Self> {
        if retries == 0 {
            return Err(Error::argument("\"retries\" argument must be greater than 0"));
        }
        self.connect_timeout = non_zero(timeout);
        self.connect_retries = retries;
        Ok(self)
    }

    /// A zero timeout disables the limit.
    pub fn with_request_timeout(mut self, timeout: Duration, retries: u32) -> Result<Self> {
        if retries == 0 {
            return Err(Error::argument("\"retries\" argument must be greater than 0"));
        }
        self.request_timeout = non_zero(timeout);
        self.request_retries = retries;
        Ok(self)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: self.connect_timeout.and_then(non_zero),
            request: self.request_timeout.and_then(non_zero),
        }
    }

    /// Checks fields that may have been set directly.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::argument("\"servers\" argument must be not empty"));
        }
        if self.connect_retries == 0 || self.request_retries == 0 {
            return Err(Error::argument("\"retries\" argument must be greater than 0"));
        }
        for endpoint in &self.endpoints {
            if let EndpointAddr::Tcp { host, port } = endpoint {
                if host.is_empty() || *port == 0 {
                    return Err(Error::argument(format!("invalid endpoint \"{endpoint}\"")));
                }
            }
        }
        Ok(())
    }
}
