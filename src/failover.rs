//! Endpoint selection and retries.
//!
//! Two nested loops with separate budgets:
//!
//! - [`Failover::with_server`] picks an endpoint and, on a connection failure, moves to
//!   the next one until `connect_retries` attempts are spent.
//! - [`with_socket`] runs one exchange on a chosen endpoint and, when the daemon's reply
//!   is unusable, reconnects to the same endpoint until `request_retries` attempts are
//!   spent. Connection failures are handed straight back to the outer loop.
use log::{debug, warn};

use crate::{
    config::ClientConfig,
    endpoint::{Endpoint, Session, Timeouts},
    error::{Error, Result},
};

/// Which endpoint a request starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerSelector {
    /// Next endpoint after the one used last.
    RoundRobin,
    /// Endpoint derived from a request hash, so identical requests land on the same shard.
    Seeded(u32),
    /// This endpoint only; retries never move elsewhere.
    Fixed(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeouts: Timeouts,
    pub connect_retries: u32,
    pub request_retries: u32,
}

impl From<&ClientConfig> for RetryPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            timeouts: config.timeouts(),
            connect_retries: config.connect_retries.max(1),
            request_retries: config.request_retries.max(1),
        }
    }
}

/// Server-level retry state: the policy and the round-robin cursor.
#[derive(Debug, Clone)]
pub struct Failover {
    policy: RetryPolicy,
    last_server: Option<usize>,
}

impl Failover {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            last_server: None,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Index of the endpoint used most recently by round-robin selection.
    pub fn last_server(&self) -> Option<usize> {
        self.last_server
    }

    fn next_round_robin(&mut self, n: usize) -> usize {
        let next = self.last_server.map_or(0, |last| (last + 1) % n);
        self.last_server = Some(next);
        next
    }

    /// Runs `op` against endpoints until it succeeds, fails with a non-connection error,
    /// or the connect budget is spent.
    pub fn with_server<T, F>(
        &mut self,
        endpoints: &mut [Endpoint],
        selector: ServerSelector,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut(&mut Endpoint) -> Result<T>,
    {
        let n = endpoints.len();
        if n == 0 {
            return Err(Error::argument("\"servers\" argument must be not empty"));
        }

        let mut index = match selector {
            ServerSelector::RoundRobin => self.next_round_robin(n),
            ServerSelector::Seeded(hash) => hash as usize % n,
            ServerSelector::Fixed(i) if i < n => i,
            ServerSelector::Fixed(i) => {
                return Err(Error::argument(format!("no endpoint at index {i}")));
            }
        };

        let mut attempts = self.policy.connect_retries;
        loop {
            let endpoint = &mut endpoints[index];
            match op(endpoint) {
                Err(e) if e.is_connect_error() => {
                    attempts -= 1;
                    if attempts == 0 {
                        warn!("giving up on {}: {e}", endpoint.addr());
                        return Err(e);
                    }
                    debug!("{e}, {attempts} connect attempts left");
                    match selector {
                        ServerSelector::Fixed(_) => {}
                        ServerSelector::Seeded(_) => index = (index + 1) % n,
                        ServerSelector::RoundRobin => {
                            index = (index + 1) % n;
                            self.last_server = Some(index);
                        }
                    }
                }
                other => return other,
            }
        }
    }
}

/// Runs `op` on a session of `endpoint`, reconnecting on request-level failures.
///
/// A daemon-reported error leaves the session usable, so it goes back to the endpoint
/// (kept only when persistent). A short or garbled reply or a socket failure drops it.
pub fn with_socket<T, F>(endpoint: &mut Endpoint, policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut(&mut Session) -> Result<T>,
{
    let mut attempts = policy.request_retries;
    loop {
        let mut session = endpoint.acquire(&policy.timeouts)?;
        match op(&mut session) {
            Ok(value) => {
                endpoint.release(session);
                return Ok(value);
            }
            Err(e) => {
                match e {
                    // the daemon's frame was read whole, the stream is still in sync
                    Error::Internal(_) | Error::Temporary(_) | Error::Unknown(_) => {
                        endpoint.release(session)
                    }
                    _ => drop(session),
                }
                if !e.is_retryable() {
                    return Err(e);
                }
                attempts -= 1;
                if attempts == 0 {
                    warn!("request to {} failed: {e}", endpoint.addr());
                    return Err(e);
                }
                debug!("{e}, {attempts} request attempts left on {}", endpoint.addr());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::endpoint::EndpointAddr;

    use super::*;

    fn endpoints(n: u16) -> Vec<Endpoint> {
        (1..=n)
            .map(|port| {
                Endpoint::new(EndpointAddr::Tcp {
                    host: "localhost".into(),
                    port,
                })
            })
            .collect()
    }

    fn policy(connect_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeouts: Timeouts::default(),
            connect_retries,
            request_retries: 1,
        }
    }

    fn port(endpoint: &Endpoint) -> u16 {
        match endpoint.addr() {
            EndpointAddr::Tcp { port, .. } => *port,
            EndpointAddr::Unix(_) => unreachable!(),
        }
    }

    #[test]
    fn connect_errors_rotate_endpoints() {
        let mut eps = endpoints(2);
        let mut failover = Failover::new(policy(3));
        let mut seen = Vec::new();

        let res: Result<()> = failover.with_server(&mut eps, ServerSelector::RoundRobin, |ep| {
            seen.push(port(ep));
            Err(Error::Connect("refused".into()))
        });

        assert_eq!(res, Err(Error::Connect("refused".into())));
        assert_eq!(seen, vec![1, 2, 1]);
        assert_eq!(failover.last_server(), Some(0));
    }

    #[test]
    fn round_robin_advances_between_calls() {
        let mut eps = endpoints(3);
        let mut failover = Failover::new(policy(1));
        let mut seen = Vec::new();
        for _ in 0..4 {
            failover
                .with_server(&mut eps, ServerSelector::RoundRobin, |ep| {
                    seen.push(port(ep));
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(seen, vec![1, 2, 3, 1]);
    }

    #[test]
    fn seeded_selection_is_stable() {
        let mut eps = endpoints(3);
        let mut failover = Failover::new(policy(1));
        let mut seen = Vec::new();
        for _ in 0..2 {
            failover
                .with_server(&mut eps, ServerSelector::Seeded(7), |ep| {
                    seen.push(port(ep));
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(seen, vec![2, 2]);
        assert_eq!(failover.last_server(), None);
    }

    #[test]
    fn fixed_selection_never_moves() {
        let mut eps = endpoints(2);
        let mut failover = Failover::new(policy(3));
        let mut seen = Vec::new();
        let _ = failover.with_server(&mut eps, ServerSelector::Fixed(1), |ep| -> Result<()> {
            seen.push(port(ep));
            Err(Error::Connect("refused".into()))
        });
        assert_eq!(seen, vec![2, 2, 2]);
    }

    #[test]
    fn request_errors_do_not_rotate() {
        let mut eps = endpoints(2);
        let mut failover = Failover::new(policy(3));
        let mut calls = 0;
        let res: Result<()> = failover.with_server(&mut eps, ServerSelector::RoundRobin, |_| {
            calls += 1;
            Err(Error::Temporary("busy".into()))
        });
        assert!(matches!(res, Err(Error::Temporary(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn empty_endpoint_list() {
        let mut failover = Failover::new(policy(1));
        let res: Result<()> = failover.with_server(&mut [], ServerSelector::RoundRobin, |_| Ok(()));
        assert!(matches!(res, Err(Error::Argument(_))));
    }
}
