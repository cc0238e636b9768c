//! Client-side endpoint selection and failover
//!
//! Callers hand the selector one request; it picks a broker instance
//! uniformly at random, excludes endpoints that fail at the connection
//! level or answer store-unavailable, and keeps trying the remaining ones
//! until a reply arrives or the candidate set is exhausted. A reply that
//! did arrive is authoritative, negative codes included.

use std::collections::HashSet;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::common::config::ClientConfig;
use crate::common::wire::{Request, Response, CODE_UNAVAILABLE};
use crate::common::{Error, Result};

/// Selector over a fixed set of broker endpoints.
#[derive(Debug, Clone)]
pub struct EndpointSelector {
    endpoints: Vec<SocketAddr>,
    reply_timeout: Duration,
}

impl EndpointSelector {
    /// Build from an explicit endpoint list.
    pub fn new(endpoints: Vec<SocketAddr>, reply_timeout: Duration) -> Self {
        Self {
            endpoints,
            reply_timeout,
        }
    }

    /// Build from a host and a contiguous port range, one broker per port
    /// in `[start_port, start_port + broker_count)`.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut endpoints = Vec::with_capacity(config.broker_count as usize);
        for offset in 0..config.broker_count {
            let port = config.start_port + offset;
            let addr = (config.host.as_str(), port)
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| {
                    Error::Other(format!("cannot resolve {}:{}", config.host, port))
                })?;
            endpoints.push(addr);
        }
        Ok(Self::new(endpoints, config.reply_timeout()))
    }

    pub fn endpoints(&self) -> &[SocketAddr] {
        &self.endpoints
    }

    /// Replace the candidate set, e.g. after a configuration change.
    pub fn reload(&mut self, endpoints: Vec<SocketAddr>) {
        self.endpoints = endpoints;
    }

    /// Send one request, failing over across endpoints.
    ///
    /// Each endpoint is tried at most once per call; retrying a lock wait
    /// or a logical failure is the caller's decision, not the selector's.
    pub async fn call(&self, request: &Request) -> Result<Response> {
        let mut excluded: HashSet<usize> = HashSet::new();

        loop {
            let candidates: Vec<usize> = (0..self.endpoints.len())
                .filter(|idx| !excluded.contains(idx))
                .collect();
            if candidates.is_empty() {
                return Err(Error::NoEndpoints);
            }
            let pick = candidates[rand::thread_rng().gen_range(0..candidates.len())];
            let addr = self.endpoints[pick];

            match self.try_endpoint(addr, request).await {
                Ok(response) if response.code == CODE_UNAVAILABLE => {
                    // This broker is up but its store is not; another
                    // instance may still serve us.
                    tracing::debug!("endpoint {} reports store unavailable", addr);
                    excluded.insert(pick);
                }
                Ok(response) => return Ok(response),
                Err(err) => {
                    tracing::debug!("endpoint {} failed: {}", addr, err);
                    excluded.insert(pick);
                }
            }
        }
    }

    /// One full exchange against one endpoint, under a single reply budget:
    /// connect, send and read all share the same deadline, so a slow
    /// endpoint can never consume more than one `reply_timeout`.
    async fn try_endpoint(&self, addr: SocketAddr, request: &Request) -> Result<Response> {
        timeout(self.reply_timeout, Self::exchange(addr, request))
            .await
            .map_err(|_| Error::ReplyTimeout(self.reply_timeout))?
    }

    async fn exchange(addr: SocketAddr, request: &Request) -> Result<Response> {
        let mut stream = TcpStream::connect(addr).await?;

        let mut payload = serde_json::to_string(request)?;
        payload.push('\n');
        stream.write_all(payload.as_bytes()).await?;
        stream.flush().await?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(Error::Other(format!("{addr} closed without replying")));
        }

        Ok(serde_json::from_str(line.trim())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_range_enumeration() {
        let config = ClientConfig {
            host: "127.0.0.1".into(),
            start_port: 7400,
            broker_count: 3,
            reply_timeout_ms: 750,
        };
        let selector = EndpointSelector::from_config(&config).unwrap();
        let ports: Vec<u16> = selector.endpoints().iter().map(SocketAddr::port).collect();
        assert_eq!(ports, vec![7400, 7401, 7402]);
    }

    #[tokio::test]
    async fn test_empty_candidate_set_is_exhaustion() {
        let selector = EndpointSelector::new(Vec::new(), Duration::from_millis(750));
        let err = selector.call(&Request::GetList {}).await.unwrap_err();
        assert!(matches!(err, Error::NoEndpoints));
    }

    #[tokio::test]
    async fn test_silent_endpoint_consumes_at_most_one_reply_budget() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // Accept, then never reply.
            let _conn = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let budget = Duration::from_millis(150);
        let selector = EndpointSelector::new(vec![addr], budget);
        let started = std::time::Instant::now();
        let err = selector.call(&Request::GetList {}).await.unwrap_err();
        assert!(matches!(err, Error::NoEndpoints));
        assert!(
            started.elapsed() < budget * 2,
            "call took {:?} against a {:?} budget",
            started.elapsed(),
            budget
        );
        server.abort();
    }

    #[test]
    fn test_reload_replaces_candidates() {
        let mut selector = EndpointSelector::new(Vec::new(), Duration::from_millis(750));
        selector.reload(vec!["127.0.0.1:7400".parse().unwrap()]);
        assert_eq!(selector.endpoints().len(), 1);
    }
}
