//! Pre-flight gate consulted before a run touches the network

use std::fmt::Debug;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::constants::defaults;

/// Decides whether a pipeline run may start
///
/// Returning false aborts the run before any request or file change.
pub trait PreflightGate: Send + Sync + Debug {
    fn should_proceed(&self) -> BoxFuture<'_, bool>;
}

/// Gate that never blocks
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysProceed;

impl PreflightGate for AlwaysProceed {
    fn should_proceed(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }
}

/// Gate that never lets a run start
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverProceed;

impl PreflightGate for NeverProceed {
    fn should_proceed(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { false })
    }
}

/// `[preflight]` settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightConfig {
    /// Skip the run when `probe_host` cannot be reached
    pub require_network: bool,
    /// `host:port` opened with a plain TCP connect
    pub probe_host: String,
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            require_network: false,
            probe_host: defaults::PROBE_HOST.to_string(),
            probe_timeout: defaults::PROBE_TIMEOUT,
        }
    }
}

impl PreflightConfig {
    /// Gate implementing these settings
    pub fn gate(&self) -> Box<dyn PreflightGate> {
        if self.require_network {
            Box::new(ReachabilityGate::new(&self.probe_host, self.probe_timeout))
        } else {
            Box::new(AlwaysProceed)
        }
    }
}

/// Proceeds only when a TCP connection to the probe host succeeds
#[derive(Debug, Clone)]
pub struct ReachabilityGate {
    host: String,
    timeout: Duration,
}

impl ReachabilityGate {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            timeout,
        }
    }
}

impl PreflightGate for ReachabilityGate {
    fn should_proceed(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, TcpStream::connect(&self.host)).await {
                Ok(Ok(_)) => {
                    debug!("Pre-flight: {} reachable", self.host);
                    true
                }
                Ok(Err(e)) => {
                    warn!("Pre-flight: cannot reach {}: {}", self.host, e);
                    false
                }
                Err(_) => {
                    warn!("Pre-flight: connecting to {} timed out", self.host);
                    false
                }
            }
        })
    }
}
