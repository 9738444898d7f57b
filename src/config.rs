//! Job identity and tuning parameters.
//!
//! All values have defaults suitable for a single-process job. Override via
//! environment variables (prefixed `TCPMPI_`) or by constructing an
//! [`MpiConfig`] directly (the in-process bootstrap does this).

use crate::error::{MpiError, Result};
use crate::types::Rank;
use std::time::Duration;

/// Default base port when `TCPMPI_PORT_BASE` is absent.
pub const DEFAULT_PORT_BASE: u16 = 49152;

/// Identity and tuning for one rank of a job.
///
/// Rank `r` listens on `port_base + r` on loopback; an external launcher is
/// expected to start `size` copies of the binary with matching settings.
#[derive(Debug, Clone)]
pub struct MpiConfig {
    /// Total number of ranks in the job.
    pub size: i32,

    /// This process's rank in `[0, size)`.
    pub rank: Rank,

    /// Base TCP port on loopback.
    pub port_base: u16,

    /// Total budget for full-mesh establishment, dial retries included.
    pub init_timeout: Duration,

    /// Timeout for the kernel to accept the bytes of one framed send.
    pub send_timeout: Duration,

    /// Timeout for each internal point-to-point step of a collective.
    pub collective_timeout: Duration,
}

impl Default for MpiConfig {
    fn default() -> Self {
        Self {
            size: 1,
            rank: 0,
            port_base: DEFAULT_PORT_BASE,
            init_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(10),
            collective_timeout: Duration::from_secs(30),
        }
    }
}

impl MpiConfig {
    /// Load identity and tuning from environment variables, falling back to
    /// single-process defaults.
    ///
    /// Recognized variables:
    /// - `TCPMPI_SIZE`
    /// - `TCPMPI_RANK`
    /// - `TCPMPI_PORT_BASE`
    /// - `TCPMPI_INIT_TIMEOUT_SECS`
    /// - `TCPMPI_SEND_TIMEOUT_SECS`
    /// - `TCPMPI_COLLECTIVE_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("TCPMPI_SIZE") {
            if let Ok(n) = v.parse::<i32>() {
                cfg.size = n;
            }
        }
        if let Ok(v) = std::env::var("TCPMPI_RANK") {
            if let Ok(n) = v.parse::<i32>() {
                cfg.rank = n;
            }
        }
        if let Ok(v) = std::env::var("TCPMPI_PORT_BASE") {
            if let Ok(p) = v.parse::<u16>() {
                cfg.port_base = p;
            }
        }
        if let Ok(v) = std::env::var("TCPMPI_INIT_TIMEOUT_SECS") {
            if let Ok(s) = v.parse::<u64>() {
                cfg.init_timeout = Duration::from_secs(s);
            }
        }
        if let Ok(v) = std::env::var("TCPMPI_SEND_TIMEOUT_SECS") {
            if let Ok(s) = v.parse::<u64>() {
                cfg.send_timeout = Duration::from_secs(s);
            }
        }
        if let Ok(v) = std::env::var("TCPMPI_COLLECTIVE_TIMEOUT_SECS") {
            if let Ok(s) = v.parse::<u64>() {
                cfg.collective_timeout = Duration::from_secs(s);
            }
        }

        cfg
    }

    /// Reject impossible identities before any socket is touched.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.size <= 0 {
            return Err(MpiError::InitFailed(format!(
                "size must be positive, got {}",
                self.size
            )));
        }
        if self.rank < 0 || self.rank >= self.size {
            return Err(MpiError::InitFailed(format!(
                "rank {} outside [0, {})",
                self.rank, self.size
            )));
        }
        let highest = u32::from(self.port_base) + self.size as u32 - 1;
        if highest > u32::from(u16::MAX) {
            return Err(MpiError::InitFailed(format!(
                "port range {}..={highest} exceeds the TCP port space",
                self.port_base
            )));
        }
        Ok(())
    }

    /// Listening port for a given rank.
    pub(crate) fn port_of(&self, rank: Rank) -> u16 {
        self.port_base + rank as u16
    }
}
