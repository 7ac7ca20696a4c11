// ── Client error types ──
//
// One taxonomy for the whole runtime. Transport implementations signal
// connection establishment failures and per-operation timeouts through the
// same enum the supervisor hands to callers, so the listen loop can classify
// an error without peeling wrapper layers.

use std::time::Duration;

use thiserror::Error;

/// Unified error type for the `envy-client` crate.
#[derive(Debug, Error)]
pub enum EnvyError {
    // ── Connection errors ────────────────────────────────────────────
    /// TCP connection could not be established.
    #[error("connection failed: {reason}")]
    ConnectionFailed { reason: String },

    /// TCP connection establishment exceeded its budget.
    #[error("connection attempt timed out after {timeout:?}")]
    ConnectionTimeout { timeout: Duration },

    /// Operation attempted without a live transport.
    #[error("not connected to the device")]
    NotConnected,

    // ── Timeouts ─────────────────────────────────────────────────────
    /// A bounded wait elapsed (`read`, `send`, `ack`, or `sync`).
    ///
    /// `read` timeouts are routine -- the device may be idle for long
    /// stretches -- and the listen loop keeps waiting on them. Every other
    /// operation surfaces its timeout to the caller.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: &'static str, timeout: Duration },

    // ── Protocol errors ──────────────────────────────────────────────
    /// The device answered a command with `ERROR`.
    #[error("command '{command}' rejected: {error}")]
    CommandRejected { command: String, error: String },

    /// An enumeration did not produce its end marker in time.
    #[error(
        "enumeration '{command}' timed out after {timeout:?} \
         (item={item}, end={end}, collected={items_collected})"
    )]
    EnumerationTimeout {
        command: String,
        item: &'static str,
        end: &'static str,
        timeout: Duration,
        items_collected: usize,
    },

    // ── I/O errors ───────────────────────────────────────────────────
    /// Raw transport I/O failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnvyError {
    /// Construct the read-timeout error a [`Transport`](crate::Transport)
    /// implementation must return when `read_line` elapses.
    pub fn read_timeout(timeout: Duration) -> Self {
        Self::Timeout { operation: "read", timeout }
    }

    /// Returns `true` for an elapsed `read_line` -- the listen loop treats
    /// this as "keep waiting", distinct from a lost connection.
    pub fn is_read_timeout(&self) -> bool {
        matches!(self, Self::Timeout { operation: "read", .. })
    }

    /// Returns `true` if reconnecting might resolve this error.
    pub fn is_retryable_connect(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::ConnectionTimeout { .. })
    }
}
