//! Async client for the madVR Envy video processor's IP control protocol.
//!
//! The Envy exposes a single long-lived TCP connection that streams
//! unsolicited state notifications and acknowledges textual commands in
//! order with `OK`/`ERROR`. [`EnvyClient`] supervises that connection:
//!
//! - a listen loop parses every inbound line (via `envy-proto`) and folds it
//!   into one canonical [`EnvyState`];
//! - lost connections reconnect automatically with exponential backoff and
//!   jitter;
//! - commands are serialized, and acknowledgements correlate to senders in
//!   FIFO order;
//! - enumeration commands (`EnumProfileGroups`, ...) collect their item
//!   streams into typed lists;
//! - [`EnvyStateAdapter`] projects the state into immutable snapshots with
//!   field-level deltas and high-level events, so integrations detect change
//!   without diffing trees.
//!
//! # Example
//!
//! ```rust,ignore
//! use envy_client::EnvyClient;
//! use std::time::Duration;
//!
//! let client = EnvyClient::new("envy.local");
//! client.start().await?;
//! client.wait_synced(Some(Duration::from_secs(10))).await?;
//!
//! let groups = client.enum_profile_groups_collect(Duration::from_secs(3)).await?;
//! client.change_option("temporary\\hdrNits", 120).await?;
//! client.stop().await;
//! ```

mod adapter;
mod client;
mod error;
mod state;
mod transport;

pub use adapter::{AdapterEvent, EnvySnapshot, EnvyStateAdapter, StateDelta, snapshot_from_state};
pub use client::{
    CallbackId, ClientEvent, DEFAULT_PORT, EnvyClient, EnvyClientBuilder, EnvyClientConfig,
    ReconnectConfig, SleepFuture,
};
pub use error::EnvyError;
pub use state::{ButtonKind, EnvyState};
pub use transport::{TcpTransport, Transport};

// Protocol types surface through the client API; re-export the crate.
pub use envy_proto as proto;
