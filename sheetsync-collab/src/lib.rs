//! # sheetsync-collab — Live cell-edit relay and durable storage
//!
//! Broadcasts cell edits between connected clients over WebSocket and
//! provides a RocksDB [`EntityStore`](sheetsync_core::EntityStore).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌─────────────┐
//! │ RelayClient │ ◄─────────────────► │ RelayServer │
//! │ (per user)  │     Binary Proto    │ (central)   │
//! └─────────────┘                     └──────┬──────┘
//!                                            │
//!                                    ┌───────┴───────┐
//!                                    │ BroadcastHub  │
//!                                    │ (fan-out)     │
//!                                    └───────────────┘
//! ```
//!
//! The relay is fire-and-forget: edits are not persisted, acknowledged or
//! replayed, and are not checked against sheet membership.
//!
//! ## Modules
//!
//! - [`protocol`] — Binary wire protocol (bincode-encoded ChannelMessage)
//! - [`broadcast`] — Connection registry with per-subscriber queues
//! - [`server`] — WebSocket relay server
//! - [`client`] — WebSocket relay client
//! - [`storage`] — RocksDB entity store

pub mod broadcast;
pub mod client;
pub mod protocol;
pub mod server;
pub mod storage;

pub use broadcast::{BroadcastHub, BroadcastStats, Frame};
pub use client::{ConnectionState, RelayClient, RelayEvent};
pub use protocol::{CellEdit, ChannelMessage, EventKind, ProtocolError};
pub use server::{RelayConfig, RelayServer, RelayStats};
pub use storage::{RocksStore, StoreConfig};
