//! An asynchronous Redis client with a hand-rolled RESP2/RESP3 codec and
//! cluster routing.
//!
//! ```no_run
//! use redpipe::{Client, ClientConfig, RedisCommands};
//!
//! # async fn run() -> redpipe::Result<()> {
//! let config = ClientConfig::from_uri("redis://127.0.0.1:6379")?;
//! let client = Client::connect(&config).await?;
//! client.set(b"greeting", b"hello").await?;
//! let value = client.get(b"greeting").await?;
//! # let _ = value;
//! # Ok(())
//! # }
//! ```
//!
//! The crate is organized around one state machine per concern:
//! [`resp`] frames the wire, [`connection`] drives one socket, [`cache`]
//! answers reads from a RESP3 client-side cache when one applies,
//! [`transaction`] serializes `MULTI`/`EXEC` windows, [`cluster`] (feature
//! `cluster`, on by default) routes by hash slot across a fleet, and
//! [`client`] ties single-node and cluster modes behind one [`Client`]
//! type. [`commands`] supplies the typed GET/SET/... wrappers every
//! [`Executor`] gets for free via [`RedisCommands`].

pub mod cache;
pub mod command_table;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod pubsub;
pub mod resp;
pub mod transaction;

#[cfg(feature = "cluster")]
pub mod cluster;

mod client;

pub use client::Client;
pub use commands::{Executor, RedisCommands};
pub use config::{ClientConfig, DisconnectHook, Protocol};
pub use connection::Connection;
pub use error::{DisconnectReason, ErrorKind, RedisError, Result};
pub use pubsub::{PubSubMessage, Subscription, SubscriptionKind};
pub use resp::Value;
pub use transaction::{MultiBody, TransactionLock};

#[cfg(feature = "cluster")]
pub use cluster::{ClusterRouter, NodeAddr};

#[cfg(feature = "test-harness")]
pub mod test_support;
