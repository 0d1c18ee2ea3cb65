//! Tempest is a sharded client for the Discord gateway.
//!
//! It maintains N persistent WebSocket connections ("shards") to the gateway, each responsible
//! for a partition of the event traffic, while the whole fleet appears to consumers as a single
//! logical event stream.
//!
//! The interesting machinery lives in three places:
//!
//! - [`gateway::Shard`] - the per-connection protocol state machine: handshake, identify,
//!   heartbeat, resume, invalidation, and close-code handling;
//! - [`gateway::sharding`] - the isolated shard runtimes and the typed control channel they share
//!   with the manager, plus the serialized identify admission queue that honors the gateway's
//!   session start limit;
//! - [`client::Client`] - the consumer surface: configuration, typed event subscriptions, and
//!   fleet lifecycle.
//!
//! # A basic client
//!
//! ```rust,no_run
//! use tempest::client::Client;
//! use tempest::model::event::{Event, EventType};
//! use tempest::model::gateway::GatewayIntents;
//!
//! # async fn run() -> Result<(), tempest::Error> {
//! let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES;
//! let mut client = Client::builder("token here", intents).build().await?;
//!
//! client.on_shard_online(|shard_id| println!("shard {shard_id} online"));
//! client.subscribe(EventType::MessageCreate, |_, event| {
//!     if let Event::MessageCreate(ev) = event {
//!         println!("{}", ev.message.content);
//!     }
//! });
//!
//! client.start().await
//! # }
//! ```

#![warn(rust_2018_idioms)]

#[macro_use]
mod internal;

pub mod client;
pub mod constants;
mod error;
pub mod gateway;
pub mod http;
pub mod model;
pub mod prelude;

pub use crate::error::{Error, Result};
