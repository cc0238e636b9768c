//! # tournd
//!
//! A coordination service for shared tournament records:
//! - Data access layer with per-tournament lock discipline and
//!   optimistic version checks
//! - Atomic multi-node creation with rollback
//! - Request broker exposing the data layer over a line-delimited
//!   JSON channel
//! - Client-side endpoint selector with random pick and failover
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              Callers (CLI, …)            │
//! │   EndpointSelector: random pick +        │
//! │   failover across broker instances       │
//! └───────────┬──────────────────────────────┘
//!             │ JSON over TCP
//!   ┌─────────┴──────────┬───────────────┐
//!   │                    │               │
//! ┌─▼──────────┐   ┌─────▼──────┐   ┌────▼───────┐
//! │ Broker :N  │   │ Broker :N+1│   │ Broker :N+2│
//! │  DataApi   │   │  DataApi   │   │  DataApi   │
//! └─────┬──────┘   └─────┬──────┘   └────┬───────┘
//!       └────────────────┴───────────────┘
//!              coordination store
//!        (versioned nodes, locks, txns)
//! ```
//!
//! ## Usage
//!
//! ### Start a broker
//! ```bash
//! tournd-broker serve --bind 127.0.0.1:7400 --root /tournd
//! ```
//!
//! ### Use the CLI
//! ```bash
//! # Create a tournament
//! tournd create "Spring Open" --password s3cret --players ana,bo,cai
//!
//! # Read it back
//! tournd get 0
//!
//! # Record a result (first match won by slot 1)
//! tournd update 0 --version 0 --classification 1U --password s3cret
//! ```

pub mod api;
pub mod broker;
pub mod client;
pub mod common;
pub mod store;

// Re-export commonly used types
pub use api::DataApi;
pub use broker::Broker;
pub use client::EndpointSelector;
pub use common::{Config, Error, Result};
pub use store::memory::MemoryStore;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
