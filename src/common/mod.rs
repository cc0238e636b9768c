//! Common utilities and types shared across tournd

pub mod config;
pub mod error;
pub mod wire;

pub use config::{BrokerConfig, ClientConfig, Config};
pub use error::{Error, Result};
pub use wire::{Request, Response, CODE_MALFORMED, CODE_OK, CODE_OP_FAILED, CODE_UNAVAILABLE};
