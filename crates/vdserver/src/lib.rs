//! Asynchronous request broker between an editor and D language analysis.
//!
//! The editor talks to the broker through a strictly synchronous interface:
//! every call returns at once, and slow semantic queries are split into a
//! request that starts background work and a result call that is polled.
//!
//! # Architecture
//!
//! - **Module store**: editor buffers, their parses and the shared cache
//! - **Query slots**: one latest-wins background computation per query kind
//! - **Broker**: the editor-facing operations and result serialization
//! - **Protocol**: line-delimited JSON for driving the broker over stdio
//!
//! # Example
//!
//! ```
//! use vdserver::{Broker, BrokerConfig};
//!
//! let broker = Broker::with_d_engine(&BrokerConfig::default()).unwrap();
//! broker.update_module("app.d", "void main() {", 0);
//! assert_eq!(broker.parse_errors("app.d").unwrap().lines().count(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod broker;
mod config;
mod error;
pub mod format;
mod module_store;
pub mod protocol;
mod server;
mod slot;

pub use broker::Broker;
pub use config::{BrokerConfig, ConfigError};
pub use error::{BrokerError, BrokerResult};
pub use format::LocatedText;
pub use module_store::ModuleStore;
pub use server::{serve, serve_stdio};
pub use slot::{QuerySlot, SlotState};

/// Broker version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
