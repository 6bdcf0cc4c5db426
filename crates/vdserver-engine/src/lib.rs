//! Semantic analysis engine for the vdserver request broker.
//!
//! The broker talks to analysis through the [`AnalysisEngine`] trait; this
//! crate provides the trait, the shared infrastructure every engine needs and
//! a built-in implementation for D, [`DEngine`].
//!
//! - [`ParseCache`]: the process-wide LRU cache of parsed modules
//! - [`ActivityCounter`]: stamps modules so older parses never win
//! - [`CancellationToken`]: cooperative cancellation of running queries
//! - [`Environment`]: import paths and conditional compilation settings
//! - [`index_import_paths`]: parses library sources into the cache
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use vdserver_engine::{AnalysisEngine, CancellationToken, DEngine, ModuleSnapshot};
//! use vdserver_parser::{CodeLocation, ParsedModule};
//!
//! let source = "int answer;\nvoid f() { answer = 42; }";
//! let module = Arc::new(ParsedModule::parse("app.d", source, &[]));
//! let snapshot = ModuleSnapshot::single(module, source);
//!
//! let at = CodeLocation::new(2, 12);
//! let found = DEngine::new()
//!     .definition(&snapshot, at, at, &CancellationToken::new())
//!     .unwrap();
//! assert_eq!(found.start, CodeLocation::new(1, 5));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod activity;
mod cache;
mod cancel;
mod d;
mod engine;
mod environment;
mod error;
mod index;
mod paths;

pub use activity::ActivityCounter;
pub use cache::{CacheStats, ParseCache, DEFAULT_CAPACITY};
pub use cancel::CancellationToken;
pub use d::DEngine;
pub use engine::{
    AnalysisEngine, Definition, IdentifierKind, IdentifierType, ModuleSnapshot, Reference,
    Tooltip,
};
pub use environment::{split_list, Environment, FLAG_64BIT, FLAG_DEBUG, FLAG_UNITTEST};
pub use error::{EngineError, EngineResult};
pub use index::index_import_paths;
pub use paths::{is_d_source, normalize_path};
