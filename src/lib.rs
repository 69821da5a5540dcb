// src/lib.rs

//! dbulk - incremental parallel build driver
//!
//! Given a tree of source-package templates, dbulk decides which packages
//! need their dependency metadata (re)extracted and which need to be
//! (re)built, then runs the minimum set of external build commands in
//! parallel while respecting the dependency graph.
//!
//! # Architecture
//!
//! - Make-style staleness: template mtimes are compared against recorded
//!   dependency files, error markers and build logs
//! - Two-phase pipeline: dependency extraction is itself a job whose
//!   completion rewrites the graph and re-enters the planner
//! - Builders: the same source package produces distinct artifacts per
//!   target architecture, natively or cross-compiled
//! - One driver thread: concurrency lives entirely in the child
//!   processes; the graph is index-addressed, never shared

pub mod context;
pub mod depfile;
mod error;
pub mod layout;
pub mod mtime;
pub mod planner;
pub mod pool;
pub mod store;
pub mod template;

pub use context::{Config, Context, Counters};
pub use error::{Error, Result};
pub use mtime::Mtime;
pub use store::{Build, BuildId, Builder, BuilderId, Flags, NameId, PackageName, Store};
