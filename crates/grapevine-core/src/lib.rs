//! Grapevine Core - foundational types for the grapevine gossip subsystem.
//!
//! This crate provides the types shared by the gossip wire protocol and the
//! in-memory infostore:
//! - [`Address`]: tagged network address (TCP or local socket)
//! - [`InfoValue`]: dynamically typed gossip value with a per-variant total order
//! - [`Ordered`]: extension point for user-defined value types
//! - Well-known gossip keys ([`KEY_SENTINEL`], [`KEY_NODE_COUNT`], ...)
//! - Wall-clock helpers in Unix nanoseconds

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod address;
mod keys;
mod time;
mod value;

pub use address::*;
pub use keys::*;
pub use time::*;
pub use value::*;
