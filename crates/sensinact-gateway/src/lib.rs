//! The `sensinact-gateway` library crate provides the engine of the
//! `sensinact` digital twin.
//!
//! The twin is a graph of providers, each one an instance of a model, which
//! groups resources into services. Every access to the graph is a command
//! executed on a single dedicated thread, so commands never observe the
//! changes of another command in progress.
//!
//! Core functionalities of this crate include:
//!
//! - Defining models, along with their services and resources
//! - Creating, linking and deleting providers
//! - Reading resource values at different levels, which decide whether
//!   cached values are returned or external getters are invoked
//! - Writing resource values, possibly through external setters
//! - Invoking actions through external handlers
//! - Taking filtered snapshots of the twin
//! - Publishing a notification for every change applied to the twin
//!
//! External getters, setters and action handlers are registered as
//! whiteboard services. Registering a handler creates the resources it
//! serves when they are missing.
//!
//! Handles obtained during a command are only valid while that command runs.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Gateway configuration.
pub mod config;
/// Error management.
pub mod error;
/// The gateway thread executing commands, and the promises of their results.
pub mod gateway;
/// Model definitions and the manager used to create and delete them.
pub mod model;
/// The twin seen by a command, and its provider, service and resource
/// handles.
pub mod twin;
/// External getters, setters and action handlers.
pub mod whiteboard;

mod nexus;
mod scope;
mod snapshot;

pub use sensinact;
