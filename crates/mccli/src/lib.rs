//! MeshCore companion client
//!
//! Drives a MeshCore companion device over a TCP bridge or a serial port.
//! Command lines are split into invocations by the [`registry`] and
//! [`segment`]er, executed in order by the [`pipeline`], and rendered by
//! [`format`]. Commands that wait for an asynchronous push notification
//! (acks, login results, status reports, incoming messages) register with the
//! [`wait`] coordinator. [`chat`] and [`repl`] add the interactive mode.

pub mod chat;
pub mod contacts;
pub mod error;
pub mod format;
mod handlers;
pub mod pipeline;
pub mod registry;
pub mod repl;
pub mod segment;
pub mod session;
pub mod settings;
pub mod wait;
