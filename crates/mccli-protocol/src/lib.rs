//! MeshCore Companion Protocol
//!
//! Types and utilities for talking to a MeshCore companion device over a
//! byte stream (TCP bridge or serial port). Every exchange is a framed
//! message whose first byte selects its meaning:
//!
//! - **Commands** (host → device): start with a `CMD_*` byte
//! - **Responses** (device → host): start with a `RESP_CODE_*` byte
//! - **Push notifications** (device → host): start with a `PUSH_CODE_*` byte (0x80+)
//!
//! # Example
//!
//! ```rust,ignore
//! use mccli_protocol::{Command, FrameCodec, Message};
//!
//! let wire = FrameCodec::encode(&Command::GetDeviceTime.encode());
//!
//! let mut codec = FrameCodec::new();
//! codec.push(&received_bytes);
//! while let Some(frame) = codec.decode() {
//!     match Message::decode(&frame)? {
//!         Message::Response(resp) => println!("{:?}", resp),
//!         Message::Push(push) => println!("push {:?}", push),
//!     }
//! }
//! ```

mod commands;
mod constants;
mod error;
mod frame;
mod reader;
mod responses;
mod status;
mod types;

pub use commands::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use responses::*;
pub use status::*;
pub use types::*;
