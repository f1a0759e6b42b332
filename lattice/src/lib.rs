//! `lattice` is a socket-and-messaging library: applications declare
//! message types by composing primitive and container fields, the global
//! registry assigns each type a compact numeric id, and channels move the
//! serialized form over TCP, TLS or UDP with optional XOR scrambling and
//! CRC32 datagram integrity.
//!
//! The pieces compose bottom-up: the [`serialize`] codec turns values into
//! bytes, the [`registry`] turns leading message ids back into typed
//! values, [`net`] frames payloads onto transports, and [`mux`] lets many
//! sockets, pipes and [`lockable`] mutexes share one polling thread.
//!
//! ```no_run
//! use lattice::prelude::*;
//! use lattice::config::ChannelConfig;
//! use lattice::net::channel::StreamChannel;
//! use std::net::TcpStream;
//!
//! #[derive(Debug, Default, Message)]
//! struct Greeting {
//!     text: String,
//! }
//!
//! fn main() -> Result<()> {
//!     register_message::<Greeting>()?;
//!
//!     let transport = TcpStream::connect("127.0.0.1:4000").map_err(Error::from)?;
//!     let mut channel = StreamChannel::new(transport, ChannelConfig::default(), None);
//!
//!     channel.send(&Greeting { text: "hello".into() })?;
//!
//!     if let Some(reply) = channel.receive()? {
//!         println!("{:?}", reply);
//!     }
//!     Ok(())
//! }
//! ```

#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

// Lets the derive macros resolve `::lattice` paths from inside this crate.
extern crate self as lattice;

pub mod config;
pub mod crc;
pub mod crypto;
pub mod error;
pub mod lockable;
pub mod logging;
pub mod message;
pub mod mux;
pub mod net;
pub mod pipe;
pub mod poller;
pub mod select;
pub mod registry;
pub mod serialize;

#[cfg(test)]
pub(crate) mod testkit;

pub use lattice_proc::{Message, Record};

pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::message::{downcast, Message, MessageId, MessageSize, MessageType};
    pub use crate::net::channel::Channel;
    pub use crate::registry::{deserialize_message, message_id_of, register_message};
    pub use crate::serialize::{ByteBuffer, Deserialize, Serialize};
    pub use lattice_proc::{Message, Record};
}
