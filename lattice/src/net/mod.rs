//! Networking: addresses, the byte-level links and the framed messaging
//! channels built on top of them.

pub mod addr;
pub mod channel;
pub mod datagram;
pub mod link;
pub mod multi_receiver;
