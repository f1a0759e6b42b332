//! Stream messaging interface: size-prefix framing of serialized messages
//! over any ordered byte transport (TCP, TLS, anything `Read + Write`).
//!
//! Serialization scratch lives in thread-local buffers so steady-state send
//! and receive do not allocate.

use crate::config::ChannelConfig;
use crate::crypto::Cipher;
use crate::error::{Error, Result};
use crate::logging::{self, o, trace, Logger};
use crate::message::{Message, MessageSize};
use crate::net::link::{CipherLink, PlainLink, StreamLink};
use crate::registry;
use crate::serialize::{ByteBuffer, Deserialize, Serialize};
use std::cell::RefCell;
use std::io::{Read, Write};
use std::mem;
use std::sync::Arc;

thread_local! {
    pub(crate) static SEND_BUFFER: RefCell<ByteBuffer> = RefCell::new(ByteBuffer::new());
    pub(crate) static RECV_BUFFER: RefCell<ByteBuffer> = RefCell::new(ByteBuffer::new());
}

/// One framed message in, one framed message out. `send` reports `false`
/// and `receive` reports `None` when the peer is gone; both are orderly
/// outcomes, not errors.
pub trait Channel {
    fn send(&mut self, msg: &dyn Message) -> Result<bool>;

    fn receive(&mut self) -> Result<Option<Box<dyn Message>>>;
}

/// Messaging interface over a stream transport. The frame is a
/// `MessageSize` length prefix in network order followed by exactly that
/// many payload bytes (message id plus body).
pub struct StreamChannel<L: StreamLink> {
    link: L,
    config: ChannelConfig,
    // Scratch for the length prefix; sized by the frame format, reused
    // across calls.
    prefix: ByteBuffer,
    log: Logger,
}

impl<T: Read + Write> StreamChannel<PlainLink<T>> {
    /// Wraps a plain transport.
    #[inline]
    pub fn new<'a, G: Into<Option<&'a Logger>>>(
        transport: T,
        config: ChannelConfig,
        log: G,
    ) -> StreamChannel<PlainLink<T>> {
        StreamChannel::from_link(PlainLink::new(transport), config, log)
    }
}

impl<T: Read + Write, C: Cipher> StreamChannel<CipherLink<T, C>> {
    /// Wraps a transport behind a shared cipher. Both peers must hold the
    /// same key; the length prefix travels scrambled as well.
    #[inline]
    pub fn encrypted<'a, G: Into<Option<&'a Logger>>>(
        transport: T,
        cipher: Arc<C>,
        config: ChannelConfig,
        log: G,
    ) -> StreamChannel<CipherLink<T, C>> {
        StreamChannel::from_link(CipherLink::new(transport, cipher), config, log)
    }
}

impl<L: StreamLink> StreamChannel<L> {
    /// Builds a channel over an arbitrary link.
    pub fn from_link<'a, G: Into<Option<&'a Logger>>>(
        link: L,
        config: ChannelConfig,
        log: G,
    ) -> StreamChannel<L> {
        let channel_log = match log.into() {
            Some(log) => log.new(o!()),
            _ => logging::discard(),
        };

        StreamChannel {
            link,
            config,
            prefix: ByteBuffer::with_capacity(mem::size_of::<MessageSize>()),
            log: channel_log,
        }
    }

    #[inline]
    pub fn link(&self) -> &L {
        &self.link
    }

    #[inline]
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    #[inline]
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Serializes and frames one message. `Ok(false)` means the peer closed
    /// the transport.
    pub fn send_message(&mut self, msg: &dyn Message) -> Result<bool> {
        let link = &mut self.link;
        let prefix = &mut self.prefix;
        let log = &self.log;

        SEND_BUFFER.with(|cell| {
            let buf = &mut *cell.borrow_mut();
            buf.clear();

            msg.serialize_message(buf)?;

            if buf.len() > MessageSize::max_value() as usize {
                return Err(Error::OversizedFrame);
            }

            trace!(log, "sending message";
                   "context" => "send",
                   "name" => msg.message_name(),
                   "size" => buf.len());

            prefix.clear();
            (buf.len() as MessageSize).serialize(prefix);

            if !link.send_chunk(prefix)? {
                return Ok(false);
            }

            link.send_chunk(buf)
        })
    }

    /// Unframes and deserializes one message. `Ok(None)` means the peer
    /// closed the stream, cleanly or mid-frame.
    pub fn receive_message(&mut self) -> Result<Option<Box<dyn Message>>> {
        let link = &mut self.link;
        let prefix = &mut self.prefix;
        let log = &self.log;

        prefix.clear();
        prefix.resize(mem::size_of::<MessageSize>(), 0);

        if !link.recv_chunk(prefix)? {
            return Ok(None);
        }

        let mut pos = 0;
        let size = MessageSize::deserialize(prefix, &mut pos)? as usize;

        // Refuse to allocate whatever a broken or hostile peer claims.
        if size > self.config.max_message_size {
            return Err(Error::OversizedFrame);
        }

        trace!(log, "receiving message";
               "context" => "receive",
               "size" => size);

        RECV_BUFFER.with(|cell| {
            let buf = &mut *cell.borrow_mut();
            buf.clear();
            buf.resize(size, 0);

            if !link.recv_chunk(buf)? {
                return Ok(None);
            }

            registry::deserialize_message(buf).map(Some)
        })
    }
}

impl<L: StreamLink> Channel for StreamChannel<L> {
    #[inline]
    fn send(&mut self, msg: &dyn Message) -> Result<bool> {
        self.send_message(msg)
    }

    #[inline]
    fn receive(&mut self) -> Result<Option<Box<dyn Message>>> {
        self.receive_message()
    }
}
