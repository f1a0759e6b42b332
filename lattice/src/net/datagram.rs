//! Datagram messaging interface: one message per packet over UDP, with an
//! optional CRC32 trailer guarding against in-flight corruption.

use crate::config::ChannelConfig;
use crate::crc;
use crate::crypto::Cipher;
use crate::error::{Error, Result};
use crate::logging::{self, o, trace, Logger};
use crate::message::Message;
use crate::net::addr::NetAddr;
use crate::net::channel::{Channel, RECV_BUFFER, SEND_BUFFER};
use crate::net::link::{CipherPacket, PacketLink, PlainPacket};
use crate::registry;
use std::net::UdpSocket;
use std::sync::Arc;

/// Messaging interface over a datagram transport. Each send produces one
/// packet: the serialized payload, then the CRC trailer when enabled, then
/// the cipher pass when the link carries one.
pub struct DatagramChannel<L: PacketLink> {
    link: L,
    config: ChannelConfig,
    log: Logger,
}

impl DatagramChannel<PlainPacket> {
    /// Wraps a UDP socket. The socket must be connected for `send` and
    /// `receive`; `send_to` and `receive_from` work either way.
    #[inline]
    pub fn new<'a, G: Into<Option<&'a Logger>>>(
        socket: UdpSocket,
        config: ChannelConfig,
        log: G,
    ) -> DatagramChannel<PlainPacket> {
        DatagramChannel::from_link(PlainPacket::new(socket), config, log)
    }
}

impl<C: Cipher> DatagramChannel<CipherPacket<C>> {
    /// Wraps a UDP socket behind a shared cipher.
    #[inline]
    pub fn encrypted<'a, G: Into<Option<&'a Logger>>>(
        socket: UdpSocket,
        cipher: Arc<C>,
        config: ChannelConfig,
        log: G,
    ) -> DatagramChannel<CipherPacket<C>> {
        DatagramChannel::from_link(CipherPacket::new(socket, cipher), config, log)
    }
}

impl<L: PacketLink> DatagramChannel<L> {
    pub fn from_link<'a, G: Into<Option<&'a Logger>>>(
        link: L,
        config: ChannelConfig,
        log: G,
    ) -> DatagramChannel<L> {
        let channel_log = match log.into() {
            Some(log) => log.new(o!()),
            _ => logging::discard(),
        };

        DatagramChannel {
            link,
            config,
            log: channel_log,
        }
    }

    #[inline]
    pub fn link(&self) -> &L {
        &self.link
    }

    #[inline]
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Sends one message to the connected peer.
    pub fn send_message(&mut self, msg: &dyn Message) -> Result<bool> {
        let link = &mut self.link;
        let config = &self.config;
        let log = &self.log;

        SEND_BUFFER.with(|cell| {
            let buf = &mut *cell.borrow_mut();
            Self::pack(buf, msg, config, log)?;
            link.send_packet(buf)
        })
    }

    /// Sends one message to an explicit address.
    pub fn send_message_to(&mut self, msg: &dyn Message, addr: &NetAddr) -> Result<bool> {
        let link = &mut self.link;
        let config = &self.config;
        let log = &self.log;

        SEND_BUFFER.with(|cell| {
            let buf = &mut *cell.borrow_mut();
            Self::pack(buf, msg, config, log)?;
            link.send_packet_to(buf, addr)
        })
    }

    /// Receives one message from the connected peer. A corrupted datagram
    /// fails with `CorruptFrame`; the caller decides whether to keep
    /// listening.
    pub fn receive_message(&mut self) -> Result<Option<Box<dyn Message>>> {
        let link = &mut self.link;
        let config = &self.config;

        RECV_BUFFER.with(|cell| {
            let buf = &mut *cell.borrow_mut();
            buf.clear();
            buf.resize(config.max_packet_size, 0);

            if !link.recv_packet(buf)? {
                return Ok(None);
            }

            Self::unpack(buf, config).map(Some)
        })
    }

    /// Receives one message along with its sender address.
    pub fn receive_message_from(&mut self) -> Result<Option<(Box<dyn Message>, NetAddr)>> {
        let link = &mut self.link;
        let config = &self.config;

        RECV_BUFFER.with(|cell| {
            let buf = &mut *cell.borrow_mut();
            buf.clear();
            buf.resize(config.max_packet_size, 0);

            let from = match link.recv_packet_from(buf)? {
                Some(from) => from,
                None => return Ok(None),
            };

            let msg = Self::unpack(buf, config)?;
            Ok(Some((msg, from)))
        })
    }

    fn pack(
        buf: &mut Vec<u8>,
        msg: &dyn Message,
        config: &ChannelConfig,
        log: &Logger,
    ) -> Result<()> {
        buf.clear();
        msg.serialize_message(buf)?;

        if config.crc {
            crc::append_crc32(buf);
        }

        if buf.len() > config.max_packet_size {
            return Err(Error::OversizedFrame);
        }

        trace!(log, "sending datagram";
               "context" => "send",
               "name" => msg.message_name(),
               "size" => buf.len());

        Ok(())
    }

    fn unpack(buf: &mut Vec<u8>, config: &ChannelConfig) -> Result<Box<dyn Message>> {
        if config.crc {
            crc::strip_crc32(buf)?;
        }

        registry::deserialize_message(buf)
    }
}

impl<L: PacketLink> Channel for DatagramChannel<L> {
    #[inline]
    fn send(&mut self, msg: &dyn Message) -> Result<bool> {
        self.send_message(msg)
    }

    #[inline]
    fn receive(&mut self) -> Result<Option<Box<dyn Message>>> {
        self.receive_message()
    }
}
