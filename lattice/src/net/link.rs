//! Byte-level links underneath the framing layers.
//!
//! A link moves whole chunks (stream) or whole packets (datagram) and
//! reports peer closure as an orderly `false` instead of an error. The
//! cipher variants decorate exactly this level: every outgoing chunk is
//! encrypted before it touches the transport and every incoming chunk is
//! decrypted right after it arrives, so framing above stays unchanged.

use crate::crypto::Cipher;
use crate::error::{Error, Result};
use crate::net::addr::NetAddr;
use crate::serialize::ByteBuffer;
use std::io::{self, Read, Write};
use std::net::UdpSocket;
use std::sync::Arc;

/// Byte transfer capability of a stream transport (TCP, TLS or anything
/// else that reads and writes bytes in order).
pub trait StreamLink {
    /// Writes the whole chunk. `Ok(false)` means the peer is gone. The
    /// chunk may be transformed in place (cipher links scramble it).
    fn send_chunk(&mut self, chunk: &mut ByteBuffer) -> Result<bool>;

    /// Fills the chunk exactly. `Ok(false)` means the stream ended first.
    fn recv_chunk(&mut self, chunk: &mut ByteBuffer) -> Result<bool>;
}

/// Byte transfer capability of a datagram transport.
pub trait PacketLink {
    /// Sends the packet to the connected peer. `Ok(false)` means the peer
    /// reported itself unreachable.
    fn send_packet(&mut self, packet: &mut ByteBuffer) -> Result<bool>;

    /// Sends the packet to an explicit address.
    fn send_packet_to(&mut self, packet: &mut ByteBuffer, addr: &NetAddr) -> Result<bool>;

    /// Receives one datagram into the packet buffer, shrinking it to the
    /// received size.
    fn recv_packet(&mut self, packet: &mut ByteBuffer) -> Result<bool>;

    /// Receives one datagram, also reporting the sender.
    fn recv_packet_from(&mut self, packet: &mut ByteBuffer) -> Result<Option<NetAddr>>;
}

#[inline]
fn is_closed(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::WriteZero
    )
}

fn fold_io<T>(result: io::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if is_closed(err.kind()) => Ok(None),
        Err(err) => Err(Error::from(err)),
    }
}

/// The unencrypted stream link over any blocking reader/writer.
pub struct PlainLink<T> {
    inner: T,
}

impl<T> PlainLink<T> {
    #[inline]
    pub fn new(inner: T) -> PlainLink<T> {
        PlainLink { inner }
    }

    #[inline]
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Write> StreamLink for PlainLink<T> {
    fn send_chunk(&mut self, chunk: &mut ByteBuffer) -> Result<bool> {
        Ok(fold_io(self.inner.write_all(chunk))?.is_some())
    }

    fn recv_chunk(&mut self, chunk: &mut ByteBuffer) -> Result<bool> {
        Ok(fold_io(self.inner.read_exact(chunk))?.is_some())
    }
}

/// Stream link that scrambles every chunk with a shared cipher. Both peers
/// must hold the same key; the size prefix travels scrambled too.
pub struct CipherLink<T, C = crate::crypto::XorCipher> {
    inner: T,
    cipher: Arc<C>,
}

impl<T, C> CipherLink<T, C> {
    #[inline]
    pub fn new(inner: T, cipher: Arc<C>) -> CipherLink<T, C> {
        CipherLink { inner, cipher }
    }

    #[inline]
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    #[inline]
    pub fn cipher(&self) -> &Arc<C> {
        &self.cipher
    }
}

impl<T: Read + Write, C: Cipher> StreamLink for CipherLink<T, C> {
    fn send_chunk(&mut self, chunk: &mut ByteBuffer) -> Result<bool> {
        self.cipher.encrypt(chunk);
        Ok(fold_io(self.inner.write_all(chunk))?.is_some())
    }

    fn recv_chunk(&mut self, chunk: &mut ByteBuffer) -> Result<bool> {
        if fold_io(self.inner.read_exact(chunk))?.is_none() {
            return Ok(false);
        }

        self.cipher.decrypt(chunk);
        Ok(true)
    }
}

/// The unencrypted datagram link.
pub struct PlainPacket {
    socket: UdpSocket,
}

impl PlainPacket {
    #[inline]
    pub fn new(socket: UdpSocket) -> PlainPacket {
        PlainPacket { socket }
    }

    #[inline]
    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }
}

impl PacketLink for PlainPacket {
    fn send_packet(&mut self, packet: &mut ByteBuffer) -> Result<bool> {
        Ok(fold_io(self.socket.send(packet))?.is_some())
    }

    fn send_packet_to(&mut self, packet: &mut ByteBuffer, addr: &NetAddr) -> Result<bool> {
        let target: ::std::net::SocketAddr = (*addr).into();
        Ok(fold_io(self.socket.send_to(packet, target))?.is_some())
    }

    fn recv_packet(&mut self, packet: &mut ByteBuffer) -> Result<bool> {
        match fold_io(self.socket.recv(packet))? {
            Some(received) => {
                packet.truncate(received);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn recv_packet_from(&mut self, packet: &mut ByteBuffer) -> Result<Option<NetAddr>> {
        match fold_io(self.socket.recv_from(packet))? {
            Some((received, from)) => {
                packet.truncate(received);
                Ok(Some(NetAddr::from(from)))
            }
            None => Ok(None),
        }
    }
}

/// Datagram link that scrambles whole packets with a shared cipher.
pub struct CipherPacket<C = crate::crypto::XorCipher> {
    inner: PlainPacket,
    cipher: Arc<C>,
}

impl<C> CipherPacket<C> {
    #[inline]
    pub fn new(socket: UdpSocket, cipher: Arc<C>) -> CipherPacket<C> {
        CipherPacket {
            inner: PlainPacket::new(socket),
            cipher,
        }
    }

    #[inline]
    pub fn socket(&self) -> &UdpSocket {
        self.inner.socket()
    }
}

impl<C: Cipher> PacketLink for CipherPacket<C> {
    fn send_packet(&mut self, packet: &mut ByteBuffer) -> Result<bool> {
        self.cipher.encrypt(packet);
        self.inner.send_packet(packet)
    }

    fn send_packet_to(&mut self, packet: &mut ByteBuffer, addr: &NetAddr) -> Result<bool> {
        self.cipher.encrypt(packet);
        self.inner.send_packet_to(packet, addr)
    }

    fn recv_packet(&mut self, packet: &mut ByteBuffer) -> Result<bool> {
        if !self.inner.recv_packet(packet)? {
            return Ok(false);
        }

        self.cipher.decrypt(packet);
        Ok(true)
    }

    fn recv_packet_from(&mut self, packet: &mut ByteBuffer) -> Result<Option<NetAddr>> {
        match self.inner.recv_packet_from(packet)? {
            Some(from) => {
                self.cipher.decrypt(packet);
                Ok(Some(from))
            }
            None => Ok(None),
        }
    }
}
