use std::{
    collections::VecDeque,
    io::{Read, Write},
    net::TcpStream,
    sync::{Arc, Mutex},
};

use crate::packet::{ClientboundPacket, ConnectionError, InboundPacketSet, RawPacket};

#[derive(Debug)]
struct ConnectionInner {
    stream: Option<TcpStream>,
    outbound: VecDeque<u8>,
}

impl ConnectionInner {
    /// Pushes as much of the outbound queue as the socket will take.
    /// Remaining bytes stay queued for the next flush.
    fn flush_outbound(&mut self) -> Result<(), ConnectionError> {
        let Some(stream) = self.stream.as_mut() else {
            self.outbound.clear();
            return Ok(());
        };
        while !self.outbound.is_empty() {
            match stream.write(self.outbound.make_contiguous()) {
                Ok(0) => {
                    self.stream = None;
                    self.outbound.clear();
                    break;
                }
                Ok(n) => {
                    self.outbound.drain(..n);
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err)
                    if err.kind() == std::io::ErrorKind::BrokenPipe
                        || err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    self.stream = None;
                    self.outbound.clear();
                    break;
                }
                Err(err) => return Err(err)?,
            }
        }
        Ok(())
    }
}

/// Cloneable write half of a [`Connection`]; what broadcast fan-out holds.
#[derive(Debug, Clone)]
pub struct ConnectionSender {
    inner: Arc<Mutex<ConnectionInner>>,
}

impl ConnectionSender {
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().stream.is_none()
    }

    /// Number of bytes queued but not yet accepted by the socket.
    pub fn pending_outbound(&self) -> usize {
        self.inner.lock().unwrap().outbound.len()
    }

    pub fn send(&self, packet: &impl ClientboundPacket) -> Result<(), ConnectionError> {
        let raw: RawPacket = packet.raw_packet()?;
        let mut inner = self.inner.lock().unwrap();
        if inner.stream.is_none() {
            return Ok(());
        }
        inner.outbound.extend(raw.into_bytes().iter());
        inner.flush_outbound()
    }

    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        let _ = inner.flush_outbound();
        inner.stream = None;
    }
}

#[derive(Debug)]
pub struct Connection {
    inner: Arc<Mutex<ConnectionInner>>,
    bytes: VecDeque<u8>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Result<Self, ConnectionError> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(ConnectionInner {
                stream: Some(stream),
                outbound: VecDeque::new(),
            })),
            bytes: VecDeque::new(),
        })
    }

    pub fn sender(&self) -> ConnectionSender {
        ConnectionSender {
            inner: self.inner.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().stream.is_none()
    }

    pub fn close(&self) {
        self.sender().close();
    }

    pub fn pending_outbound(&self) -> usize {
        self.inner.lock().unwrap().outbound.len()
    }

    pub fn send(&self, packet: &impl ClientboundPacket) -> Result<(), ConnectionError> {
        self.sender().send(packet)
    }

    /// Retries queued outbound bytes; call once per tick so a burst (level
    /// streaming) drains even when the peer reads slowly.
    pub fn flush(&self) -> Result<(), ConnectionError> {
        self.inner.lock().unwrap().flush_outbound()
    }

    fn recieve_bytes(&mut self) -> Result<(), ConnectionError> {
        let mut buf = [0u8; 1024];
        let mut inner = self.inner.lock().unwrap();
        let Some(stream) = inner.stream.as_mut() else {
            return Ok(());
        };
        loop {
            match stream.read(&mut buf) {
                Ok(0) => {
                    inner.stream = None;
                    break;
                }
                Ok(n) => self.bytes.extend(&buf[..n]),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    break;
                }
                Err(err)
                    if err.kind() == std::io::ErrorKind::BrokenPipe
                        || err.kind() == std::io::ErrorKind::UnexpectedEof
                        || err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    inner.stream = None;
                    break;
                }
                Err(err) => return Err(err)?,
            }
        }
        Ok(())
    }

    /// Pops one framed packet, or `None` when a full frame hasn't arrived.
    ///
    /// An id with no entry in the registry consumes only that byte and
    /// returns [`ConnectionError::UnsupportedPacket`]; the caller may log a
    /// discard and keep scanning the stream, which is how legacy servers
    /// recover from unknown packets in a length-less protocol.
    pub fn recieve_into<T: InboundPacketSet>(&mut self) -> Result<Option<T>, ConnectionError> {
        self.recieve_bytes()?;

        let Some(&id) = self.bytes.front() else {
            return Ok(None);
        };

        let Some(body_size) = T::body_size(id) else {
            self.bytes.pop_front();
            return Err(ConnectionError::UnsupportedPacket(id));
        };

        if self.bytes.len() < 1 + body_size {
            return Ok(None);
        }

        self.bytes.pop_front();
        let body: Vec<u8> = self.bytes.drain(..body_size).collect();
        T::decode(&RawPacket::new(id, body.into_boxed_slice())).map(Some)
    }
}
