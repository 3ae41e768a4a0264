//! Socket wrappers over the pure-Rust ZeroMQ implementation.

use bytes::Bytes;
use tracing::{debug, warn};
use zeromq::{
    PubSocket, PullSocket, PushSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage,
};

use super::{Address, SocketOptions};
use crate::context::Context;
use crate::{BsreadError, Result};

/// Socket pattern on the sending side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SenderKind {
    /// Fan-out to all subscribers; lossy towards slow ones.
    #[default]
    Pub,
    /// Round-robin load balancing with blocking at the high-water mark.
    Push,
}

/// Socket pattern on the receiving side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReceiverKind {
    /// Subscribes to the empty topic (receive-all).
    #[default]
    Sub,
    Pull,
}

fn warn_unsupported_options(options: &SocketOptions) {
    // The pure-Rust backend currently exposes no tuning knobs; surface
    // every configured value instead of silently ignoring it.
    let defaults = SocketOptions::default();
    if options.high_water_mark != defaults.high_water_mark
        || options.linger_ms != defaults.linger_ms
    {
        warn!(
            high_water_mark = options.high_water_mark,
            linger_ms = options.linger_ms,
            "high-water mark and linger are not applied by the pure-Rust zeromq backend"
        );
    }
    if options.receive_buffer_size.is_some() || options.send_buffer_size.is_some() {
        warn!("socket buffer sizes are not applied by the pure-Rust zeromq backend");
    }
}

/// Sending half of a connection: a PUB or PUSH socket tied to a [`Context`].
pub struct SenderSocket {
    inner: SenderInner,
    context: Context,
    endpoint: String,
}

enum SenderInner {
    Pub(PubSocket),
    Push(PushSocket),
}

impl SenderSocket {
    /// Open a sending socket; binds or connects per the address form.
    pub async fn open(
        context: &Context,
        kind: SenderKind,
        address: &Address,
        options: &SocketOptions,
    ) -> Result<Self> {
        warn_unsupported_options(options);
        let (inner, endpoint) = match kind {
            SenderKind::Pub => {
                let mut socket = PubSocket::new();
                let endpoint = attach(&mut socket, address).await?;
                (SenderInner::Pub(socket), endpoint)
            }
            SenderKind::Push => {
                let mut socket = PushSocket::new();
                let endpoint = attach(&mut socket, address).await?;
                (SenderInner::Push(socket), endpoint)
            }
        };
        context.socket_opened();
        debug!("Opened {:?} sender socket at {}", kind, endpoint);
        Ok(Self { inner, context: context.clone(), endpoint })
    }

    /// Endpoint after bind resolution (wildcard ports are replaced by the
    /// real one).
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one multipart message.
    pub async fn send(&mut self, frames: Vec<Vec<u8>>) -> Result<()> {
        let mut iter = frames.into_iter();
        let first = iter.next().ok_or_else(|| BsreadError::framing("send", "empty message"))?;
        let mut msg = ZmqMessage::from(Bytes::from(first));
        for frame in iter {
            msg.push_back(Bytes::from(frame));
        }
        match &mut self.inner {
            SenderInner::Pub(s) => s.send(msg).await?,
            SenderInner::Push(s) => s.send(msg).await?,
        }
        Ok(())
    }

    /// Close the socket and release its context slot.
    pub async fn close(self) {
        match self.inner {
            SenderInner::Pub(s) => s.close().await,
            SenderInner::Push(s) => s.close().await,
        };
        self.context.socket_closed();
    }
}

/// Receiving half of a connection: a SUB or PULL socket tied to a
/// [`Context`].
pub struct ReceiverSocket {
    inner: ReceiverInner,
    context: Context,
}

enum ReceiverInner {
    Sub(SubSocket),
    Pull(PullSocket),
}

impl ReceiverSocket {
    /// Open a receiving socket; SUB subscribes to the empty topic.
    pub async fn open(
        context: &Context,
        kind: ReceiverKind,
        address: &Address,
        options: &SocketOptions,
    ) -> Result<Self> {
        warn_unsupported_options(options);
        let inner = match kind {
            ReceiverKind::Sub => {
                let mut socket = SubSocket::new();
                attach(&mut socket, address).await?;
                socket.subscribe("").await?;
                ReceiverInner::Sub(socket)
            }
            ReceiverKind::Pull => {
                let mut socket = PullSocket::new();
                attach(&mut socket, address).await?;
                ReceiverInner::Pull(socket)
            }
        };
        context.socket_opened();
        debug!("Opened {:?} receiver socket for {}", kind, address);
        Ok(Self { inner, context: context.clone() })
    }

    /// Receive one whole multipart message.
    pub async fn recv(&mut self) -> Result<Vec<Bytes>> {
        let msg = match &mut self.inner {
            ReceiverInner::Sub(s) => s.recv().await?,
            ReceiverInner::Pull(s) => s.recv().await?,
        };
        Ok(msg.into_vec())
    }

    /// Close the socket and release its context slot.
    pub async fn close(self) {
        match self.inner {
            ReceiverInner::Sub(s) => s.close().await,
            ReceiverInner::Pull(s) => s.close().await,
        };
        self.context.socket_closed();
    }
}

async fn attach<S: Socket>(socket: &mut S, address: &Address) -> Result<String> {
    let endpoint = address.endpoint();
    if address.is_bind() {
        let bound = socket.bind(&endpoint).await.map_err(|e| BsreadError::Connect {
            address: endpoint.clone(),
            reason: "bind failed".to_string(),
            source: Some(Box::new(e)),
        })?;
        Ok(bound.to_string())
    } else {
        socket.connect(&endpoint).await.map_err(|e| BsreadError::Connect {
            address: endpoint.clone(),
            reason: "connect failed".to_string(),
            source: Some(Box::new(e)),
        })?;
        Ok(endpoint)
    }
}
