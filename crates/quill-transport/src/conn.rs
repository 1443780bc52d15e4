//! Connection and listener wrappers.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use quill_msg::Message;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

use crate::codec::MessageCodec;
use crate::{Result, TransportError};

/// One framed, bidirectional message stream over TCP.
pub struct Transport {
    peer: SocketAddr,
    framed: Framed<TcpStream, MessageCodec>,
}

impl Transport {
    /// Connects to a remote peer.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::from_stream(stream)
    }

    /// Wraps an already accepted stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        Ok(Self {
            peer,
            framed: Framed::new(stream, MessageCodec::new()),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.framed.get_ref().local_addr()?)
    }

    /// Sends one message.
    pub async fn send(&mut self, msg: Message) -> Result<()> {
        self.framed.send(msg).await
    }

    /// Receives the next message; `None` means the peer closed cleanly.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        self.framed.next().await.transpose()
    }

    /// Request/response round trip on this connection.
    pub async fn call(&mut self, msg: Message) -> Result<Message> {
        self.send(msg).await?;
        self.recv().await?.ok_or(TransportError::Closed)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").field("peer", &self.peer).finish()
    }
}

/// Accepting side of the transport.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let inner = TcpListener::bind(addr).await?;
        Ok(Self { inner })
    }

    /// The bound address; useful with port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    pub async fn accept(&self) -> Result<(Transport, SocketAddr)> {
        let (stream, peer) = self.inner.accept().await?;
        Ok((Transport::from_stream(stream)?, peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_msg::{OpCode, Status};

    #[tokio::test]
    async fn request_response_over_loopback() {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            while let Some(req) = conn.recv().await.unwrap() {
                let reply = Message::reply_ok(req.op().unwrap(), req.payload.as_str());
                conn.send(reply).await.unwrap();
            }
        });

        let mut client = Transport::connect(addr).await.unwrap();
        let resp = client
            .call(Message::request(OpCode::View, "alice", "", "-a"))
            .await
            .unwrap();
        assert_eq!(resp.status().unwrap(), Status::Success);
        assert_eq!(resp.payload.as_str(), "-a");

        drop(client);
        server.await.unwrap();
    }
}
