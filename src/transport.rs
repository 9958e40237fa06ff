//! UDP transport: one JSON request per datagram, one reply per request.
//!
//! The server owns a single socket. Each datagram is handled on its own
//! task, and replies as well as stream pushes leave through the same socket,
//! so subscribers see pushes arrive from the address they sent
//! `createStream` to.

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tickvault_core::{PushError, PushSink, RecordDocument};
use tokio::net::UdpSocket;
use tracing::{error, info, trace};

/// Sends stream records to subscribers over the server socket.
#[derive(Debug, Clone)]
pub struct UdpPushSink {
    socket: Arc<UdpSocket>,
}

impl UdpPushSink {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl PushSink for UdpPushSink {
    async fn push(&self, endpoint: SocketAddr, document: Arc<RecordDocument>) -> Result<(), PushError> {
        let payload = serde_json::to_vec(&*document).map_err(|e| PushError {
            endpoint,
            reason: e.to_string(),
        })?;
        self.socket
            .send_to(&payload, endpoint)
            .await
            .map(|_| ())
            .map_err(|e| PushError {
                endpoint,
                reason: e.to_string(),
            })
    }
}

pub struct UdpServer {
    socket: Arc<UdpSocket>,
    dispatcher: Arc<Dispatcher>,
    recv_buffer_size: usize,
    max_datagram_size: usize,
}

impl UdpServer {
    /// Binds the socket and wires a dispatcher whose streams push through it.
    pub async fn bind(config: &ServerConfig) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(config.bind_address()).await?);
        let sink = Arc::new(UdpPushSink::new(Arc::clone(&socket)));
        let dispatcher = Arc::new(Dispatcher::with_sink(sink));

        Ok(Self {
            socket,
            dispatcher,
            recv_buffer_size: config.recv_buffer_size,
            max_datagram_size: config.max_datagram_size,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receives datagrams until the socket fails.
    pub async fn run(&self) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "UDP server started");
        let mut buf = vec![0u8; self.recv_buffer_size];

        loop {
            let (len, source) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                // ICMP port-unreachable from an earlier send surfaces here on
                // some platforms; it says nothing about this socket.
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => {
                    error!("failed to receive datagram: {}", e);
                    return Err(e);
                }
            };
            trace!(%source, len, "datagram received");

            let payload = buf[..len].to_vec();
            let socket = Arc::clone(&self.socket);
            let dispatcher = Arc::clone(&self.dispatcher);
            let max_size = self.max_datagram_size;
            tokio::spawn(async move {
                let reply = dispatcher.handle_datagram(&payload, source, max_size).await;
                if let Err(e) = socket.send_to(&reply, source).await {
                    error!(%source, "failed to send reply: {}", e);
                }
            });
        }
    }
}
