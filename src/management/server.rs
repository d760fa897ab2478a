use super::command::{ManagementCommand, ERROR_REPLY};
use crate::error::ServerError;
use crate::metrics::MetricsStore;
use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest command line accepted before the connection is dropped
const LINE_LENGTH_MAX: usize = 64 * 1024;

/// TCP listener for the line-oriented management protocol.
pub struct ManagementServer {
    listener: TcpListener,
    store: MetricsStore,
}

impl ManagementServer {
    pub async fn bind(addr: &str, store: MetricsStore) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        info!("Management server listening on {}", listener.local_addr()?);
        Ok(ManagementServer { listener, store })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until cancelled, one task per client.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Management server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => {
                    let handler = ConnectionHandler::new(stream, self.store.clone(), addr);
                    let shutdown = shutdown.child_token();
                    tokio::spawn(async move {
                        handler.run(shutdown).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

struct ConnectionHandler {
    stream: TcpStream,
    store: MetricsStore,
    buffer: BytesMut,
    client_addr: SocketAddr,
}

impl ConnectionHandler {
    fn new(stream: TcpStream, store: MetricsStore, client_addr: SocketAddr) -> Self {
        ConnectionHandler {
            stream,
            store,
            buffer: BytesMut::with_capacity(4096),
            client_addr,
        }
    }

    async fn run(mut self, shutdown: CancellationToken) {
        info!("Client connected: {}", self.client_addr);

        match self.serve(shutdown).await {
            Ok(()) => info!("Client disconnected: {}", self.client_addr),
            Err(e) => error!("Connection error from {}: {}", self.client_addr, e),
        }
    }

    async fn serve(&mut self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let mut read_buf = [0u8; 4096];

        loop {
            while let Some(line) = self.next_line() {
                let Some(cmd) = ManagementCommand::parse(&line) else {
                    continue;
                };
                debug!("Command from {}: {:?}", self.client_addr, cmd);

                if cmd == ManagementCommand::Quit {
                    return Ok(());
                }
                if let ManagementCommand::Unknown(verb) = &cmd {
                    warn!("Unknown command from {}: {}", self.client_addr, verb);
                }

                let reply = cmd.execute(&self.store).await?;
                self.stream.write_all(reply.as_bytes()).await?;
                self.stream.flush().await?;
            }

            if self.buffer.len() > LINE_LENGTH_MAX {
                warn!("Line too long from {}, closing", self.client_addr);
                self.stream.write_all(ERROR_REPLY.as_bytes()).await?;
                return Ok(());
            }

            let n = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                n = self.stream.read(&mut read_buf) => n?,
            };
            if n == 0 {
                return Ok(());
            }
            self.buffer.extend_from_slice(&read_buf[..n]);
        }
    }

    /// Pop one complete line from the buffer, without its terminator.
    fn next_line(&mut self) -> Option<String> {
        let newline = memchr::memchr(b'\n', &self.buffer)?;
        let line = self.buffer.split_to(newline + 1);
        let line = &line[..newline];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        Some(String::from_utf8_lossy(line).into_owned())
    }
}
