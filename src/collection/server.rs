use super::parser::parse_packet;
use crate::error::ServerError;
use crate::metrics::{MetricsStore, StoreError};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counter bumped once per received datagram
pub const PACKETS_RECEIVED: &str = "statsd.packets_received";
/// Counter bumped once per undecodable line or bit
pub const BAD_LINES_SEEN: &str = "statsd.bad_lines_seen";

/// Default datagram read size
pub const DEFAULT_MAX_PACKET_SIZE: usize = 512;

/// Pause after a transient receive error before reading again
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Errors a UDP socket can report for one datagram without being broken.
fn is_transient_recv_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// UDP listener feeding decoded updates into the store.
pub struct CollectionServer {
    socket: UdpSocket,
    store: MetricsStore,
    max_packet_size: usize,
}

impl CollectionServer {
    pub async fn bind(
        addr: &str,
        store: MetricsStore,
        max_packet_size: usize,
    ) -> Result<Self, ServerError> {
        debug_assert!(max_packet_size > 0, "packet buffer must be non-empty");
        let socket = UdpSocket::bind(addr).await?;
        info!("Collection server listening on {}", socket.local_addr()?);
        Ok(CollectionServer {
            socket,
            store,
            max_packet_size,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive datagrams until cancelled, the store closes or the socket fails.
    ///
    /// Transient receive errors are retried after a short pause.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let mut packet = vec![0u8; self.max_packet_size];

        loop {
            let (n, peer) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Collection server shutting down");
                    return Ok(());
                }
                received = self.socket.recv_from(&mut packet) => match received {
                    Ok(received) => received,
                    Err(e) if is_transient_recv_error(&e) => {
                        warn!("Transient receive error: {}", e);
                        tokio::select! {
                            _ = shutdown.cancelled() => return Ok(()),
                            _ = tokio::time::sleep(RECV_ERROR_BACKOFF) => continue,
                        }
                    }
                    Err(e) => {
                        error!("Failed to receive datagram: {}", e);
                        return Err(e.into());
                    }
                },
            };

            debug!("Received {} bytes from {}", n, peer);
            self.handle_packet(&packet[..n]).await?;
        }
    }

    async fn handle_packet(&self, packet: &[u8]) -> Result<(), StoreError> {
        self.store.update_counter(PACKETS_RECEIVED, 1.0, 1.0).await?;

        let parsed = parse_packet(packet);
        if parsed.bad_lines > 0 {
            warn!("Packet contained {} bad line(s)", parsed.bad_lines);
            self.store
                .update_counter(BAD_LINES_SEEN, parsed.bad_lines as f64, 1.0)
                .await?;
        }

        for update in parsed.updates {
            match self.store.apply_update(update).await {
                Ok(()) => {}
                Err(StoreError::Closed) => return Err(StoreError::Closed),
                Err(e) => warn!("Rejected update: {}", e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::StoreConfig;

    #[test]
    fn test_recv_error_classification() {
        for kind in [
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionRefused,
            io::ErrorKind::Interrupted,
            io::ErrorKind::WouldBlock,
        ] {
            assert!(is_transient_recv_error(&io::Error::from(kind)), "{:?}", kind);
        }
        for kind in [
            io::ErrorKind::PermissionDenied,
            io::ErrorKind::InvalidInput,
            io::ErrorKind::Other,
        ] {
            assert!(!is_transient_recv_error(&io::Error::from(kind)), "{:?}", kind);
        }
    }

    #[tokio::test]
    async fn test_run_returns_on_cancel() {
        let store = MetricsStore::spawn(StoreConfig::default());
        let server = CollectionServer::bind("127.0.0.1:0", store, DEFAULT_MAX_PACKET_SIZE)
            .await
            .unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.run(shutdown.clone()));

        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
