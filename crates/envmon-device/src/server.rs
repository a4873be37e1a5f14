//! One-request-at-a-time HTTP responder for the reading endpoint.
//!
//! Routing and response encoding live in [`envmon_core::http`]; this module
//! owns the socket.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use envmon_core::http;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, info, trace};

/// Largest request prefix read from a client.
pub const MAX_REQUEST_BYTES: usize = 1024;

/// Pending connections queued by the listener.
const BACKLOG: u32 = 1;

#[derive(Debug, Error)]
pub enum BindError {
    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),

    #[error("invalid port: {0}")]
    InvalidPort(u32),

    #[error("failed to bind {addr}: {source}")]
    Io {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Listening socket plus the serve-one-request loop body.
pub struct ResponseServer {
    listener: Option<TcpListener>,
    accept_timeout: Duration,
}

impl ResponseServer {
    pub fn new(accept_timeout: Duration) -> Self {
        Self {
            listener: None,
            accept_timeout,
        }
    }

    /// Bind to `ip:port` and listen.
    ///
    /// Any previous listener is closed first.
    pub fn bind(&mut self, ip: &str, port: u32) -> Result<SocketAddr, BindError> {
        if !http::is_valid_ipv4(ip) {
            return Err(BindError::InvalidAddress(ip.to_string()));
        }
        let port = u16::try_from(port).map_err(|_| BindError::InvalidPort(port))?;
        let ip: Ipv4Addr = ip
            .parse()
            .map_err(|_| BindError::InvalidAddress(ip.to_string()))?;
        let addr = SocketAddr::V4(SocketAddrV4::new(ip, port));

        self.close();
        let listener = listen(addr).map_err(|source| BindError::Io { addr, source })?;
        let local = listener
            .local_addr()
            .map_err(|source| BindError::Io { addr, source })?;

        info!(%local, "HTTP server listening");
        self.listener = Some(listener);
        Ok(local)
    }

    pub fn is_bound(&self) -> bool {
        self.listener.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Drop the listener, if any.
    pub fn close(&mut self) {
        if let Some(listener) = self.listener.take() {
            debug!(local = ?listener.local_addr().ok(), "HTTP server closed");
        }
    }

    /// Wait for one connection and answer it.
    ///
    /// `values` are the temperatures in sensor order and `ip` the host used
    /// in redirects. Returns false when nothing was accepted within the
    /// accept timeout, on an accept error, or when not bound.
    pub async fn serve_once(&self, values: &[Option<f32>], ip: &str) -> bool {
        let Some(listener) = &self.listener else {
            return false;
        };

        let (stream, peer) =
            match tokio::time::timeout(self.accept_timeout, listener.accept()).await {
                Ok(Ok(accepted)) => accepted,
                Ok(Err(e)) => {
                    debug!(error = %e, "accept failed");
                    return false;
                }
                Err(_) => {
                    trace!("no connection within accept timeout");
                    return false;
                }
            };

        trace!(%peer, "connection accepted");
        if let Err(e) = self.answer(stream, values, ip).await {
            debug!(%peer, error = %e, "failed to answer request");
        }
        true
    }

    async fn answer(&self, mut stream: TcpStream, values: &[Option<f32>], ip: &str) -> io::Result<()> {
        let mut buf = [0u8; MAX_REQUEST_BYTES];
        let n = match tokio::time::timeout(self.accept_timeout, stream.read(&mut buf)).await {
            Ok(read) => read?,
            Err(_) => {
                debug!("client sent nothing before the timeout");
                return Ok(());
            }
        };

        let request = String::from_utf8_lossy(&buf[..n]);
        let line = request.lines().next().unwrap_or_default();

        match http::respond(line, values, ip) {
            Some(response) => {
                debug!(request = %line, status = response.status.code(), "HTTP request");
                stream.write_all(response.encode().as_bytes()).await?;
                stream.shutdown().await?;
            }
            None => debug!(request = %line, "malformed request line"),
        }
        Ok(())
    }
}

fn listen(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(BACKLOG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn test_bind_validation() {
        let mut server = ResponseServer::new(Duration::from_secs(1));

        assert!(matches!(
            server.bind("999.1.1.1", 80),
            Err(BindError::InvalidAddress(_))
        ));
        assert!(matches!(
            server.bind("1.2.3", 80),
            Err(BindError::InvalidAddress(_))
        ));
        assert!(matches!(
            server.bind("127.0.0.1", 70000),
            Err(BindError::InvalidPort(70000))
        ));
        assert!(!server.is_bound());
    }

    async fn bound_server(timeout: Duration) -> ResponseServer {
        let mut server = ResponseServer::new(timeout);
        server.bind("127.0.0.1", 0).unwrap();
        server
    }

    async fn request(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_serves_reading() {
        let server = Arc::new(bound_server(Duration::from_secs(5)).await);
        let addr = server.local_addr().unwrap();

        let handle = {
            let server = server.clone();
            tokio::spawn(async move { server.serve_once(&[Some(22.0), None], "127.0.0.1").await })
        };

        let response = request(addr, "GET /?sensor=1 HTTP/1.1\r\nHost: x\r\n\r\n").await;
        assert!(handle.await.unwrap());
        assert_eq!(response, "HTTP/1.1 200 OK\r\nContent-type: text/plain\r\n\r\n??");
    }

    #[tokio::test]
    async fn test_redirect_uses_device_ip() {
        let server = Arc::new(bound_server(Duration::from_secs(5)).await);
        let addr = server.local_addr().unwrap();

        let handle = {
            let server = server.clone();
            tokio::spawn(async move { server.serve_once(&[Some(22.0)], "192.168.1.10").await })
        };

        let response = request(addr, "GET / HTTP/1.0\r\n\r\n").await;
        assert!(handle.await.unwrap());
        assert_eq!(
            response,
            "HTTP/1.0 307 Temporary Redirect\r\nLocation: http://192.168.1.10/?sensor=0\r\n\r\n22"
        );
    }

    #[tokio::test]
    async fn test_malformed_request_is_closed_silently() {
        let server = Arc::new(bound_server(Duration::from_secs(5)).await);
        let addr = server.local_addr().unwrap();

        let handle = {
            let server = server.clone();
            tokio::spawn(async move { server.serve_once(&[Some(1.0)], "127.0.0.1").await })
        };

        let response = request(addr, "hello\r\n").await;
        assert!(handle.await.unwrap());
        assert_eq!(response, "");
    }

    #[tokio::test]
    async fn test_accept_timeout() {
        let server = bound_server(Duration::from_millis(50)).await;
        assert!(!server.serve_once(&[None], "127.0.0.1").await);
    }

    #[tokio::test]
    async fn test_unbound_server_serves_nothing() {
        let server = ResponseServer::new(Duration::from_millis(10));
        assert!(!server.serve_once(&[None], "127.0.0.1").await);
    }

    #[tokio::test]
    async fn test_close() {
        let mut server = bound_server(Duration::from_millis(10)).await;
        assert!(server.is_bound());
        server.close();
        assert!(!server.is_bound());
        assert_eq!(server.local_addr(), None);
    }
}
