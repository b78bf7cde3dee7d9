use crate::error::Error;
use crate::netx::conn::{Limits, LoggingConn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, warn};

/// Connection handler run once per accepted connection, on its own task.
///
/// The handler owns the connection and is responsible for closing it.
#[async_trait::async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, conn: LoggingConn);
}

/// TCP listener (optionally TLS) dispatching every connection to a [`Handler`].
pub struct Server<H> {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    limits: Limits,
    handler: Arc<H>,
}

impl<H: Handler> Server<H> {
    /// Bind the listener. Once this returns the server accepts connections as soon as
    /// [`Server::serve`] is polled; failure to bind is returned, never retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the address can't be bound.
    pub async fn bind(
        addr: SocketAddr,
        tls: Option<TlsAcceptor>,
        limits: Limits,
        handler: H,
    ) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Server {
            listener,
            tls,
            limits,
            handler: Arc::new(handler),
        })
    }

    /// The address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the socket address can't be read.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever. A failed accept is logged and the loop continues.
    pub async fn serve(self) -> Result<(), Error> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    error!("failed to accept connection: {err}");
                    continue;
                }
            };
            debug!(peer = %peer, "accepted connection");

            let tls = self.tls.clone();
            let limits = self.limits;
            let handler = self.handler.clone();

            tokio::spawn(async move {
                let conn = match tls {
                    None => LoggingConn::new(stream, peer, false, limits),
                    Some(acceptor) => {
                        let handshake =
                            tokio::time::timeout(limits.idle_timeout, acceptor.accept(stream));
                        match handshake.await {
                            Ok(Ok(tls_stream)) => LoggingConn::new(tls_stream, peer, true, limits),
                            Ok(Err(err)) => {
                                warn!(peer = %peer, "TLS handshake failed: {err}");
                                return;
                            }
                            Err(_) => {
                                warn!(peer = %peer, "TLS handshake timed out");
                                return;
                            }
                        }
                    }
                };
                handler.handle(conn).await;
            });
        }
    }
}
