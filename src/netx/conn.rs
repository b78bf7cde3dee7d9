use crate::error::Error;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf,
};
use tokio::time::{timeout_at, Instant};
use tokio_rustls::TlsAcceptor;

/// Any bidirectional byte stream a session can run over: plain TCP, TLS, or an in-memory pipe.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

type BoxStream = Box<dyn Stream>;

/// Per-connection bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum time a single read or write may wait for the peer.
    pub idle_timeout: Duration,
    /// Maximum lifetime of the whole connection.
    pub session_timeout: Duration,
    /// Maximum number of bytes consumed from the peer.
    pub max_bytes: u64,
    /// Maximum length of a single line, terminator included.
    pub max_line_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            idle_timeout: Duration::from_secs(5),
            session_timeout: Duration::from_secs(30),
            max_bytes: 1 << 20,
            max_line_length: 64 * 1024,
        }
    }
}

/// Captured conversation: what was read, what was written, and both interleaved.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub read: Vec<u8>,
    pub written: Vec<u8>,
    pub combined: Vec<u8>,
}

impl Transcript {
    fn record_read(&mut self, data: &[u8]) {
        self.read.extend_from_slice(data);
        self.combined.extend_from_slice(data);
    }

    fn record_write(&mut self, data: &[u8]) {
        self.written.extend_from_slice(data);
        self.combined.extend_from_slice(data);
    }
}

/// Stream wrapper copying every byte that passes through it into a [`Transcript`].
struct Tee {
    inner: BoxStream,
    transcript: Transcript,
}

impl AsyncRead for Tee {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                this.transcript.record_read(&buf.filled()[before..]);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

impl AsyncWrite for Tee {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                this.transcript.record_write(&buf[..n]);
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// What is left of a [`LoggingConn`] after it has been closed.
#[derive(Debug, Clone)]
pub struct Closed {
    pub transcript: Transcript,
    /// Whether the connection was TLS protected when it was closed.
    pub secure: bool,
}

/// Failed [`LoggingConn::upgrade`]. The connection is gone but its transcript is not.
#[derive(Debug)]
pub struct UpgradeError {
    pub closed: Closed,
    pub error: Error,
}

/// A connection that logs the whole conversation and bounds every I/O operation.
///
/// Each read and write waits at most until `min(now + idle_timeout, start + session_timeout)`.
/// The conversation is handed back exactly once, by [`LoggingConn::close`] (or by a failed
/// [`LoggingConn::upgrade`]), both of which consume the connection.
pub struct LoggingConn {
    io: BufReader<Tee>,
    remote_addr: SocketAddr,
    secure: bool,
    limits: Limits,
    session_deadline: Instant,
    consumed: u64,
}

impl LoggingConn {
    /// Wrap a freshly accepted stream. The session clock starts now.
    pub fn new<S>(stream: S, remote_addr: SocketAddr, secure: bool, limits: Limits) -> Self
    where
        S: Stream + 'static,
    {
        Self::seeded(
            Box::new(stream),
            Transcript::default(),
            remote_addr,
            secure,
            limits,
            Instant::now() + limits.session_timeout,
            0,
        )
    }

    fn seeded(
        inner: BoxStream,
        transcript: Transcript,
        remote_addr: SocketAddr,
        secure: bool,
        limits: Limits,
        session_deadline: Instant,
        consumed: u64,
    ) -> Self {
        LoggingConn {
            io: BufReader::new(Tee { inner, transcript }),
            remote_addr,
            secure,
            limits,
            session_deadline,
            consumed,
        }
    }

    #[must_use]
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.io.get_ref().transcript
    }

    /// Deadline for the next operation and the error to report if it passes.
    fn deadline(&self) -> Result<(Instant, Error), Error> {
        deadline(self.limits.idle_timeout, self.session_deadline)
    }

    /// Read one line, without its `\n` or `\r\n` terminator.
    ///
    /// Returns `Ok(None)` once the peer has closed its side. A final line without terminator
    /// is still returned.
    pub async fn read_line(&mut self) -> Result<Option<String>, Error> {
        let (deadline, expired) = self.deadline()?;

        let remaining = self.limits.max_bytes.saturating_sub(self.consumed);
        if remaining == 0 {
            return Err(Error::MaxBytesExceeded);
        }
        let line_limit = self.limits.max_line_length as u64;
        let cap = remaining.min(line_limit);

        let mut buf = Vec::new();
        let mut limited = (&mut self.io).take(cap);
        let n = match timeout_at(deadline, limited.read_until(b'\n', &mut buf)).await {
            Ok(res) => res?,
            Err(_) => return Err(expired),
        };
        self.consumed += n as u64;

        if n == 0 {
            return Ok(None);
        }

        if buf.last() != Some(&b'\n') && n as u64 == cap {
            return Err(if cap == line_limit {
                Error::LineTooLong
            } else {
                Error::MaxBytesExceeded
            });
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }

        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Write `line` followed by `\r\n` and flush.
    pub async fn write_line(&mut self, line: &str) -> Result<(), Error> {
        let (deadline, expired) = self.deadline()?;

        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(b"\r\n");

        let io = &mut self.io;
        let write = async move {
            io.write_all(&data).await?;
            io.flush().await
        };

        match timeout_at(deadline, write).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(expired),
        }
    }

    /// Perform a server side TLS handshake over the raw stream and return a new connection
    /// around the encrypted stream, seeded with everything captured so far.
    ///
    /// Bytes the peer pipelined after the upgrade request but before the handshake are
    /// dropped from the stream (they are already in the transcript).
    pub async fn upgrade(self, acceptor: &TlsAcceptor) -> Result<Self, UpgradeError> {
        let timing = self.deadline();
        let LoggingConn {
            io,
            remote_addr,
            secure,
            limits,
            session_deadline,
            consumed,
        } = self;
        let Tee { inner, transcript } = io.into_inner();

        let (deadline, expired) = match timing {
            Ok(timing) => timing,
            Err(error) => {
                return Err(UpgradeError {
                    closed: Closed { transcript, secure },
                    error,
                })
            }
        };

        let error = match timeout_at(deadline, acceptor.accept(inner)).await {
            Ok(Ok(tls)) => {
                return Ok(Self::seeded(
                    Box::new(tls),
                    transcript,
                    remote_addr,
                    true,
                    limits,
                    session_deadline,
                    consumed,
                ))
            }
            Ok(Err(err)) => Error::IO(err),
            Err(_) => expired,
        };

        Err(UpgradeError {
            closed: Closed { transcript, secure },
            error,
        })
    }

    /// Shut the connection down and hand back the conversation.
    pub async fn close(mut self) -> Closed {
        let grace = self.limits.idle_timeout.min(Duration::from_secs(1));
        if let Ok(Err(err)) = tokio::time::timeout(grace, self.io.shutdown()).await {
            tracing::debug!(peer = %self.remote_addr, "shutdown failed: {err}");
        }

        Closed {
            transcript: self.io.into_inner().transcript,
            secure: self.secure,
        }
    }
}

fn deadline(idle_timeout: Duration, session_deadline: Instant) -> Result<(Instant, Error), Error> {
    let now = Instant::now();
    if now >= session_deadline {
        return Err(Error::SessionTimeout);
    }

    let idle_deadline = now + idle_timeout;
    if idle_deadline < session_deadline {
        Ok((idle_deadline, Error::IdleTimeout))
    } else {
        Ok((session_deadline, Error::SessionTimeout))
    }
}
