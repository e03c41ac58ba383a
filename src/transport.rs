//! TCP server and client for the RPC protocol.

use std::{
    io::{self, ErrorKind},
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
    time::sleep,
};
use tracing::{trace, warn};

use crate::{
    connection::{serve_connection, RpcConnection, RpcSender, RpcService},
    error::*,
    Value,
};

/// RPC server listening on a TCP socket. A single service instance is shared by all
/// connections.
pub struct Server<T>
where
    T: RpcService,
{
    /// The service handling every request.
    service: Arc<T>,
    /// The bound listener.
    listener: TcpListener,
}

impl<T> Server<T>
where
    T: RpcService,
{
    /// Binds a TCP listener to `addr` for serving `service`.
    pub async fn bind(addr: &str, service: T) -> Result<Self> {
        trace!("Binding TCP listener to address: {}", addr);
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            service: Arc::new(service),
            listener,
        })
    }

    /// Returns the address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever, serving each one on its own task. Failures of a single
    /// accept are retried with a backoff; only a failure of the listener itself ends the loop.
    pub async fn run(self) -> Result<()> {
        serve(&self.listener, self.service).await
    }
}

/// Backoff after the first failed accept.
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
/// Upper bound on the backoff between failed accepts.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

// Linux and macOS share these values.
const ENOMEM: i32 = 12;
const ENFILE: i32 = 23;
const EMFILE: i32 = 24;

/// Trait for types that can accept incoming connections.
#[async_trait]
trait Accept: Send + Sync {
    /// The stream type produced by accepting a connection.
    type Stream: AsyncRead + AsyncWrite + Send + 'static;
    /// Accepts an incoming connection.
    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)>;
}

#[async_trait]
impl Accept for TcpListener {
    type Stream = TcpStream;
    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// Errors that concern one pending connection or a momentary resource shortage, after which the
/// listener is still usable.
fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    ) || matches!(e.raw_os_error(), Some(ENOMEM | ENFILE | EMFILE))
}

/// Accept loop shared by every listener type.
async fn serve<L, T>(listener: &L, service: Arc<T>) -> Result<()>
where
    L: Accept,
    T: RpcService,
{
    let mut backoff = ACCEPT_BACKOFF_MIN;
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => {
                backoff = ACCEPT_BACKOFF_MIN;
                accepted
            }
            Err(e) if is_transient_accept_error(&e) => {
                warn!("Accept error: {}; retrying in {:?}", e, backoff);
                sleep(backoff).await;
                backoff = (backoff * 2).min(ACCEPT_BACKOFF_MAX);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        trace!("Accepted TCP connection from: {}", addr);
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            match serve_connection(stream, service).await {
                Ok(()) => trace!("Connection from {} closed", addr),
                Err(RpcError::Disconnect) => trace!("Client {} disconnected", addr),
                Err(e) => warn!("Connection error from {}: {}", addr, e),
            }
        });
    }
}

/// RPC client over a single TCP connection.
///
/// Dropping the client closes the connection once in-flight requests are written.
#[derive(Debug)]
pub struct Client {
    /// Sender for sending RPC requests.
    pub sender: RpcSender,
    /// Handle to the background connection task.
    handle: JoinHandle<()>,
}

impl Client {
    /// Creates a new client connected to a TCP address.
    pub async fn connect_tcp(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| RpcError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        trace!("TCP connection established to: {}", addr);
        Ok(Self::new(RpcConnection::new(stream)))
    }

    /// Creates a new client from an established connection.
    fn new(connection: RpcConnection<TcpStream>) -> Self {
        let (sender, receiver) = mpsc::channel(100);
        let handle = tokio::spawn(async move {
            match connection.run(receiver).await {
                Ok(()) => trace!("Client connection closed"),
                Err(RpcError::Disconnect) => trace!("Server disconnected"),
                Err(e) => warn!("Client connection error: {}", e),
            }
        });
        Self {
            sender: RpcSender { sender },
            handle,
        }
    }

    /// Sends an RPC request to the server. Convenience method for `RpcSender::send_request`.
    pub async fn send_request(&self, method: &str, params: &[Value]) -> Result<Value> {
        self.sender.send_request(method, params).await
    }

    /// Sends a typed request to the server. Convenience method for `RpcSender::call`.
    pub async fn call<Req, Resp>(&self, method: &str, req: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        self.sender.call(method, req).await
    }

    /// Closes the connection and waits for the background task to finish. Clones of `sender`
    /// keep the connection open until they are dropped too.
    pub async fn close(self) -> Result<()> {
        let Self { sender, handle } = self;
        drop(sender);
        handle
            .await
            .map_err(|e| RpcError::Io(std::io::Error::other(e)))
    }
}
