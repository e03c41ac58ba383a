//! Core RPC connection handling and message processing.
//!
//! Defines the request handler trait used by servers, the per-connection message loops for both
//! sides of a connection, and the typed helpers that move serde values in and out of params.
use std::{collections::HashMap, io::Cursor, sync::Arc};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rmpv::{decode::read_value, encode::write_value, Value};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf},
    sync::{mpsc, oneshot, Mutex},
    task::JoinSet,
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{trace, warn};

use crate::{
    codec::MessageCodec,
    error::{ProtocolError, Result, RpcError, ServiceError},
    message::*,
};

/// Handles requests arriving on a server connection.
///
/// One instance is shared by every connection of a [`Server`](crate::Server), and each request
/// is handled on its own task.
///
/// Use the `#[async_trait]` attribute from the `async_trait` crate when implementing this trait.
#[async_trait]
pub trait RpcService: Send + Sync + 'static {
    /// Handles an incoming RPC request.
    ///
    /// Returning `RpcError::Service` sends the service error to the caller as-is; any other error
    /// is reported to the caller as an internal error string.
    async fn handle_request(&self, method: &str, params: Vec<Value>) -> Result<Value>;
}

/// Internal message type for communication between the client API and the connection task.
#[derive(Debug)]
pub(crate) struct ClientRequest {
    /// Method name.
    method: String,
    /// Method parameters.
    params: Vec<Value>,
    /// Channel for sending the response back.
    response_sender: oneshot::Sender<Result<Value>>,
}

/// The interface for sending RPC requests over a client connection.
#[derive(Debug, Clone)]
pub struct RpcSender {
    /// Channel sender for client requests.
    pub(crate) sender: mpsc::Sender<ClientRequest>,
}

impl RpcSender {
    /// Sends an RPC request and waits for the response.
    pub async fn send_request(&self, method: &str, params: &[Value]) -> Result<Value> {
        let (response_sender, response_receiver) = oneshot::channel();
        self.sender
            .send(ClientRequest {
                method: method.to_string(),
                params: params.to_vec(),
                response_sender,
            })
            .await
            .map_err(|_| RpcError::Disconnect)?;
        response_receiver
            .await
            .map_err(|_| RpcError::Disconnect)?
    }

    /// Sends a typed request and deserializes the response.
    pub async fn call<Req, Resp>(&self, method: &str, req: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let params = serialize_params(req)?;
        let value = self.send_request(method, &params).await?;
        deserialize_value(&value)
    }
}

/// Serializes a typed request into a MessagePack-RPC params array.
///
/// If the encoded value is an array, its elements become the params array. Otherwise, the encoded
/// value is sent as a single parameter.
pub fn serialize_params<Req>(req: &Req) -> Result<Vec<Value>>
where
    Req: Serialize,
{
    match serialize_value(req)? {
        Value::Array(values) => Ok(values),
        value => Ok(vec![value]),
    }
}

/// Deserializes a params array into a typed request. Inverse of [`serialize_params`] for
/// array-shaped requests.
pub fn deserialize_params<Req>(params: Vec<Value>) -> Result<Req>
where
    Req: DeserializeOwned,
{
    deserialize_value(&Value::Array(params))
}

/// Serializes a typed value into a MessagePack value.
pub fn serialize_value<T>(value: &T) -> Result<Value>
where
    T: Serialize + ?Sized,
{
    let buf = rmp_serde::to_vec(value)?;
    Ok(read_value(&mut Cursor::new(buf))?)
}

/// Deserializes a typed value from a MessagePack value.
pub fn deserialize_value<T>(value: &Value) -> Result<T>
where
    T: DeserializeOwned,
{
    let mut buf = Vec::new();
    write_value(&mut buf, value)?;
    Ok(rmp_serde::from_slice(&buf)?)
}

type Writer<S> = FramedWrite<WriteHalf<S>, MessageCodec>;

/// Serves requests on one accepted connection until the peer goes away.
///
/// Every request is dispatched on its own task; responses are written back as they complete, so
/// they may go out in a different order than the requests came in.
pub(crate) async fn serve_connection<S, T>(stream: S, service: Arc<T>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    T: RpcService,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FramedRead::new(read_half, MessageCodec::new());
    let writer = Arc::new(Mutex::new(FramedWrite::new(write_half, MessageCodec::new())));

    let mut handlers = JoinSet::new();
    let result = loop {
        reap_finished(&mut handlers);
        match reader.next().await {
            Some(Ok(Message::Request(request))) => {
                let service = Arc::clone(&service);
                let writer = Arc::clone(&writer);
                handlers.spawn(async move {
                    if let Err(e) = dispatch_request(service, writer, request).await {
                        warn!("Error writing response: {}", e);
                    }
                });
            }
            Some(Ok(Message::Response(response))) => {
                warn!("Ignoring response {} on a server connection", response.id);
            }
            Some(Err(e)) => break Err(e),
            None => break Ok(()),
        }
    };

    // Let in-flight requests finish writing before the write half is dropped.
    while let Some(joined) = handlers.join_next().await {
        if let Err(e) = joined {
            warn!("Error joining request handler: {}", e);
        }
    }
    result
}

/// Drops the bookkeeping for request handlers that have already finished.
fn reap_finished(handlers: &mut JoinSet<()>) {
    while let Some(joined) = handlers.try_join_next() {
        if let Err(e) = joined {
            warn!("Error joining request handler: {}", e);
        }
    }
}

/// Runs one request through the service and writes the response.
async fn dispatch_request<S, T>(
    service: Arc<T>,
    writer: Arc<Mutex<Writer<S>>>,
    request: Request,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    T: RpcService,
{
    trace!("handling request {}: {}", request.id, request.method);
    let result = match service.handle_request(&request.method, request.params).await {
        Ok(value) => Ok(value),
        Err(RpcError::Service(service_error)) => {
            warn!("Service error: {}", service_error);
            Err(service_error.into())
        }
        Err(e) => {
            warn!("RPC error: {}", e);
            Err(Value::String(format!("Internal error: {}", e).into()))
        }
    };
    let response = Message::Response(Response {
        id: request.id,
        result,
    });
    trace!("sending message: {:?}", response);
    writer.lock().await.send(response).await
}

/// Client side of a connection: assigns request ids, writes requests and routes responses back
/// to their callers.
pub(crate) struct RpcConnection<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Incoming messages.
    reader: FramedRead<ReadHalf<S>, MessageCodec>,
    /// Outgoing messages.
    writer: Writer<S>,
    /// Next request ID to use.
    next_request_id: u32,
    /// Pending requests awaiting responses.
    pending_requests: HashMap<u32, oneshot::Sender<Result<Value>>>,
}

impl<S> RpcConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Creates a new RpcConnection with the given stream.
    pub(crate) fn new(stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: FramedRead::new(read_half, MessageCodec::new()),
            writer: FramedWrite::new(write_half, MessageCodec::new()),
            next_request_id: 1,
            pending_requests: HashMap::new(),
        }
    }

    /// Processes requests from the client API and responses from the peer until either side
    /// goes away. Pending callers are failed with `RpcError::Disconnect` when the connection
    /// ends.
    pub(crate) async fn run(mut self, mut requests: mpsc::Receiver<ClientRequest>) -> Result<()> {
        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.send_request(request).await?,
                    // Every sender is gone: the client was dropped.
                    None => return Ok(()),
                },
                message = self.reader.next() => match message {
                    Some(Ok(Message::Response(response))) => {
                        if let Err(e) = self.handle_response(response) {
                            warn!("error handling response: {}", e);
                        }
                    }
                    Some(Ok(Message::Request(request))) => {
                        warn!("Ignoring request {} ({}) on a client connection", request.id, request.method);
                    }
                    Some(Err(e)) => return Err(e),
                    None => return Err(RpcError::Disconnect),
                },
            }
        }
    }

    /// Routes an incoming response to the pending request with the same id.
    fn handle_response(&mut self, response: Response) -> Result<()> {
        let sender = self
            .pending_requests
            .remove(&response.id)
            .ok_or(ProtocolError::UnexpectedResponse { id: response.id })?;
        // Receiver may be dropped if caller gave up waiting; ignore send errors.
        drop(sender.send(
            response
                .result
                .map_err(|e| RpcError::Service(ServiceError::from_value(e))),
        ));
        Ok(())
    }

    /// Writes an RPC request and registers the response channel.
    async fn send_request(&mut self, request: ClientRequest) -> Result<()> {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let message = Message::Request(Request {
            id,
            method: request.method,
            params: request.params,
        });
        trace!("sending message: {:?}", message);
        match self.writer.send(message).await {
            Ok(()) => {
                self.pending_requests.insert(id, request.response_sender);
                Ok(())
            }
            Err(e) => {
                drop(request.response_sender.send(Err(RpcError::Disconnect)));
                Err(e)
            }
        }
    }
}
