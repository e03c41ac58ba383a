use rmpv::Value;
use std::io;
use thiserror::Error;

/// Errors that can occur during RPC operations.
#[derive(Error, Debug)]
pub enum RpcError {
    /// Error occurred during I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to establish an outbound connection.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The peer closed the connection, or the connection task went away before a response
    /// arrived.
    #[error("connection closed")]
    Disconnect,

    /// Error occurred during MessagePack serialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmpv::encode::Error),

    /// Error occurred during MessagePack deserialization.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmpv::decode::Error),

    /// A typed value could not be encoded.
    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// A typed value could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Error related to the RPC protocol.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error returned by the RPC service implementation.
    #[error("Service error: {0}")]
    Service(ServiceError),
}

/// Violations of the MessagePack-RPC message format.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ProtocolError {
    #[error("invalid message format")]
    InvalidFormat,

    #[error("empty message array")]
    EmptyMessage,

    #[error("invalid message type")]
    InvalidMessageType,

    #[error("invalid {kind} message length")]
    InvalidLength { kind: &'static str },

    #[error("invalid {field}")]
    InvalidField { field: &'static str },

    #[error("depth limit exceeded")]
    DepthLimitExceeded,

    /// A response arrived for a request id nobody is waiting on.
    #[error("unexpected response with id {id}")]
    UnexpectedResponse { id: u32 },
}

/// An error that occurred during the execution of an RPC service method.
///
/// It consists of a name, which identifies the type of error, and a value, which can contain
/// additional error details. When sent over the wire, this error is serialized into a map with
/// "name" and "value" keys.
#[derive(Error, Debug, Clone, PartialEq)]
pub struct ServiceError {
    pub name: String,
    pub value: Value,
}

impl ServiceError {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Rebuilds a service error from the error slot of a response.
    ///
    /// Maps without `name`/`value` keys become `UnknownError`, anything else becomes
    /// `RemoteError`, with the raw value kept in both cases.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Map(map) => {
                let field = |key: &str| {
                    map.iter()
                        .find(|(k, _)| k.as_str() == Some(key))
                        .map(|(_, v)| v)
                };
                match (field("name").and_then(Value::as_str), field("value")) {
                    (Some(name), Some(value)) => Self::new(name, value.clone()),
                    _ => Self::new("UnknownError", Value::Map(map)),
                }
            }
            other => Self::new("RemoteError", other),
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Service error {}: {}", self.name, self.value)
    }
}

impl From<ServiceError> for Value {
    fn from(error: ServiceError) -> Self {
        Value::Map(vec![
            (
                Value::String("name".into()),
                Value::String(error.name.into()),
            ),
            (Value::String("value".into()), error.value),
        ])
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
