//! Defines the MessagePack-RPC message types and their serialization/deserialization.
//!
//! Only requests and responses are used; notifications are rejected as an invalid message type.
use rmpv::Value;
use std::io::Write;

use crate::error::*;

const REQUEST_MESSAGE: u64 = 0;
const RESPONSE_MESSAGE: u64 = 1;

/// The RPC messages exchanged between client and server.
#[derive(PartialEq, Clone, Debug)]
pub enum Message {
    Request(Request),
    Response(Response),
}

/// An RPC request message containing an ID, method name, and parameters.
#[derive(PartialEq, Clone, Debug)]
pub struct Request {
    pub id: u32,
    pub method: String,
    pub params: Vec<Value>,
}

/// An RPC response message containing an ID and either a result or an error.
#[derive(PartialEq, Clone, Debug)]
pub struct Response {
    pub id: u32,
    pub result: std::result::Result<Value, Value>,
}

impl Message {
    /// Converts the message to a MessagePack-RPC compatible Value.
    pub fn to_value(&self) -> Value {
        match self {
            Message::Request(req) => Value::Array(vec![
                Value::Integer(REQUEST_MESSAGE.into()),
                Value::Integer(req.id.into()),
                Value::String(req.method.clone().into()),
                Value::Array(req.params.clone()),
            ]),
            Message::Response(resp) => {
                let (error, result) = match &resp.result {
                    Ok(value) => (Value::Nil, value.clone()),
                    Err(err) => (err.clone(), Value::Nil),
                };
                Value::Array(vec![
                    Value::Integer(RESPONSE_MESSAGE.into()),
                    Value::Integer(resp.id.into()),
                    error,
                    result,
                ])
            }
        }
    }

    /// Creates a Message from a MessagePack-RPC compatible Value.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Array(mut array) = value else {
            return Err(ProtocolError::InvalidFormat.into());
        };
        let msg_type = match array.first() {
            None => return Err(ProtocolError::EmptyMessage.into()),
            Some(Value::Integer(msg_type)) => msg_type.as_u64(),
            Some(_) => return Err(ProtocolError::InvalidMessageType.into()),
        };
        match msg_type {
            Some(REQUEST_MESSAGE) => {
                if array.len() != 4 {
                    return Err(ProtocolError::InvalidLength { kind: "request" }.into());
                }
                let id = message_id(&array[1], "request id")?;
                let method = array[2]
                    .as_str()
                    .ok_or(ProtocolError::InvalidField {
                        field: "request method",
                    })?
                    .to_string();
                let params = match array.pop() {
                    Some(Value::Array(params)) => params,
                    _ => {
                        return Err(ProtocolError::InvalidField {
                            field: "request params",
                        }
                        .into())
                    }
                };
                Ok(Message::Request(Request { id, method, params }))
            }
            Some(RESPONSE_MESSAGE) => {
                if array.len() != 4 {
                    return Err(ProtocolError::InvalidLength { kind: "response" }.into());
                }
                let id = message_id(&array[1], "response id")?;
                let result = array.pop().unwrap_or(Value::Nil);
                let error = array.pop().unwrap_or(Value::Nil);
                let result = if error.is_nil() { Ok(result) } else { Err(error) };
                Ok(Message::Response(Response { id, result }))
            }
            _ => Err(ProtocolError::InvalidMessageType.into()),
        }
    }

    /// Encodes the message to MessagePack format and writes it to the given writer.
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        let value = self.to_value();
        rmpv::encode::write_value(writer, &value)?;
        Ok(())
    }
}

fn message_id(value: &Value, field: &'static str) -> Result<u32> {
    value
        .as_u64()
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| ProtocolError::InvalidField { field }.into())
}
