//! A one-method greeter service over MessagePack-RPC.
//!
//! The `server` binary serves [`DemoService`] through [`Greeter`], which answers `SayHello` with
//! `"hello"` followed by the requested name. The `client` binary connects, calls it once and
//! prints the reply.
//!
//! To serve a `DemoService`:
//! 1. Implement the `DemoService` trait
//! 2. Wrap it in a `DemoServiceServer`
//! 3. Bind it with `Server::bind(addr, service)`
//! 4. Call `server.run()`
//!
//! To call one, create a `DemoServiceClient` via `DemoServiceClient::connect(addr)` and use
//! `say_hello`. Errors from the connection and from the call are both returned to the caller.
//!
//! Uses `tokio` for async I/O and `rmpv`/`rmp-serde` for MessagePack serialization.

mod codec;
pub mod config;
mod connection;
mod error;
mod greeter;
pub mod logging;
mod message;
mod service;
mod transport;

pub use codec::*;
pub use connection::{
    deserialize_params, deserialize_value, serialize_params, serialize_value, RpcSender,
    RpcService,
};
pub use error::*;
pub use greeter::*;
pub use message::*;
pub use service::*;
pub use transport::*;

pub use rmpv::Value;
