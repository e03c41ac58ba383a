//! The `DemoService` definition shared by the server and client binaries.
//!
//! The service has a single method, `SayHello`. [`DemoServiceServer`] exposes any
//! [`DemoService`] implementation over the generic RPC dispatch, and [`DemoServiceClient`] is the
//! typed handle used to call it.

use async_trait::async_trait;
use rmpv::Value;
use serde::{Deserialize, Serialize};

use crate::{
    connection::{deserialize_params, serialize_value, RpcService},
    error::{Result, RpcError, ServiceError},
    transport::Client,
};

/// Wire name of the `say_hello` method.
pub const SAY_HELLO: &str = "SayHello";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HelloRequest {
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HelloResponse {
    pub message: String,
}

/// The service contract. Implementations are shared across connections and may be called
/// concurrently.
#[async_trait]
pub trait DemoService: Send + Sync + 'static {
    async fn say_hello(&self, request: HelloRequest) -> Result<HelloResponse>;
}

/// Routes incoming requests to a [`DemoService`].
pub struct DemoServiceServer<T> {
    inner: T,
}

impl<T: DemoService> DemoServiceServer<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: DemoService> RpcService for DemoServiceServer<T> {
    async fn handle_request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        match method {
            SAY_HELLO => {
                let request: HelloRequest = deserialize_params(params).map_err(|e| {
                    RpcError::Service(ServiceError::new("InvalidParams", e.to_string()))
                })?;
                let response = self.inner.say_hello(request).await?;
                serialize_value(&response)
            }
            _ => Err(RpcError::Service(ServiceError::new(
                "MethodNotFound",
                format!("Method '{}' not found", method),
            ))),
        }
    }
}

/// Typed client for [`DemoService`].
#[derive(Debug)]
pub struct DemoServiceClient {
    client: Client,
}

impl DemoServiceClient {
    /// Connects to a `DemoService` server at `addr`.
    pub async fn connect(addr: &str) -> Result<Self> {
        Ok(Self::new(Client::connect_tcp(addr).await?))
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn say_hello(&self, request: HelloRequest) -> Result<HelloResponse> {
        self.client.call(SAY_HELLO, &request).await
    }

    /// Closes the underlying connection.
    pub async fn close(self) -> Result<()> {
        self.client.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl DemoService for Echo {
        async fn say_hello(&self, request: HelloRequest) -> Result<HelloResponse> {
            Ok(HelloResponse {
                message: request.name,
            })
        }
    }

    #[tokio::test]
    async fn test_dispatch_say_hello() {
        let server = DemoServiceServer::new(Echo);
        let result = server
            .handle_request(SAY_HELLO, vec![Value::from("ziying")])
            .await
            .unwrap();
        assert_eq!(result, Value::Array(vec![Value::from("ziying")]));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_method() {
        let server = DemoServiceServer::new(Echo);
        match server.handle_request("SayGoodbye", vec![]).await {
            Err(RpcError::Service(error)) => {
                assert_eq!(error.name, "MethodNotFound");
                assert_eq!(error.value, Value::from("Method 'SayGoodbye' not found"));
            }
            other => panic!("Expected MethodNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispatch_invalid_params() {
        let server = DemoServiceServer::new(Echo);
        for params in [vec![], vec![Value::from(42)]] {
            match server.handle_request(SAY_HELLO, params).await {
                Err(RpcError::Service(error)) => assert_eq!(error.name, "InvalidParams"),
                other => panic!("Expected InvalidParams, got {:?}", other),
            }
        }
    }
}
