use async_trait::async_trait;

use crate::{
    error::Result,
    service::{DemoService, HelloRequest, HelloResponse},
};

/// Prefix prepended to every name. There is no separator.
pub const GREETING: &str = "hello";

/// The `DemoService` implementation served by the `server` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct Greeter;

impl Greeter {
    pub fn greet(name: &str) -> String {
        format!("{GREETING}{name}")
    }
}

#[async_trait]
impl DemoService for Greeter {
    async fn say_hello(&self, request: HelloRequest) -> Result<HelloResponse> {
        Ok(HelloResponse {
            message: Self::greet(&request.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn say_hello(name: &str) -> String {
        Greeter
            .say_hello(HelloRequest { name: name.into() })
            .await
            .unwrap()
            .message
    }

    #[tokio::test]
    async fn test_greeting_is_unseparated_concatenation() {
        assert_eq!(say_hello("ziying").await, "helloziying");
        assert_eq!(say_hello("").await, "hello");
        assert_eq!(say_hello("a/b c").await, "helloa/b c");
        assert_eq!(say_hello(" 世界 ").await, "hello 世界 ");
    }

    #[tokio::test]
    async fn test_same_request_same_response() {
        assert_eq!(say_hello("ziying").await, say_hello("ziying").await);
    }
}
