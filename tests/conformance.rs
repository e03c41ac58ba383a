//! Conformance tests: a third-party msgpack-rpc client calling the greeter.

#![allow(clippy::tests_outside_test_module)]

use std::error::Error;

use hello_rpc::{DemoServiceServer, Greeter, Server, SAY_HELLO};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncReadCompatExt;

#[tokio::test]
async fn test_say_hello_from_msgpack_rpc_client() -> Result<(), Box<dyn Error>> {
    let server = Server::bind("127.0.0.1:0", DemoServiceServer::new(Greeter)).await?;
    let addr = server.local_addr()?;
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            panic!("Server error: {}", e);
        }
    });

    let socket = TcpStream::connect(addr).await?;
    let client = msgpack_rpc::Client::new(socket.compat());

    for name in ["ziying", "", "a/b c"] {
        let response = client
            .request(SAY_HELLO, &[msgpack_rpc::Value::from(name)])
            .await
            .unwrap();
        let message = response
            .as_array()
            .and_then(|fields| fields.first())
            .and_then(|field| field.as_str())
            .expect("response should be a one-field array");
        assert_eq!(message, format!("hello{}", name));
    }

    let unknown = client
        .request("SayGoodbye", &[msgpack_rpc::Value::from("ziying")])
        .await;
    assert!(unknown.is_err());

    server_task.abort();
    Ok(())
}
