//! Calls `SayHello` once and prints the reply.

use std::process;

use clap::Parser;
use hello_rpc::{config::ClientConfig, logging, DemoServiceClient, HelloRequest};
use tracing::{debug, error};

#[tokio::main]
async fn main() {
    let config = ClientConfig::parse();
    if let Err(e) = logging::init_tracing() {
        eprintln!("failed to initialize logging: {e}");
    }

    let client = match DemoServiceClient::connect(&config.server).await {
        Ok(client) => client,
        Err(e) => {
            error!("did not connect: {}", e);
            process::exit(1);
        }
    };

    let request = HelloRequest { name: config.name };
    let response = match client.say_hello(request).await {
        Ok(response) => response,
        Err(e) => {
            error!("SayHello failed: {}", e);
            process::exit(1);
        }
    };
    println!("{}", response.message);

    if let Err(e) = client.close().await {
        debug!("error closing connection: {}", e);
    }
}
