//! Serves the greeter until the process is killed.

use std::process;

use clap::Parser;
use hello_rpc::{config::ServerConfig, logging, DemoServiceServer, Greeter, Server};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = ServerConfig::parse();
    if let Err(e) = logging::init_tracing() {
        eprintln!("failed to initialize logging: {e}");
    }

    let server = match Server::bind(&config.listen, DemoServiceServer::new(Greeter)).await {
        Ok(server) => server,
        Err(e) => {
            error!("did not listen on {}: {}", config.listen, e);
            process::exit(1);
        }
    };
    match server.local_addr() {
        Ok(addr) => info!("DemoService listening on {}", addr),
        Err(e) => info!("DemoService listening on {} ({})", config.listen, e),
    }

    if let Err(e) = server.run().await {
        error!("failed to serve: {}", e);
        process::exit(1);
    }
}
