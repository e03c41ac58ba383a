//! Command-line configuration for the `server` and `client` binaries.
//!
//! Every setting has an environment variable fallback and a default matching the addresses the
//! service has always used.

use clap::Parser;

/// Port the service listens on by default.
pub const DEFAULT_PORT: u16 = 9090;
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9090";
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:9090";
pub const DEFAULT_NAME: &str = "ziying";

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "server", about = "Serve the DemoService greeter")]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, env = "HELLO_RPC_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: String,
}

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "client", about = "Call SayHello once and print the reply")]
pub struct ClientConfig {
    /// Address of the server to call.
    #[arg(long, env = "HELLO_RPC_SERVER", default_value = DEFAULT_SERVER_ADDR)]
    pub server: String,

    /// Name to greet.
    #[arg(long, env = "HELLO_RPC_NAME", default_value = DEFAULT_NAME)]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        // Assumes the HELLO_RPC_* variables are not set in the test environment.
        let server = ServerConfig::try_parse_from(["server"]).unwrap();
        assert_eq!(server.listen, DEFAULT_LISTEN_ADDR);
        assert!(DEFAULT_LISTEN_ADDR.ends_with(&format!(":{DEFAULT_PORT}")));

        let client = ClientConfig::try_parse_from(["client"]).unwrap();
        assert_eq!(client.server, DEFAULT_SERVER_ADDR);
        assert_eq!(client.name, DEFAULT_NAME);
    }

    #[test]
    fn test_flags_override_defaults() {
        let server = ServerConfig::try_parse_from(["server", "--listen", "127.0.0.1:0"]).unwrap();
        assert_eq!(server.listen, "127.0.0.1:0");

        let client = ClientConfig::try_parse_from([
            "client",
            "--server",
            "10.0.0.1:9000",
            "--name",
            "",
        ])
        .unwrap();
        assert_eq!(client.server, "10.0.0.1:9000");
        assert_eq!(client.name, "");
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        assert!(ClientConfig::try_parse_from(["client", "--timeout", "5"]).is_err());
    }
}
