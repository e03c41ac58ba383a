//! Tests for the `server` and `client` binaries: output and exit status as seen by a shell.

#![allow(clippy::tests_outside_test_module)]

use std::{
    error::Error,
    io::Read,
    net::{SocketAddr, TcpListener, TcpStream},
    process::{Child, Command, Output, Stdio},
    thread,
    time::{Duration, Instant},
};

const SERVER_BIN: &str = env!("CARGO_BIN_EXE_server");
const CLIENT_BIN: &str = env!("CARGO_BIN_EXE_client");

/// A running server process, killed when dropped.
struct ServerProcess(Child);

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn command(bin: &str) -> Command {
    let mut command = Command::new(bin);
    command
        .env_remove("HELLO_RPC_LISTEN")
        .env_remove("HELLO_RPC_SERVER")
        .env_remove("HELLO_RPC_NAME")
        .env("RUST_LOG", "info")
        .env("NO_COLOR", "1");
    command
}

fn free_addr() -> Result<SocketAddr, Box<dyn Error>> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?)
}

fn start_server() -> Result<(ServerProcess, SocketAddr), Box<dyn Error>> {
    let addr = free_addr()?;
    let child = command(SERVER_BIN)
        .args(["--listen", &addr.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    let server = ServerProcess(child);

    let deadline = Instant::now() + Duration::from_secs(10);
    while TcpStream::connect(addr).is_err() {
        if Instant::now() > deadline {
            return Err("server did not start listening".into());
        }
        thread::sleep(Duration::from_millis(20));
    }
    Ok((server, addr))
}

fn run_client(server: SocketAddr) -> Result<Output, Box<dyn Error>> {
    Ok(command(CLIENT_BIN)
        .args(["--server", &server.to_string()])
        .output()?)
}

#[test]
fn test_client_prints_greeting() -> Result<(), Box<dyn Error>> {
    let (_server, addr) = start_server()?;

    let output = run_client(addr)?;
    assert!(output.status.success(), "client failed: {:?}", output);
    assert_eq!(String::from_utf8(output.stdout)?, "helloziying\n");
    Ok(())
}

#[test]
fn test_client_uses_given_name() -> Result<(), Box<dyn Error>> {
    let (_server, addr) = start_server()?;

    let output = command(CLIENT_BIN)
        .args(["--server", &addr.to_string(), "--name", "a/b c"])
        .output()?;
    assert!(output.status.success(), "client failed: {:?}", output);
    assert_eq!(String::from_utf8(output.stdout)?, "helloa/b c\n");
    Ok(())
}

#[test]
fn test_client_exits_when_server_is_missing() -> Result<(), Box<dyn Error>> {
    let output = run_client(free_addr()?)?;
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("did not connect"));
    Ok(())
}

#[test]
fn test_client_exits_when_call_fails() -> Result<(), Box<dyn Error>> {
    // Accepts one connection, reads the request and hangs up without answering.
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let peer = thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0; 256];
            let _ = stream.read(&mut buf);
        }
    });

    let output = run_client(addr)?;
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("SayHello failed"));
    peer.join().map_err(|_| "peer thread panicked")?;
    Ok(())
}

#[test]
fn test_server_exits_when_address_is_taken() -> Result<(), Box<dyn Error>> {
    let taken = TcpListener::bind("127.0.0.1:0")?;
    let addr = taken.local_addr()?;

    let output = command(SERVER_BIN)
        .args(["--listen", &addr.to_string()])
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("did not listen"));
    Ok(())
}
