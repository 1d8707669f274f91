//! Shared utilities for integration tests.

use std::net::SocketAddr;

use jsonhttp::config::ServerConfig;
use jsonhttp::{HttpServer, Routes, Shutdown};
use tokio::net::TcpListener;

/// A server running on an ephemeral local port. Stops when dropped.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a server with default configuration.
pub async fn start(routes: Routes) -> TestServer {
    start_with(ServerConfig::default(), routes).await
}

/// Start a server with the given configuration.
pub async fn start_with(config: ServerConfig, routes: Routes) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, routes).unwrap();

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, signal).await;
    });

    TestServer { addr, shutdown }
}
