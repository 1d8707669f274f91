//! jsonhttp demo server.
//!
//! # Usage
//!
//! ```text
//! jsonhttp --config jsonhttp.toml --bind 127.0.0.1:8080 --max-attempts 5
//! ```
//!
//! Serves two demo handlers:
//! - `POST /hello` with `{"name":"Ada"}` → `{"success":true,...,"data":{"message":"Hello, Ada."}}`
//! - `GET /hello-stream?name=Ada&count=3` → three server-sent events

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use jsonhttp::config::{load_config, ServerConfig};
use jsonhttp::http::{JsonRequest, StreamRequest};
use jsonhttp::observability::{init_logging, init_metrics};
use jsonhttp::{listen, Envelope, Failure, Routes};

#[derive(Parser)]
#[command(name = "jsonhttp", about = "Typed JSON-over-HTTP demo server")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on, overrides the configuration.
    #[arg(long)]
    bind: Option<String>,

    /// Attempts per request on transient conflicts, overrides the configuration.
    #[arg(long)]
    max_attempts: Option<u32>,
}

#[derive(Deserialize)]
struct HelloRequest {
    name: String,
}

#[derive(Serialize)]
struct HelloResponse {
    message: String,
}

#[derive(Deserialize)]
struct StreamQuery {
    name: String,
    #[serde(default = "default_count")]
    count: u32,
}

fn default_count() -> u32 {
    3
}

async fn hello(req: JsonRequest) -> Result<Envelope, Failure> {
    let HelloRequest { name } = req.decode()?;
    if name.is_empty() {
        return Err(Failure::bad_request(anyhow::anyhow!("name is empty")));
    }
    Envelope::success(HelloResponse {
        message: format!("Hello, {name}."),
    })
}

async fn hello_stream(req: StreamRequest) -> Result<(), Failure> {
    let StreamQuery { name, count } = req.decode()?;
    for i in 1..=count {
        req.write_event(&format!("Hello #{i}, {name}.")).await?;
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(max_attempts) = cli.max_attempts {
        config.dispatch.max_attempts = max_attempts;
    }

    init_logging(&config.observability)?;
    tracing::info!("jsonhttp v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let mut routes = Routes::new();
    routes.handle("/hello", hello)?.handle_stream("/hello-stream", hello_stream)?;

    listen(config, routes).await?;
    Ok(())
}
