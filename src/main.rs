//! pie - call methods on a running simulation from the shell.
//!
//! Resolves configuration (file, environment, flags), optionally launches
//! the simulation, performs one call and prints the result as JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use peaceful_pie::models::Vector3;
use peaceful_pie::rpc::{CallOutcome, RpcClient};
use peaceful_pie::{ClientConfig, Schema};

#[derive(Parser)]
#[command(name = "pie")]
#[command(about = "Call methods on a running simulation over JSON-RPC")]
#[command(version)]
struct Cli {
    /// Simulation host (default: localhost)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Simulation port (default: 9000)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Launch this simulation executable with --port before calling
    #[arg(long, global = true)]
    server: Option<PathBuf>,

    /// Append diagnostics for unexpected failures to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Give up after this many retries instead of retrying forever
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Return immediately if the simulation is unreachable
    #[arg(long, global = true)]
    no_retry: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call any remote method
    #[command(display_order = 1)]
    Call {
        /// Remote method name
        method: String,

        /// Keyword argument as key=value; value is parsed as JSON, else taken as a string
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,

        /// Decode the result with this schema, e.g. '{"x":"float","y":"float"}'
        #[arg(long)]
        schema_json: Option<String>,
    },
    /// Get the controlled object's position
    #[command(display_order = 2)]
    Position,
    /// Move the controlled object
    #[command(display_order = 3)]
    Translate {
        #[arg(long, default_value_t = 0.0)]
        x: f64,
        #[arg(long, default_value_t = 0.0)]
        y: f64,
        #[arg(long, default_value_t = 0.0)]
        z: f64,
    },
    /// Show a message in the simulation
    #[command(display_order = 4)]
    Say {
        message: String,
    },
    /// Get the controlled object's height
    #[command(display_order = 5)]
    Height,
}

impl Cli {
    /// Config file and environment, then flags on top.
    fn resolve_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::load()?;
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(server) = &self.server {
            config.server_executable = Some(server.clone());
        }
        if let Some(log_file) = &self.log_file {
            config.log_file = Some(log_file.clone());
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = Some(max_retries);
        }
        Ok(config)
    }
}

/// Parse `key=value`. The value is JSON if it parses, otherwise a string.
fn parse_param(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", s));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn parse_schema(description: &str) -> Result<Schema> {
    let value: Value = serde_json::from_str(description).context("Schema is not valid JSON")?;
    Ok(Schema::from_description("result", &value)?)
}

fn run(client: &mut RpcClient, command: Commands, retry: bool) -> Result<CallOutcome> {
    let outcome = match command {
        Commands::Call {
            method,
            params,
            schema_json,
        } => {
            let schema = schema_json.as_deref().map(parse_schema).transpose()?;
            let mut caller = client.method(method);
            for (key, value) in params {
                caller = caller.arg(key, value);
            }
            if let Some(schema) = schema {
                caller = caller.expect(schema);
            }
            caller.retry(retry).invoke()?
        }
        Commands::Position => client
            .method("getPosition")
            .expect(Vector3::schema())
            .retry(retry)
            .invoke()?,
        Commands::Translate { x, y, z } => client
            .method("translate")
            .arg("translate", Vector3::new(x, y, z))
            .retry(retry)
            .invoke()?,
        Commands::Say { message } => client
            .method("say")
            .arg("message", message)
            .retry(retry)
            .invoke()?,
        Commands::Height => client.method("getHeight").retry(retry).invoke()?,
    };
    Ok(outcome)
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "peaceful_pie=info,pie=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    tracing::debug!("Using endpoint {}:{}", config.host, config.port);

    let mut client = RpcClient::new(config).context("Failed to create RPC client")?;
    let outcome = run(&mut client, cli.command, !cli.no_retry)?;

    if outcome.is_none() {
        tracing::info!("No result");
    }
    println!("{}", serde_json::to_string_pretty(&outcome.to_value())?);

    // Dropping the client kills a launched server
    Ok(())
}
