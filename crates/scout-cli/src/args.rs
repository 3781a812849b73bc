use std::path::PathBuf;

use clap::{Parser, Subcommand};
use scout_client::Method;
use scout_common::telemetry::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "scout")]
#[command(about = "Scout CLI for talking to a search node", long_about = None)]
pub struct Args {
    /// Search node base URL (repeatable, comma separated in the env var)
    #[arg(
        long = "host",
        env = "SCOUT_HOSTS",
        value_delimiter = ',',
        default_value = "http://127.0.0.1:9200"
    )]
    pub hosts: Vec<String>,

    /// Timeout of each request in milliseconds
    #[arg(long, env = "SCOUT_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: Option<u64>,

    #[arg(long, env = "SCOUT_CONNECT_TIMEOUT_MS", default_value_t = 1000)]
    pub connect_timeout_ms: u64,

    /// text or json
    #[arg(long, env = "SCOUT_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    /// Export spans to this OTLP/HTTP endpoint
    #[arg(long, env = "SCOUT_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check that the node answers
    Ping,
    /// Send a raw request and print the reply
    Request {
        method: Method,
        /// Path relative to the node, e.g. /books/_doc/1
        path: String,
        /// JSON body part (repeat for NDJSON bodies)
        #[arg(long)]
        body: Vec<String>,
        /// Query parameter as name=value (repeatable)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
    /// Index events read from an NDJSON file
    Index {
        /// Target index, used for events that name none
        #[arg(long)]
        index: String,
        /// One event per line: {"kind":"add","id":"1","document":{...}}
        #[arg(long)]
        file: PathBuf,
        /// Tenant for events that name none
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long, env = "SCOUT_TENANCY_STRATEGY", default_value = "none")]
        tenancy: String,
        #[arg(long, env = "SCOUT_MAX_BATCH_SIZE", default_value_t = 100)]
        batch_size: usize,
        /// Refresh the index after each batch
        #[arg(long)]
        refresh: bool,
    },
    /// Search an index
    Search {
        #[arg(long)]
        index: String,
        /// Query DSL as JSON; matches everything when omitted
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long, env = "SCOUT_TENANCY_STRATEGY", default_value = "none")]
        tenancy: String,
        #[arg(long, default_value_t = 10)]
        size: u32,
        /// Overall budget for the search in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got '{s}'")),
    }
}
