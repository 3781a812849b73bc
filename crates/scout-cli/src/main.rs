mod args;
mod output;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{json, Value};

use scout_batch::BatchSettings;
use scout_client::{AsyncRequestExecutor, Deadline, Request};
use scout_common::telemetry::init_tracing;
use scout_common::{ClientSettings, TenancySettings};
use scout_indexing::{HttpSessionFactory, IndexingEvent, IndexingQueue};
use scout_tenancy::{parse_strategy, MultiTenancyStrategy};

use crate::args::{Args, Command};
use crate::output::{print_hits, print_index_summary, print_ping, print_response};

fn tenancy(name: &str) -> Result<Arc<dyn MultiTenancyStrategy>> {
    Ok(Arc::from(parse_strategy(name, &TenancySettings::from_env())?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let provider = init_tracing("scout-cli", args.otlp_endpoint.as_deref(), args.log_format);

    let settings = ClientSettings {
        hosts: args.hosts,
        request_timeout_ms: args.request_timeout_ms,
        connect_timeout_ms: args.connect_timeout_ms,
        ..ClientSettings::from_env()
    };
    let executor = AsyncRequestExecutor::new(settings)?;

    let result = run(&executor, args.command).await;
    tracing::debug!(stats = ?executor.stats().snapshot(), "executor stats");

    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("failed to flush traces: {e}");
        }
    }
    result
}

async fn run(executor: &AsyncRequestExecutor, command: Command) -> Result<()> {
    match command {
        Command::Ping => {
            let resp = executor.submit(Request::get().build()).await?;
            print_ping(&resp);
        }
        Command::Request {
            method,
            path,
            body,
            params,
        } => {
            let mut builder = Request::builder(method);
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                builder = builder.path_component(segment);
            }
            for (name, value) in params {
                builder = builder.param(name, value);
            }
            for (i, part) in body.iter().enumerate() {
                let part: Value = serde_json::from_str(part)
                    .with_context(|| format!("--body #{} is not valid JSON", i + 1))?;
                builder = builder.body(part);
            }
            let resp = executor.submit(builder.build()).await?;
            print_response(&resp);
        }
        Command::Index {
            index,
            file,
            tenant,
            tenancy: strategy,
            batch_size,
            refresh,
        } => {
            let tenancy = tenancy(&strategy)?;
            let factory = HttpSessionFactory::new(executor.clone(), tenancy.clone()).with_refresh(refresh);
            let queue = IndexingQueue::new(
                index.clone(),
                Arc::new(factory),
                tenancy,
                BatchSettings {
                    max_batch_size: batch_size,
                    ..BatchSettings::from_env()
                },
            );
            queue.start().await?;

            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let mut handles = Vec::new();
            for (n, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let mut event: IndexingEvent = serde_json::from_str(line)
                    .with_context(|| format!("{}:{} is not an indexing event", file.display(), n + 1))?;
                if event.entity_name.is_empty() {
                    event.entity_name = index.clone();
                }
                if event.tenant_id.is_none() {
                    event.tenant_id = tenant.clone();
                }
                let what = event.describe();
                handles.push((what, queue.submit(event).await?));
            }
            queue.shutdown().await;

            let total = handles.len();
            let mut failures = Vec::new();
            for (what, handle) in handles {
                if let Err(e) = handle.await {
                    failures.push((what, e.to_string()));
                }
            }
            print_index_summary(total, &failures, &executor.stats().snapshot());
            if !failures.is_empty() {
                anyhow::bail!("{} of {} events failed", failures.len(), total);
            }
        }
        Command::Search {
            index,
            query,
            tenant,
            tenancy: strategy,
            size,
            timeout_ms,
        } => {
            let tenancy = tenancy(&strategy)?;
            let query = query
                .map(|q| serde_json::from_str::<Value>(&q))
                .transpose()
                .context("--query is not valid JSON")?;
            let query = tenancy.decorate_query(query, tenant.as_deref())?;

            let mut body = json!({ "size": size });
            if let Some(query) = query {
                body["query"] = query;
            }
            let mut builder = Request::post()
                .path_component(&index)
                .path_component("_search")
                .body(body);
            if let Some(ms) = timeout_ms {
                builder = builder.deadline(Deadline::for_duration(Duration::from_millis(ms)));
            }

            let resp = executor.submit(builder.build()).await?;
            if !resp.is_success() {
                print_response(&resp);
                anyhow::bail!("search failed with status {}", resp.status_code());
            }
            print_hits(&resp, &*tenancy);
        }
    }
    Ok(())
}
