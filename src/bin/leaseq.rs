//! leaseq CLI: operator interface to a lease-based work queue.

use anyhow::Context;
use clap::{Parser, Subcommand};
use leaseq::config::Config;
use leaseq::config::secrets::ExposeSecret;
use leaseq::db::Db;
use leaseq::engine::{Engine, EngineConfig, Reaper};
use leaseq::model::{Holder, Item, QueueId, Sequence};
use leaseq::telemetry::{TelemetryConfig, init_telemetry};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "leaseq", about = "Lease-based work queue")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reaper daemon until interrupted
    Serve {
        /// Override REAPER_INTERVAL_SECS
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    #[command(flatten)]
    Queue(QueueCommand),
}

/// Commands that run once against the store.
#[derive(Subcommand)]
enum QueueCommand {
    /// List live queues
    Queues,
    /// Register a new queue
    Create { queue: QueueId },
    /// Delete a queue with all of its items and leases
    Delete { queue: QueueId },
    /// Show queue counts, or the contents of one sequence
    Show {
        queue: QueueId,
        /// Sequence to list: queued, pending (with lease detail) or done
        #[arg(long)]
        list: Option<Sequence>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Append an item to the queue
    Enqueue { queue: QueueId, item: Item },
    /// Load items from stdin, one per line, creating the queue if needed
    Bulk {
        queue: QueueId,
        /// Empty the queue before loading
        #[arg(long)]
        new: bool,
    },
    /// Lease the next queued item
    Next {
        queue: QueueId,
        /// Lease holder name (defaults to a random id)
        #[arg(long)]
        holder: Option<Holder>,
    },
    /// Mark a pending item done
    Done {
        queue: QueueId,
        item: Item,
        #[arg(long)]
        holder: Option<Holder>,
    },
    /// Reset an item's lease to a full lease duration
    Extend {
        queue: QueueId,
        item: Item,
        #[arg(long)]
        holder: Option<Holder>,
    },
    /// Drop an item's lease so the reaper reclaims it
    Expire { queue: QueueId, item: Item },
    /// Seconds left on an item's lease
    Ttl { queue: QueueId, item: Item },
    /// Run one reclaim pass now
    Reap,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve { interval_secs } => cmd_serve(config, interval_secs).await,
        Command::Queue(command) => {
            let engine = connect(&config).await?;
            run(&engine, &config, command).await
        }
    }
}

async fn run(engine: &Engine, config: &Config, command: QueueCommand) -> anyhow::Result<()> {
    match command {
        QueueCommand::Queues => {
            for queue in engine.list().await? {
                println!("{queue}");
            }
        }
        QueueCommand::Create { queue } => {
            engine.create(&queue).await?;
            println!("Queue {queue} created.");
        }
        QueueCommand::Delete { queue } => {
            engine.delete(&queue).await?;
            println!("Queue {queue} deleted.");
        }
        QueueCommand::Show { queue, list, json } => cmd_show(engine, &queue, list, json).await?,
        QueueCommand::Enqueue { queue, item } => engine.enqueue(&queue, &item).await?,
        QueueCommand::Bulk { queue, new } => {
            let items = read_items(std::io::stdin())?;
            let loaded = engine.bulk(&queue, &items, new).await?;
            println!("Loaded {loaded} item(s) into {queue}.");
        }
        QueueCommand::Next { queue, holder } => {
            match engine.next(&queue, &holder_or_random(holder)?).await? {
                Some(item) => println!("{item}"),
                None => println!(),
            }
        }
        QueueCommand::Done {
            queue,
            item,
            holder,
        } => {
            let item = engine.done(&queue, &item, &holder_or_random(holder)?).await?;
            println!("{item}");
        }
        QueueCommand::Extend {
            queue,
            item,
            holder,
        } => {
            engine.extend(&queue, &item, &holder_or_random(holder)?).await?;
            println!("{item}");
        }
        QueueCommand::Expire { queue, item } => {
            engine.expire(&queue, &item).await?;
            println!("{item}");
        }
        QueueCommand::Ttl { queue, item } => {
            println!("{}", engine.ttl(&queue, &item).await?.as_secs());
        }
        QueueCommand::Reap => {
            let report = Reaper::new(engine.clone(), config.reaper_interval).tick().await;
            println!(
                "Reclaimed {} of {} pending item(s) across {} queue(s); {} failure(s).",
                report.reclaimed, report.scanned, report.queues, report.failures
            );
        }
    }
    Ok(())
}

async fn connect(config: &Config) -> anyhow::Result<Engine> {
    let db = Db::connect(config.database_url.expose_secret())
        .await
        .context("connecting to Postgres")?;
    db.migrate().await?;
    Ok(Engine::new(Arc::new(db), EngineConfig::from(config)))
}

async fn cmd_serve(config: Config, interval_secs: Option<u64>) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "leaseq".to_string(),
        default_level: config.log_level.clone(),
    })?;

    let engine = connect(&config).await?;
    let interval = interval_secs
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
        .unwrap_or(config.reaper_interval);

    let reaper = Reaper::new(engine, interval).spawn();
    tokio::signal::ctrl_c().await?;
    reaper.stop().await;
    Ok(())
}

async fn cmd_show(
    engine: &Engine,
    queue: &QueueId,
    list: Option<Sequence>,
    json: bool,
) -> anyhow::Result<()> {
    match list {
        None => {
            let summary = engine.summary(queue).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{summary}");
            }
        }
        Some(Sequence::Pending) => {
            let details = engine.list_pending_detail(queue).await?;
            if json {
                let rows: Vec<_> = details
                    .iter()
                    .map(|d| {
                        serde_json::json!({
                            "item": d.item,
                            "holder": d.holder,
                            "ttl": d.ttl_secs(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for detail in &details {
                    println!("{detail}");
                }
            }
        }
        Some(sequence) => {
            let items = match sequence {
                Sequence::Queued => engine.list_queued(queue).await?,
                _ => engine.list_done(queue).await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for item in &items {
                    println!("{item}");
                }
            }
        }
    }
    Ok(())
}

/// One item per line; surrounding spaces and line breaks are trimmed and
/// blank lines skipped.
fn read_items(mut input: impl Read) -> anyhow::Result<Vec<Item>> {
    let mut body = String::new();
    input.read_to_string(&mut body)?;
    body.lines()
        .map(|line| line.trim_matches(|c| matches!(c, ' ' | '\r' | '\n')))
        .filter(|line| !line.is_empty())
        .map(|line| Item::parse(line).map_err(anyhow::Error::from))
        .collect()
}

fn holder_or_random(holder: Option<Holder>) -> anyhow::Result<Holder> {
    match holder {
        Some(holder) => Ok(holder),
        None => Ok(Holder::parse(&format!("cli-{}", uuid::Uuid::new_v4()))?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_items_trims_lines_and_skips_blanks() {
        let items = read_items(Cursor::new(" x1 \r\n\n  \nx2")).unwrap();
        assert_eq!(items, vec![Item::parse("x1").unwrap(), Item::parse("x2").unwrap()]);
    }

    #[test]
    fn read_items_strips_interior_carriage_returns() {
        let items = read_items(Cursor::new("a\rb\n")).unwrap();
        assert_eq!(items, vec![Item::parse("ab").unwrap()]);
    }

    #[test]
    fn read_items_of_empty_input_is_empty() {
        assert!(read_items(Cursor::new("\n \n")).unwrap().is_empty());
    }
}
