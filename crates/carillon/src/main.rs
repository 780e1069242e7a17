//! Carillon: escalating reminder delivery daemon.
//!
//! Subcommands:
//! - `daemon`: run the delivery pipeline (recovery, wakes, delivery)
//! - `schedule`: add or replace a reminder record in the store
//! - `cancel`: remove a reminder record from the store
//! - `status`: list pending reminder records

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use carillon::daemon::{self, DaemonConfig};
use carillon_store::ReminderStore;

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

#[derive(Parser)]
#[command(name = "carillon")]
#[command(about = "Escalating reminder delivery daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the delivery daemon (recovery pass, exact wakes, delivery)
    Daemon {
        /// Path of the durable reminder store
        #[arg(long, env = "CARILLON_STORE_PATH", default_value = "reminders.json")]
        store_path: PathBuf,

        /// Whether exact wake scheduling is permitted
        #[arg(long, env = "CARILLON_EXACT_ALARMS", value_parser = parse_bool_env, default_value = "true")]
        exact_alarms: bool,

        /// Whether exact wakes may bypass host idle modes
        #[arg(long, env = "CARILLON_IDLE_BYPASS", value_parser = parse_bool_env, default_value = "true")]
        idle_bypass: bool,

        /// Hold a keep-alive presence while the daemon runs
        #[arg(long, env = "CARILLON_KEEP_ALIVE", value_parser = parse_bool_env, default_value = "true")]
        keep_alive: bool,
    },

    /// Add or replace a reminder record; the daemon arms it on its next
    /// recovery pass
    Schedule {
        /// Reminder id
        id: i64,

        /// Fire time as epoch milliseconds
        fire_at_millis: i64,

        /// Opaque payload forwarded to the consumer at delivery
        #[arg(long)]
        payload: Option<String>,

        /// Path of the durable reminder store
        #[arg(long, env = "CARILLON_STORE_PATH", default_value = "reminders.json")]
        store_path: PathBuf,
    },

    /// Remove a reminder record
    Cancel {
        /// Reminder id
        id: i64,

        /// Path of the durable reminder store
        #[arg(long, env = "CARILLON_STORE_PATH", default_value = "reminders.json")]
        store_path: PathBuf,
    },

    /// List pending reminder records
    Status {
        /// Path of the durable reminder store
        #[arg(long, env = "CARILLON_STORE_PATH", default_value = "reminders.json")]
        store_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "carillon=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon {
            store_path,
            exact_alarms,
            idle_bypass,
            keep_alive,
        } => {
            daemon::run_with_config(DaemonConfig {
                store_path,
                exact_alarms,
                idle_bypass,
                keep_alive,
            })
            .await
        }

        Commands::Schedule {
            id,
            fire_at_millis,
            payload,
            store_path,
        } => {
            use chrono::TimeZone;
            let fire_at = chrono::Utc
                .timestamp_millis_opt(fire_at_millis)
                .single()
                .ok_or_else(|| miette::miette!("invalid fire time: {}", fire_at_millis))?;

            let store = ReminderStore::open(&store_path);
            store
                .put(id, fire_at, payload)
                .map_err(|e| miette::miette!("{}", e))?;
            println!("scheduled reminder {} for {}", id, fire_at);
            Ok(())
        }

        Commands::Cancel { id, store_path } => {
            let store = ReminderStore::open(&store_path);
            store.remove(id).map_err(|e| miette::miette!("{}", e))?;
            println!("cancelled reminder {}", id);
            Ok(())
        }

        Commands::Status { store_path } => {
            let store = ReminderStore::open(&store_path);
            let records = store.list();
            if records.is_empty() {
                println!("no pending reminders");
            } else {
                for record in records {
                    match record.payload {
                        Some(payload) => {
                            println!("{}\t{}\t{}", record.id, record.fire_at, payload)
                        }
                        None => println!("{}\t{}", record.id, record.fire_at),
                    }
                }
            }
            Ok(())
        }
    }
}
