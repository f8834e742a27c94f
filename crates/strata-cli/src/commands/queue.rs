use super::{parse_json_arg, print_json, runtime};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::time::Duration;
use strata_query::ConfigManager;
use strata_query_redis::RedisStore;
use tracing::info;

#[derive(Args)]
pub struct QueueCommand {
    #[command(subcommand)]
    command: QueueCommands,
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Append a JSON list or object to a queue
    Push {
        queue: String,
        /// JSON value, or @path to read it from a file
        value: String,
    },
    /// Take the next entry, waiting up to --timeout seconds
    Pop {
        queue: String,
        #[arg(long, default_value_t = 1.0)]
        timeout: f64,
    },
    /// Number of waiting entries
    Len { queue: String },
}

impl QueueCommand {
    pub fn execute(self, config: &ConfigManager) -> anyhow::Result<()> {
        let store = RedisStore::from_config(config)?;
        let rt = runtime()?;

        match self.command {
            QueueCommands::Push { queue, value } => {
                let value = parse_json_arg(&value)?;
                rt.block_on(store.push(&queue, &value))?;
                info!("Pushed entry onto {}", queue);
                println!("{} {}", "Pushed onto".bright_green(), queue.bright_white());
            }
            QueueCommands::Pop { queue, timeout } => {
                if !timeout.is_finite() || timeout < 0.0 {
                    anyhow::bail!("--timeout must be a non-negative number of seconds");
                }
                match rt.block_on(store.pop(&queue, Duration::from_secs_f64(timeout)))? {
                    Some(value) => print_json(&value)?,
                    None => println!(
                        "{}",
                        format!("Queue {} is empty after {}s", queue, timeout).bright_yellow()
                    ),
                }
            }
            QueueCommands::Len { queue } => {
                let length = rt.block_on(store.length(&queue))?;
                println!("{}", length);
            }
        }

        Ok(())
    }
}
