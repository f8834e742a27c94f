use super::{parse_json_arg, print_json, runtime};
use clap::{Args, Subcommand};
use colored::Colorize;
use strata_query::{ConfigManager, Namespace};
use strata_query_mongodb::MongoDocumentStore;

#[derive(Args)]
pub struct DocCommand {
    /// Database overriding MONGO_DB
    #[arg(long, global = true)]
    database: Option<String>,

    /// Collection overriding MONGO_COLLECTION
    #[arg(long, global = true)]
    collection: Option<String>,

    #[command(subcommand)]
    command: DocCommands,
}

#[derive(Subcommand)]
enum DocCommands {
    /// Print the payload stored under a key
    Get { key: String },
    /// Insert or replace the payload stored under a key
    Set {
        key: String,
        /// JSON value, or @path to read it from a file
        value: String,
    },
    /// Delete a key
    Delete { key: String },
    /// Drop the selected collection, or the whole database when only
    /// --database is given
    Flush,
}

impl DocCommand {
    fn namespace(&self) -> Namespace {
        Namespace {
            database: self.database.clone(),
            collection: self.collection.clone(),
        }
    }

    pub fn execute(self, config: &ConfigManager) -> anyhow::Result<()> {
        let namespace = self.namespace();
        let rt = runtime()?;

        rt.block_on(async move {
            let store = MongoDocumentStore::from_config(config).await?;

            match self.command {
                DocCommands::Get { key } => {
                    let value = store.get_in(&key, &namespace).await?;
                    print_json(&value)?;
                }
                DocCommands::Set { key, value } => {
                    let value = parse_json_arg(&value)?;
                    store.set_in(&key, &value, &namespace).await?;
                    println!("{} {}", "Stored".bright_green(), key.bright_white());
                }
                DocCommands::Delete { key } => {
                    store.delete_in(&key, &namespace).await?;
                    println!("{} {}", "Deleted".bright_green(), key.bright_white());
                }
                DocCommands::Flush => {
                    store.flush(&namespace).await?;
                    println!("{} {}", "Flushed".bright_green(), namespace);
                }
            }

            Ok::<(), anyhow::Error>(())
        })
    }
}
