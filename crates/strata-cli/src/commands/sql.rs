use super::{parse_json_arg, print_json, runtime};
use clap::{Args, Subcommand};
use serde_json::Value;
use strata_query::ConfigManager;
use strata_query_postgres::{PostgresStore, QueryDescriptor};
use tracing::debug;

#[derive(Args)]
pub struct SqlCommand {
    #[command(subcommand)]
    command: SqlCommands,
}

#[derive(Subcommand)]
enum SqlCommands {
    /// Run a JSON query descriptor and print the rows as JSON records
    Query {
        /// Descriptor JSON, or @path to read it from a file
        descriptor: String,
        /// Search path overriding the descriptor's schema
        #[arg(long)]
        schema: Option<String>,
    },
    /// List the columns of a table
    Columns {
        table: String,
        #[arg(long)]
        schema: Option<String>,
    },
}

impl SqlCommand {
    pub fn execute(self, config: &ConfigManager) -> anyhow::Result<()> {
        let store = PostgresStore::from_config(config)?;
        let rt = runtime()?;

        match self.command {
            SqlCommands::Query { descriptor, schema } => {
                let mut descriptor = QueryDescriptor::from_json(parse_json_arg(&descriptor)?)?;
                if let Some(schema) = schema {
                    descriptor = descriptor.in_schema(schema);
                }
                debug!("Running descriptor on table {}", descriptor.table);

                let table = rt.block_on(store.query(&descriptor))?;
                let records = table.to_records().into_iter().map(Value::Object).collect();
                print_json(&Value::Array(records))?;
            }
            SqlCommands::Columns { table, schema } => {
                for column in rt.block_on(store.column_names(&table, schema.as_deref()))? {
                    println!("{}", column);
                }
            }
        }

        Ok(())
    }
}
