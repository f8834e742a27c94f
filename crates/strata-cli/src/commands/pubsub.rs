use super::runtime;
use clap::Args;
use colored::Colorize;
use std::time::Duration;
use strata_query::ConfigManager;
use strata_query_redis::{ExecutionMode, PrintingHandler, RedisStore, SubscriptionOptions};
use tracing::info;

#[derive(Args)]
pub struct PublishCommand {
    channel: String,
    message: String,
}

impl PublishCommand {
    pub fn execute(self, config: &ConfigManager) -> anyhow::Result<()> {
        let store = RedisStore::from_config(config)?;
        let receivers = runtime()?.block_on(store.publish(&self.channel, &self.message))?;

        println!(
            "{} {} ({} receivers)",
            "Published to".bright_green(),
            self.channel.bright_white(),
            receivers
        );
        Ok(())
    }
}

#[derive(Args)]
pub struct SubscribeCommand {
    channel: String,

    /// Stop after this many messages
    #[arg(long, default_value_t = PrintingHandler::DEFAULT_LIMIT)]
    limit: usize,

    /// Stop after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Seconds to sleep between polls when idle
    #[arg(long, default_value_t = 1.0)]
    poll_interval: f64,

    /// Where to run the loop: inline, task or thread
    #[arg(long, default_value = "inline")]
    mode: String,
}

impl SubscribeCommand {
    pub fn execute(self, config: &ConfigManager) -> anyhow::Result<()> {
        if !self.poll_interval.is_finite() || self.poll_interval < 0.0 {
            anyhow::bail!("--poll-interval must be a non-negative number of seconds");
        }

        let store = RedisStore::from_config(config)?;
        let mode: ExecutionMode = self.mode.parse()?;

        let mut options = SubscriptionOptions::new()
            .with_mode(mode)
            .with_poll_interval(Duration::from_secs_f64(self.poll_interval));
        if let Some(secs) = self.timeout {
            options = options.with_timeout(Duration::from_secs(secs));
        }

        info!("Listening on {} ({:?})", self.channel, mode);
        let outcome = runtime()?.block_on(async {
            let run = store
                .run_subscription(&self.channel, PrintingHandler::with_limit(self.limit), options)
                .await?;
            run.wait().await
        })?;

        println!(
            "{} after {} message(s): {:?}",
            "Subscription ended".bright_green(),
            outcome.messages,
            outcome.reason
        );
        Ok(())
    }
}
