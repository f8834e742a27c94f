//! Subscription loop: poll a [`Subscription`], hand each message to a
//! [`MessageHandler`] and stop when the handler says so or the timeout elapses.

use crate::pubsub::{ChannelMessage, Subscription};
use crate::RedisStore;
use std::time::{Duration, Instant};
use strata_query::{DataError, Result};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Receives channel messages. Returning `false` stops the loop.
pub trait MessageHandler: Send + 'static {
    fn handle(&mut self, message: &ChannelMessage) -> bool;
}

impl<F> MessageHandler for F
where
    F: FnMut(&ChannelMessage) -> bool + Send + 'static,
{
    fn handle(&mut self, message: &ChannelMessage) -> bool {
        self(message)
    }
}

/// Logs every message and stops after `limit` of them
#[derive(Debug, Clone)]
pub struct PrintingHandler {
    seen: usize,
    limit: usize,
}

impl PrintingHandler {
    pub const DEFAULT_LIMIT: usize = 10;

    pub fn new() -> Self {
        Self::with_limit(Self::DEFAULT_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self { seen: 0, limit }
    }

    pub fn seen(&self) -> usize {
        self.seen
    }
}

impl Default for PrintingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHandler for PrintingHandler {
    fn handle(&mut self, message: &ChannelMessage) -> bool {
        self.seen += 1;
        info!(
            "[{}] message {}/{}: {}",
            message.channel, self.seen, self.limit, message.payload
        );
        self.seen < self.limit
    }
}

/// Where the loop runs.
///
/// There is no process-isolated mode: handlers are in-memory closures and state
/// that cannot be moved into another process. `Thread` gives the loop its own OS
/// thread and runtime instead.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum ExecutionMode {
    /// On the caller's task; the call returns when the loop ends
    #[default]
    Inline,
    /// On an independent tokio task
    Task,
    /// On a dedicated OS thread with its own runtime
    Thread,
}

impl std::str::FromStr for ExecutionMode {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "inline" | "sync" => Ok(ExecutionMode::Inline),
            "task" => Ok(ExecutionMode::Task),
            "thread" => Ok(ExecutionMode::Thread),
            _ => Err(DataError::validation(format!(
                "Unknown execution mode '{}', expected inline, task or thread",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    pub mode: ExecutionMode,
    /// Stop once this much time has passed since the loop started
    pub timeout: Option<Duration>,
    /// Sleep between polls that found no message
    pub poll_interval: Duration,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Inline,
            timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl SubscriptionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StopReason {
    HandlerStopped,
    TimedOut,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SubscriptionOutcome {
    /// Messages handed to the handler
    pub messages: usize,
    pub reason: StopReason,
}

/// Result of [`RedisStore::run_subscription`]
#[derive(Debug)]
pub enum SubscriptionRun {
    /// The loop ran inline and has finished
    Completed(SubscriptionOutcome),
    /// The loop is running elsewhere
    Detached(DetachedSubscription),
}

impl SubscriptionRun {
    /// Outcome of the loop, waiting for a detached loop to finish
    pub async fn wait(self) -> Result<SubscriptionOutcome> {
        match self {
            SubscriptionRun::Completed(outcome) => Ok(outcome),
            SubscriptionRun::Detached(handle) => handle.join().await,
        }
    }
}

#[derive(Debug)]
enum Locus {
    Task(tokio::task::JoinHandle<Result<SubscriptionOutcome>>),
    Thread(std::thread::JoinHandle<Result<SubscriptionOutcome>>),
}

/// Handle to a loop running on its own task or thread
#[derive(Debug)]
pub struct DetachedSubscription {
    channel: String,
    locus: Locus,
}

impl DetachedSubscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_finished(&self) -> bool {
        match &self.locus {
            Locus::Task(handle) => handle.is_finished(),
            Locus::Thread(handle) => handle.is_finished(),
        }
    }

    /// Wait for the loop to end
    pub async fn join(self) -> Result<SubscriptionOutcome> {
        match self.locus {
            Locus::Task(handle) => handle.await.map_err(|e| {
                error!("Subscription task for {} failed: {}", self.channel, e);
                DataError::backend(format!("Subscription task for {} failed", self.channel), e)
            })?,
            Locus::Thread(handle) => {
                let joined = tokio::task::spawn_blocking(move || handle.join())
                    .await
                    .map_err(|e| DataError::backend("Failed to join subscription thread", e))?;
                joined.map_err(|_| {
                    error!("Subscription thread for {} panicked", self.channel);
                    DataError::backend(
                        format!("Subscription thread for {} failed", self.channel),
                        "thread panicked",
                    )
                })?
            }
        }
    }
}

/// Poll until the handler declines or the timeout elapses.
///
/// The handler always runs to completion; the timeout is checked between polls.
async fn drive<H: MessageHandler>(
    mut subscription: Subscription,
    mut handler: H,
    options: SubscriptionOptions,
) -> Result<SubscriptionOutcome> {
    let started = Instant::now();
    let mut messages = 0;

    let reason = loop {
        match subscription.next()? {
            Some(message) => {
                messages += 1;
                if !handler.handle(&message) {
                    break StopReason::HandlerStopped;
                }
            }
            None => tokio::time::sleep(options.poll_interval).await,
        }

        if let Some(timeout) = options.timeout {
            if started.elapsed() > timeout {
                break StopReason::TimedOut;
            }
        }
    };

    debug!(
        "Subscription to {} stopped after {} message(s): {:?}",
        subscription.channel(),
        messages,
        reason
    );
    subscription.close();

    Ok(SubscriptionOutcome { messages, reason })
}

impl RedisStore {
    /// Subscribe to `channel` and feed its messages to `handler`.
    ///
    /// The subscription is confirmed before this returns in every mode. Inline
    /// runs the loop to completion; `Task` and `Thread` return a detached handle
    /// immediately. Results produced by the handler flow back through whatever
    /// state the handler captured.
    pub async fn run_subscription<H: MessageHandler>(
        &self,
        channel: &str,
        handler: H,
        options: SubscriptionOptions,
    ) -> Result<SubscriptionRun> {
        debug!("Starting subscription loop on {} ({:?})", channel, options.mode);

        match options.mode {
            ExecutionMode::Inline => {
                let subscription = self.subscribe(channel).await?;
                let outcome = drive(subscription, handler, options).await?;
                Ok(SubscriptionRun::Completed(outcome))
            }
            ExecutionMode::Task => {
                let subscription = self.subscribe(channel).await?;
                let handle = tokio::spawn(drive(subscription, handler, options));
                Ok(SubscriptionRun::Detached(DetachedSubscription {
                    channel: channel.to_string(),
                    locus: Locus::Task(handle),
                }))
            }
            ExecutionMode::Thread => self.spawn_thread(channel, handler, options).await,
        }
    }

    async fn spawn_thread<H: MessageHandler>(
        &self,
        channel: &str,
        handler: H,
        options: SubscriptionOptions,
    ) -> Result<SubscriptionRun> {
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let store = self.clone();
        let thread_channel = channel.to_string();

        let handle = std::thread::Builder::new()
            .name(format!("strata-sub-{}", channel))
            .spawn(move || -> Result<SubscriptionOutcome> {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| DataError::backend("Failed to build subscription runtime", e))?;

                runtime.block_on(async move {
                    let subscription = match store.subscribe(&thread_channel).await {
                        Ok(subscription) => {
                            let _ = ready_tx.send(Ok(()));
                            subscription
                        }
                        Err(e) => {
                            let message = e.to_string();
                            let _ = ready_tx.send(Err(e));
                            return Err(DataError::backend("Subscription setup failed", message));
                        }
                    };
                    drive(subscription, handler, options).await
                })
            })
            .map_err(|e| DataError::backend("Failed to spawn subscription thread", e))?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(SubscriptionRun::Detached(DetachedSubscription {
                channel: channel.to_string(),
                locus: Locus::Thread(handle),
            })),
            Ok(Err(e)) => Err(e),
            // The thread exited before subscribing; its result holds the reason
            Err(_) => {
                let detached = DetachedSubscription {
                    channel: channel.to_string(),
                    locus: Locus::Thread(handle),
                };
                Err(detached.join().await.err().unwrap_or_else(|| {
                    DataError::backend("Subscription thread exited early", "no subscription")
                }))
            }
        }
    }
}
