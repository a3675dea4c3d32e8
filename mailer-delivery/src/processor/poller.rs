use std::{sync::Arc, time::Duration};

use mailer_common::{Shutdown, config::Options, incoming, internal};
use mailer_queue::{Delivery, Session};
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

use crate::{
    policy::{RetryCounter, RetryPolicy},
    processor::Dispatcher,
};

/// Why [`MessagePoller::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerExit {
    /// Shutdown was observed at the top of a cycle.
    ShutdownRequested,
    /// Too many consecutive reads failed; the session is presumed dead.
    SessionDegraded,
}

/// Running totals across every session the poller has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Poll cycles started.
    pub cycles: u64,
    /// Deliveries handed to the dispatcher.
    pub dispatched: u64,
    /// Reads that found the queue empty.
    pub empty_polls: u64,
    /// Reads that failed.
    pub read_errors: u64,
}

/// Poller tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerSettings {
    /// Queue to drain, before the broker applies its prefix.
    pub queue: String,
    /// Upper bound on deliveries pulled per cycle.
    pub max_messages: usize,
    /// Pause between cycles.
    pub interval: Duration,
    /// Tolerance for consecutive read failures.
    pub read_errors: RetryPolicy,
    /// How long [`MessagePoller::drain`] waits on in-flight dispatches.
    pub drain_timeout: Duration,
}

impl PollerSettings {
    #[must_use]
    pub fn from_options(options: &Options) -> Self {
        Self {
            queue: options.poll_queue.clone(),
            max_messages: options.poll_max_messages,
            interval: options.poll_interval,
            read_errors: RetryPolicy::new(options.poll_max_errors),
            drain_timeout: options.shutdown_timeout,
        }
    }
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self::from_options(&Options::default())
    }
}

/// Drains a live session in bounded batches.
///
/// Each cycle pulls up to `max_messages` deliveries and spawns one dispatch
/// task per delivery onto a task group the poller owns. A cycle ends early
/// when the queue is empty. Read failures do not use up a batch slot; they
/// are counted, and once the count passes the read-error ceiling the poller
/// gives the session up so the supervisor can reconnect. Any successful
/// read, empty or not, resets the count. With an unlimited read-error
/// policy the session is never given up, and a failed read ends the cycle
/// instead.
///
/// Dispatch tasks may outlive [`run`](Self::run); the owner calls
/// [`drain`](Self::drain) before closing the session so their
/// acknowledgements still reach the broker.
#[derive(Debug)]
pub struct MessagePoller {
    settings: PollerSettings,
    dispatcher: Arc<Dispatcher>,
    in_flight: JoinSet<()>,
    read_errors: RetryCounter,
    stats: PollerStats,
}

impl MessagePoller {
    pub fn new(settings: PollerSettings, dispatcher: Arc<Dispatcher>) -> Self {
        let read_errors = RetryCounter::new(settings.read_errors);
        Self {
            settings,
            dispatcher,
            in_flight: JoinSet::new(),
            read_errors,
            stats: PollerStats::default(),
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    #[must_use]
    pub const fn stats(&self) -> PollerStats {
        self.stats
    }

    /// Dispatch tasks not yet joined.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Poll `session` until shutdown is requested or the session degrades.
    pub async fn run(&mut self, session: &mut dyn Session, shutdown: &Shutdown) -> PollerExit {
        self.read_errors.reset();

        internal!(
            level = INFO,
            queue = %self.settings.queue,
            "Polling for up to {} messages every {}s",
            self.settings.max_messages,
            self.settings.interval.as_secs()
        );

        loop {
            if shutdown.is_requested() {
                internal!(level = INFO, "Message poller stopping");
                return PollerExit::ShutdownRequested;
            }

            self.reap();

            if self.poll_batch(session).await.is_err() {
                internal!(
                    level = ERROR,
                    queue = %self.settings.queue,
                    "Too many consecutive read errors [{}], abandoning session",
                    self.read_errors.failures()
                );
                return PollerExit::SessionDegraded;
            }

            shutdown.sleep(self.settings.interval).await;
        }
    }

    /// One cycle. Fails once the read-error ceiling has been passed.
    async fn poll_batch(&mut self, session: &mut dyn Session) -> Result<(), ()> {
        self.stats.cycles += 1;
        let mut taken = 0;

        while taken < self.settings.max_messages {
            match session.retrieve(&self.settings.queue).await {
                Ok(Some(delivery)) => {
                    self.read_errors.reset();
                    taken += 1;
                    self.spawn(delivery);
                }
                Ok(None) => {
                    self.read_errors.reset();
                    self.stats.empty_polls += 1;
                    incoming!("Queue {} is empty", self.settings.queue);
                    break;
                }
                Err(error) => {
                    let failures = self.read_errors.record_failure();
                    self.stats.read_errors += 1;
                    incoming!(
                        level = WARN,
                        error = %error,
                        "Read error [{failures}] on queue {}",
                        self.settings.queue
                    );

                    if self.read_errors.exceeded() {
                        return Err(());
                    }
                    if self.read_errors.policy().is_unlimited() {
                        break;
                    }
                }
            }
        }

        if taken > 0 {
            incoming!(level = DEBUG, "Dispatched {taken} messages this cycle");
        }

        Ok(())
    }

    fn spawn(&mut self, delivery: Delivery) {
        self.stats.dispatched += 1;

        let span = tracing::debug_span!("dispatch", message_id = %delivery.id);
        let dispatcher = Arc::clone(&self.dispatcher);
        self.in_flight
            .spawn(async move { dispatcher.process(delivery).await }.instrument(span));
    }

    /// Join dispatch tasks that have already finished.
    fn reap(&mut self) {
        while let Some(result) = self.in_flight.try_join_next() {
            log_join(result);
        }
    }

    /// Wait for in-flight dispatch tasks, up to the drain timeout.
    ///
    /// Tasks still running at the deadline are aborted and their deliveries
    /// stay unacknowledged. Returns the number aborted.
    pub async fn drain(&mut self) -> usize {
        if self.in_flight.is_empty() {
            return 0;
        }

        internal!(
            level = INFO,
            "Waiting up to {}s for {} in-flight dispatches",
            self.settings.drain_timeout.as_secs(),
            self.in_flight.len()
        );

        let in_flight = &mut self.in_flight;
        let joined = tokio::time::timeout(self.settings.drain_timeout, async {
            while let Some(result) = in_flight.join_next().await {
                log_join(result);
            }
        })
        .await;

        if joined.is_ok() {
            internal!("All in-flight dispatches completed");
            return 0;
        }

        let aborted = self.in_flight.len();
        internal!(
            level = WARN,
            "Drain timeout exceeded, aborting {aborted} dispatches; they will be redelivered"
        );
        self.in_flight.abort_all();
        while self.in_flight.join_next().await.is_some() {}

        aborted
    }
}

fn log_join(result: Result<(), JoinError>) {
    if let Err(error) = result
        && error.is_panic()
    {
        internal!(level = ERROR, "Dispatch task panicked: {error}");
    }
}
