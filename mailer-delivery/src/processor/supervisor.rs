use std::{sync::Arc, time::Duration};

use mailer_common::{Shutdown, ShutdownReason, config::Options, internal};
use mailer_queue::Broker;

use crate::{
    policy::{RetryCounter, RetryPolicy},
    processor::{MessagePoller, PollerExit},
};

/// Why [`ConnectionSupervisor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// Shutdown was requested elsewhere, usually by a signal.
    ShutdownRequested,
    /// The connection retry ceiling was exceeded; shutdown has been requested.
    RetriesExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Owns the broker connection lifecycle.
///
/// Each iteration counts an attempt, then connects. A live session is
/// handed to the [`MessagePoller`] until it returns, after which in-flight
/// dispatches are drained and the session is closed: a poller that returns
/// is taken to mean the session can no longer be trusted. Connecting resets
/// the attempt count, so the retry ceiling only applies to consecutive
/// failed connects. Exceeding it requests process-wide shutdown.
pub struct ConnectionSupervisor {
    broker: Arc<dyn Broker>,
    poller: MessagePoller,
    attempts: RetryCounter,
    retry_interval: Duration,
    state: ConnectionState,
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("poller", &self.poller)
            .field("attempts", &self.attempts)
            .field("retry_interval", &self.retry_interval)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ConnectionSupervisor {
    pub fn new(
        broker: Arc<dyn Broker>,
        poller: MessagePoller,
        retries: RetryPolicy,
        retry_interval: Duration,
    ) -> Self {
        Self {
            broker,
            poller,
            attempts: RetryCounter::new(retries),
            retry_interval,
            state: ConnectionState::Disconnected,
        }
    }

    /// Build a supervisor using the `conn-*` options.
    pub fn from_options(broker: Arc<dyn Broker>, poller: MessagePoller, options: &Options) -> Self {
        Self::new(
            broker,
            poller,
            RetryPolicy::new(options.conn_max_retries),
            options.conn_retry_interval,
        )
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub const fn poller(&self) -> &MessagePoller {
        &self.poller
    }

    /// Consecutive connection attempts since the last successful connect.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts.failures()
    }

    /// Run until shutdown is requested or the retry ceiling is exceeded.
    pub async fn run(&mut self, shutdown: &Shutdown) -> SupervisorExit {
        loop {
            if shutdown.is_requested() {
                internal!(level = INFO, "Connection supervisor stopping");
                return SupervisorExit::ShutdownRequested;
            }

            let attempt = self.attempts.record_failure();
            self.connect_and_poll(attempt, shutdown).await;

            if self.attempts.exceeded() {
                internal!(
                    level = ERROR,
                    "Giving up after {} consecutive failed connection attempts",
                    self.attempts.failures()
                );
                shutdown.request(ShutdownReason::RetriesExhausted);
                return SupervisorExit::RetriesExhausted;
            }

            if !shutdown.is_requested() {
                internal!(
                    level = DEBUG,
                    "Reconnecting in {}s",
                    self.retry_interval.as_secs()
                );
            }
            shutdown.sleep(self.retry_interval).await;
        }
    }

    async fn connect_and_poll(&mut self, attempt: u32, shutdown: &Shutdown) {
        let policy = self.attempts.policy();
        if policy.is_unlimited() {
            internal!(level = INFO, "Connection attempt [{attempt}]");
        } else {
            internal!(
                level = INFO,
                "Connection attempt [{attempt}] of [{}]",
                policy.max_failures()
            );
        }

        let mut session = match self.broker.connect().await {
            Ok(session) => session,
            Err(error) => {
                internal!(level = WARN, error = %error, "Failed to connect to broker");
                return;
            }
        };

        self.attempts.reset();
        self.state = ConnectionState::Connected;
        internal!(level = INFO, "Connected to broker");

        let exit = self.poller.run(session.as_mut(), shutdown).await;
        if exit == PollerExit::SessionDegraded {
            internal!(level = WARN, "Session degraded, reconnecting");
        }

        let aborted = self.poller.drain().await;
        if aborted > 0 {
            internal!(level = WARN, "{aborted} dispatches abandoned before close");
        }

        if let Err(error) = session.close().await {
            internal!(level = WARN, error = %error, "Failed to close broker session");
        }
        self.state = ConnectionState::Disconnected;
    }
}
