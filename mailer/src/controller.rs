use std::{path::Path, sync::Arc};

use anyhow::Context;
use mailer_common::{DaemonConfig, Shutdown, ShutdownReason, internal};
use mailer_delivery::{
    ConnectionSupervisor, Dispatcher, MessagePoller, PollerSettings, Relay, SmtpRelay,
    SupervisorExit, TemplateStore,
};
use mailer_queue::{AmqpBroker, Broker};
use tokio::signal::unix::{Signal, SignalKind, signal};

/// The daemon: one connection supervisor plus the OS signal listener.
#[derive(Debug)]
pub struct Mailer {
    config: Arc<DaemonConfig>,
}

impl Mailer {
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Load and validate the configuration at `path`.
    ///
    /// # Errors
    /// If the configuration cannot be read or is invalid
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let config = DaemonConfig::load(path)
            .with_context(|| format!("Unable to load configuration from {}", path.display()))?;

        Ok(Self::new(config))
    }

    #[must_use]
    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Run against the configured AMQP broker and SMTP relay until a signal
    /// arrives or the connection retry ceiling is exceeded.
    ///
    /// A second signal stops waiting on in-flight dispatches; their
    /// deliveries stay unacknowledged.
    ///
    /// # Errors
    /// If the signal handlers cannot be installed or the relay cannot be
    /// configured
    pub async fn run(self) -> anyhow::Result<SupervisorExit> {
        let broker = Arc::new(AmqpBroker::from_config(&self.config.queue));
        let relay = Arc::new(
            SmtpRelay::from_config(&self.config.relay)
                .context("Unable to configure the SMTP relay")?,
        );

        let shutdown = Shutdown::new();
        let mut listener = tokio::spawn(
            Signals::install()
                .context("Unable to install signal handlers")?
                .listen(shutdown.clone()),
        );

        let exit = tokio::select! {
            exit = self.serve(broker, relay, &shutdown) => exit,
            _ = &mut listener => {
                internal!(level = WARN, "Forced shutdown, abandoning in-flight dispatches");
                SupervisorExit::ShutdownRequested
            }
        };
        listener.abort();

        Ok(exit)
    }

    /// Run the pipeline against the given collaborators until `shutdown` is
    /// requested or the connection retry ceiling is exceeded.
    pub async fn serve(
        &self,
        broker: Arc<dyn Broker>,
        relay: Arc<dyn Relay>,
        shutdown: &Shutdown,
    ) -> SupervisorExit {
        let options = &self.config.options;

        let dispatcher = Dispatcher::new(TemplateStore::new(&self.config.paths.templates), relay)
            .with_default_subject(options.default_subject.clone());
        let poller = MessagePoller::new(PollerSettings::from_options(options), Arc::new(dispatcher));
        let mut supervisor = ConnectionSupervisor::from_options(broker, poller, options);

        internal!(level = INFO, "Mailer running");

        let exit = supervisor.run(shutdown).await;

        let stats = supervisor.poller().stats();
        internal!(
            level = INFO,
            cycles = stats.cycles,
            dispatched = stats.dispatched,
            read_errors = stats.read_errors,
            "Mailer stopped: {}",
            shutdown
                .reason()
                .map_or_else(|| "no reason recorded".to_string(), |reason| reason.to_string())
        );

        exit
    }
}

/// Interrupt, terminate and quit handlers.
struct Signals {
    interrupt: Signal,
    terminate: Signal,
    quit: Signal,
}

impl Signals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    async fn next(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.quit.recv() => "SIGQUIT",
        }
    }

    /// Request shutdown on the first signal, then return on the second.
    async fn listen(mut self, shutdown: Shutdown) {
        let name = self.next().await;
        internal!(level = INFO, "{name} received, finishing current cycle");
        shutdown.request(ShutdownReason::Signal(name));

        let name = self.next().await;
        internal!(level = WARN, "{name} received again, not waiting for in-flight work");
    }
}
