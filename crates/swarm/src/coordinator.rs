// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Explicit wiring of every kernel capability. Built once at startup and
//! handed to the CLI or any embedding code; there is no ambient state and no
//! default instance.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ack::AckTracker;
use crate::clock::{Clock, SystemClock};
use crate::config::SwarmConfig;
use crate::coordination::CoordinationFile;
use crate::envelope::{Envelope, MessageLog};
use crate::error::Result;
use crate::inspect::{ProcInspector, ProcessInspector};
use crate::lock::LockManager;
use crate::messaging::Messenger;
use crate::project::StatePaths;
use crate::ratelimit::RateLimiter;
use crate::registry::{AgentRegistry, RefreshOptions};
use crate::secret::{FileSecretStore, SecretSource};
use crate::tmux::{Multiplexer, TmuxDriver};

/// One process's view of the coordination substrate.
pub struct Coordinator {
    pub paths: StatePaths,
    pub config: SwarmConfig,
    pub clock: Arc<dyn Clock>,
    pub mux: Arc<dyn Multiplexer>,
    pub inspector: Arc<dyn ProcessInspector>,
    pub registry: Arc<AgentRegistry>,
    pub locks: Arc<LockManager>,
    pub coordination: Arc<CoordinationFile>,
    pub limiter: Arc<RateLimiter>,
    pub log: Arc<MessageLog>,
    pub secret: Arc<dyn SecretSource>,
    pub messenger: Arc<Messenger>,
    pub acks: Arc<AckTracker>,
    ack_rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
}

impl Coordinator {
    /// Production wiring for the project rooted at `root`.
    pub fn open(root: PathBuf, config: SwarmConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let mux: Arc<dyn Multiplexer> =
            Arc::new(TmuxDriver::new().with_socket(config.tmux_socket.clone()));
        let inspector: Arc<dyn ProcessInspector> =
            Arc::new(ProcInspector::new(&config.assistant_pattern)?);
        let secret: Arc<dyn SecretSource> = Arc::new(FileSecretStore::default_location()?);
        Self::build(root, config, clock, mux, inspector, secret)
    }

    /// Wiring with injected capabilities. Tests substitute fakes here.
    pub fn build(
        root: PathBuf,
        config: SwarmConfig,
        clock: Arc<dyn Clock>,
        mux: Arc<dyn Multiplexer>,
        inspector: Arc<dyn ProcessInspector>,
        secret: Arc<dyn SecretSource>,
    ) -> Result<Self> {
        let paths = StatePaths::new(root);

        let locks = Arc::new(
            LockManager::new(paths.root(), paths.lock_dir(), Arc::clone(&clock))
                .with_stale_timeout(config.lock_stale_timeout),
        );
        let registry =
            Arc::new(AgentRegistry::new(paths.clone(), Arc::clone(&clock), Arc::clone(&locks)));
        let coordination =
            Arc::new(CoordinationFile::new(paths.coordination(), Arc::clone(&locks)));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit, Arc::clone(&clock)));
        let log = Arc::new(MessageLog::new(paths.message_log()));

        let messenger = Arc::new(Messenger::new(
            Arc::clone(&registry),
            Arc::clone(&mux),
            Arc::clone(&limiter),
            Arc::clone(&log),
            Arc::clone(&secret),
            Arc::clone(&clock),
        ));
        let acks = Arc::new(AckTracker::new(
            Arc::clone(&messenger),
            Arc::clone(&log),
            Arc::clone(&clock),
            config.ack,
            paths.pending_acks(),
        ));

        // ACK-requiring sends flow through this channel. Long-lived
        // processes drain it with `spawn_ack_tracker`; one-shot commands
        // drain it synchronously with `flush_pending_acks` before exit.
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        messenger.set_ack_channel(ack_tx);

        Ok(Self {
            paths,
            config,
            clock,
            mux,
            inspector,
            registry,
            locks,
            coordination,
            limiter,
            log,
            secret,
            messenger,
            acks,
            ack_rx: Mutex::new(Some(ack_rx)),
        })
    }

    /// Refresh options derived from the configuration.
    pub fn refresh_options(&self) -> RefreshOptions {
        RefreshOptions {
            stale_threshold: self.config.stale_threshold,
            cross_project: self.config.cross_project,
            session: None,
            include_unknown_cwd: self.config.strict_project_isolation.then_some(false),
        }
    }

    /// Start the acknowledgement tracker task. Returns `None` when it was
    /// already started.
    pub fn spawn_ack_tracker(
        &self,
        shutdown: CancellationToken,
    ) -> Option<tokio::task::JoinHandle<()>> {
        let rx = self.ack_rx.lock().take()?;
        Some(tokio::spawn(Arc::clone(&self.acks).run(rx, shutdown)))
    }

    /// Register any ACK-requiring envelopes produced so far, persisting the
    /// pending table. Used by one-shot commands that exit immediately.
    pub fn flush_pending_acks(&self) {
        let mut guard = self.ack_rx.lock();
        let Some(rx) = guard.as_mut() else {
            return; // tracker task owns the channel
        };
        while let Ok(envelope) = rx.try_recv() {
            self.acks.track(&envelope);
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
