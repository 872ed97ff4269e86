use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::mirror::Mirror;
use crate::settings::AppConfig;

use super::supervisor::{supervision_loop, SupervisorState};

/// Owns the supervisor task. There is exactly one acquisition source per
/// deployment, so starting twice is an error.
pub struct AcquisitionController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    state_rx: Option<watch::Receiver<SupervisorState>>,
}

impl AcquisitionController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            state_rx: None,
        }
    }

    pub fn start(&mut self, config: AppConfig, db: Database, mirror: Mirror) -> Result<()> {
        if self.handle.is_some() {
            bail!("acquisition already active");
        }

        let cancel_token = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SupervisorState::Stopped);

        let handle = tokio::spawn(supervision_loop(
            config,
            db,
            mirror,
            cancel_token.clone(),
            state_tx,
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.state_rx = Some(state_rx);
        Ok(())
    }

    /// Current supervisor state; `Stopped` when never started.
    pub fn state(&self) -> SupervisorState {
        self.state_rx
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(SupervisorState::Stopped)
    }

    /// Watch every state transition, for external monitors.
    pub fn subscribe(&self) -> Option<watch::Receiver<SupervisorState>> {
        self.state_rx.clone()
    }

    /// Cooperative shutdown: cancel, then wait for the supervisor to finish
    /// its in-flight persistence and report `Stopped` (or `Failed`).
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            info!("waiting for acquisition supervisor to stop");
            handle
                .await
                .context("acquisition supervisor task failed to join")?;
        }
        Ok(())
    }
}

impl Default for AcquisitionController {
    fn default() -> Self {
        Self::new()
    }
}
