//! Owns the external acquisition process and the write path.
//!
//! The loop walks `Stopped -> Starting -> Running -> Backoff -> Starting ...`
//! until it is cancelled (-> `Stopped`) or gives up (-> `Failed`). Every line
//! read from the process is normalized and, if valid, persisted exactly once;
//! the store's idempotent insert absorbs redelivery across restarts.

use std::process::Stdio;

use anyhow::{Context as _, Result};
use chrono::Utc;
use log::{debug, error, info, warn};
use rand::Rng as _;
use serde::Serialize;
use tokio::{
    io::{AsyncBufReadExt as _, BufReader},
    process::{Child, Command},
    sync::watch,
    time::{timeout, Duration},
};
use tokio_util::sync::CancellationToken;

use crate::{
    db::{Database, Reading},
    mirror::Mirror,
    settings::{AppConfig, SupervisorConfig},
    sleep_date::sleep_date_for,
};

use super::parser::{parse_line, SampleError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Backoff,
    Failed,
}

enum AttemptEnd {
    Cancelled,
    Exited { persisted: u64, rejected: u64 },
}

/// Drive the acquisition process until cancelled or failed. State transitions
/// are published on `state_tx` for external monitors.
pub async fn supervision_loop(
    config: AppConfig,
    db: Database,
    mirror: Mirror,
    cancel: CancellationToken,
    state_tx: watch::Sender<SupervisorState>,
) {
    let mut consecutive_failures: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            state_tx.send_replace(SupervisorState::Stopped);
            return;
        }

        state_tx.send_replace(SupervisorState::Starting);
        match run_attempt(&config, &db, &mirror, &cancel, &state_tx).await {
            Ok(AttemptEnd::Cancelled) => {
                info!("acquisition supervisor stopped");
                state_tx.send_replace(SupervisorState::Stopped);
                return;
            }
            Ok(AttemptEnd::Exited { persisted, rejected }) => {
                // An attempt only counts as a success once it persisted data.
                if persisted > 0 {
                    consecutive_failures = 0;
                } else {
                    consecutive_failures += 1;
                }
                warn!(
                    "acquisition attempt ended: persisted {persisted}, rejected {rejected}, \
                     consecutive failures {consecutive_failures}"
                );
            }
            Err(err) => {
                // Store write failure. Halting beats silently dropping data.
                error!("persistence failure, halting ingestion: {err:?}");
                state_tx.send_replace(SupervisorState::Failed);
                return;
            }
        }

        if consecutive_failures >= config.supervisor.max_consecutive_failures {
            error!("giving up after {consecutive_failures} consecutive failed starts");
            state_tx.send_replace(SupervisorState::Failed);
            return;
        }

        state_tx.send_replace(SupervisorState::Backoff);
        let delay = backoff_delay(consecutive_failures, &config.supervisor);
        debug!("retrying acquisition in {delay:?}");
        tokio::select! {
            _ = cancel.cancelled() => {
                state_tx.send_replace(SupervisorState::Stopped);
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// One process lifetime: spawn, stream lines, persist valid samples.
/// `Err` means the store rejected a write; everything else ends the attempt
/// and lets the outer loop decide whether to retry.
async fn run_attempt(
    config: &AppConfig,
    db: &Database,
    mirror: &Mirror,
    cancel: &CancellationToken,
    state_tx: &watch::Sender<SupervisorState>,
) -> Result<AttemptEnd> {
    let mut command = Command::new(&config.acquisition.program);
    command
        .args(&config.acquisition.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(
                "failed to launch acquisition process '{}': {err}",
                config.acquisition.program
            );
            return Ok(AttemptEnd::Exited {
                persisted: 0,
                rejected: 0,
            });
        }
    };
    info!(
        "acquisition process started: {} {}",
        config.acquisition.program,
        config.acquisition.args.join(" ")
    );

    let Some(stdout) = child.stdout.take() else {
        shutdown_child(&mut child).await;
        warn!("acquisition process has no capturable output");
        return Ok(AttemptEnd::Exited {
            persisted: 0,
            rejected: 0,
        });
    };
    let mut lines = BufReader::new(stdout).lines();
    let stall = Duration::from_secs(config.supervisor.stall_timeout_secs);

    let mut persisted = 0u64;
    let mut rejected = 0u64;
    let mut running = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                shutdown_child(&mut child).await;
                return Ok(AttemptEnd::Cancelled);
            }
            next = timeout(stall, lines.next_line()) => match next {
                Ok(Ok(Some(line))) => {
                    if !running {
                        running = true;
                        state_tx.send_replace(SupervisorState::Running);
                    }
                    if handle_line(&line, config, db, mirror).await? {
                        persisted += 1;
                    } else {
                        rejected += 1;
                    }
                }
                Ok(Ok(None)) => {
                    warn!("acquisition process closed its output stream");
                    break;
                }
                Ok(Err(err)) => {
                    warn!("error reading acquisition output: {err}");
                    break;
                }
                Err(_) => {
                    warn!(
                        "no acquisition output for {}s, restarting",
                        config.supervisor.stall_timeout_secs
                    );
                    break;
                }
            }
        }
    }

    shutdown_child(&mut child).await;
    Ok(AttemptEnd::Exited { persisted, rejected })
}

/// Normalize and persist one line. `Ok(true)` when a valid sample went
/// through the write path, `Ok(false)` for counted rejections, `Err` only
/// for store failures.
async fn handle_line(
    line: &str,
    config: &AppConfig,
    db: &Database,
    mirror: &Mirror,
) -> Result<bool> {
    match parse_line(line) {
        Ok(raw) => {
            let timestamp_utc = Utc::now();
            let reading = Reading {
                timestamp_utc,
                sleep_date: sleep_date_for(timestamp_utc, config.timezone),
                spo2: raw.spo2,
                heart_rate: raw.heart_rate,
                perfusion_index: raw.perfusion_index,
                movement: raw.movement,
                battery: raw.battery,
            };

            let inserted = db
                .insert_reading(&reading)
                .await
                .context("failed to persist reading")?;
            if inserted {
                // The mirror is best-effort; the store already has the row.
                if let Err(err) = mirror.append(&reading) {
                    warn!("mirror append failed for {}: {err:?}", reading.sleep_date);
                }
                debug!(
                    "{} sleep_date={} spo2={:?} hr={:?}",
                    reading.timestamp_utc, reading.sleep_date, reading.spo2, reading.heart_rate
                );
            } else {
                debug!("duplicate reading at {} ignored", reading.timestamp_utc);
            }
            Ok(true)
        }
        Err(SampleError::Parse(_)) => {
            debug!("ignoring line: {}", line.trim());
            Ok(false)
        }
        Err(err) => {
            warn!("discarding invalid sample: {err}");
            Ok(false)
        }
    }
}

async fn shutdown_child(child: &mut Child) {
    if let Err(err) = child.kill().await {
        debug!("acquisition process already exited: {err}");
    }
    let _ = child.wait().await;
}

/// Exponential delay bounded by the configured maximum, plus up to 50%
/// uniform jitter.
fn backoff_delay(consecutive_failures: u32, config: &SupervisorConfig) -> Duration {
    let exponent = consecutive_failures.min(16);
    let base = config
        .initial_backoff_secs
        .saturating_mul(1u64 << exponent)
        .min(config.max_backoff_secs);
    let jitter_ceiling = base / 2;
    let jitter = if jitter_ceiling == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_ceiling)
    };
    Duration::from_secs(base + jitter)
}
