//! SSE flag configuration streamer.
//!
//! Mirrors `FlagConfigStreamer`/`EventSource`/`FlagConfigStreamApi` in
//! `original_source/.../flag/flag_config_api.py`: a single long-lived SSE
//! connection, heartbeat-driven keep-alive watchdog, and a proactive
//! max-connection-duration recycle, generalized from that class's
//! thread + `threading.Event` coordination to `tokio::select!` over a
//! `reqwest_eventsource::EventSource` stream.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use rand::Rng;
use reqwest_eventsource::{Event as SseEvent, EventSource};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::cohort::{CohortLoader, CohortStorage};
use crate::model::Flag;
use crate::{Error, Result};

use super::api::FlagConfigApi;
use super::reconcile::reconcile;
use super::storage::FlagConfigStorage;
use super::updater::{ErrorCallback, FlagConfigUpdater};

/// The keep-alive heartbeat the control plane sends between real
/// updates: a single space as the event data.
const HEARTBEAT_DATA: &str = " ";
const MAX_JITTER_MILLIS: u64 = 5_000;

enum ConnectionOutcome {
    /// The max-duration timer elapsed; recycle and keep going.
    Recycle,
    /// The connection failed (transport error or keep-alive expiry).
    Failed(Error),
}

/// The pieces a running connection needs, shared behind an `Arc` so the
/// background task can outlive the `start` call that spawned it.
struct Shared {
    api: Arc<FlagConfigApi>,
    storage: Arc<FlagConfigStorage>,
    cohorts: Option<(Arc<CohortLoader>, Arc<CohortStorage>)>,
    conn_timeout: Duration,
    max_conn_duration: Duration,
    keep_alive_timeout: Duration,
}

impl Shared {
    fn jittered_max_duration(&self) -> Duration {
        let jitter = rand::thread_rng().gen_range(0..=MAX_JITTER_MILLIS);
        self.max_conn_duration + Duration::from_millis(jitter)
    }

    /// Drive a single SSE connection until it should be recycled or has
    /// failed. `on_first_batch` fires (at most once) after the first
    /// batch of flags has been reconciled into storage.
    async fn run_connection(
        &self,
        on_first_batch: &mut Option<oneshot::Sender<Result<()>>>,
    ) -> ConnectionOutcome {
        let mut source = EventSource::new(self.api.stream_request())
            .expect("stream request body is not a stream, so EventSource::new cannot fail here");

        let deadline = tokio::time::sleep(self.jittered_max_duration());
        tokio::pin!(deadline);
        let keep_alive = tokio::time::sleep(self.keep_alive_timeout);
        tokio::pin!(keep_alive);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    return ConnectionOutcome::Recycle;
                }
                _ = &mut keep_alive => {
                    return ConnectionOutcome::Failed(Error::Timeout);
                }
                event = source.next() => {
                    match event {
                        None => return ConnectionOutcome::Failed(Error::Timeout),
                        Some(Err(reqwest_eventsource::Error::Transport(err))) => {
                            return ConnectionOutcome::Failed(Error::Network(Arc::new(err)));
                        }
                        Some(Err(other)) => {
                            log::warn!(target: "flagcore"; "stream error: {other}");
                            return ConnectionOutcome::Failed(Error::Timeout);
                        }
                        Some(Ok(SseEvent::Open)) => {
                            keep_alive.as_mut().reset(tokio::time::Instant::now() + self.keep_alive_timeout);
                        }
                        Some(Ok(SseEvent::Message(message))) => {
                            keep_alive.as_mut().reset(tokio::time::Instant::now() + self.keep_alive_timeout);
                            if message.data == HEARTBEAT_DATA {
                                continue;
                            }
                            match serde_json::from_str::<Vec<Flag>>(&message.data) {
                                Ok(flags) => {
                                    let cohorts = self.cohorts.as_ref().map(|(l, s)| (l.as_ref(), s.as_ref()));
                                    reconcile(&self.storage, cohorts, flags).await;
                                    if let Some(tx) = on_first_batch.take() {
                                        let _ = tx.send(Ok(()));
                                    }
                                }
                                Err(err) => {
                                    log::warn!(target: "flagcore"; "failed to parse stream event: {err}");
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Keeps [`FlagConfigStorage`] fresh over a single persistent SSE
/// connection.
pub struct FlagConfigStreamer {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FlagConfigStreamer {
    pub fn new(
        api: Arc<FlagConfigApi>,
        storage: Arc<FlagConfigStorage>,
        cohorts: Option<(Arc<CohortLoader>, Arc<CohortStorage>)>,
        conn_timeout: Duration,
        max_conn_duration: Duration,
        keep_alive_timeout: Duration,
    ) -> Self {
        FlagConfigStreamer {
            shared: Arc::new(Shared {
                api,
                storage,
                cohorts,
                conn_timeout,
                max_conn_duration,
                keep_alive_timeout,
            }),
            task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl FlagConfigUpdater for FlagConfigStreamer {
    async fn start(&self, on_error: Option<ErrorCallback>) -> Result<()> {
        let (init_tx, init_rx) = oneshot::channel();
        let shared = self.shared.clone();
        let conn_timeout = shared.conn_timeout;

        let handle = tokio::spawn(async move {
            let mut on_first_batch = Some(init_tx);
            loop {
                match shared.run_connection(&mut on_first_batch).await {
                    ConnectionOutcome::Recycle => continue,
                    ConnectionOutcome::Failed(err) => {
                        if let Some(tx) = on_first_batch.take() {
                            let _ = tx.send(Err(err));
                            return;
                        }
                        log::warn!(target: "flagcore"; "flag stream failed: {err}");
                        if let Some(on_error) = on_error {
                            on_error(err);
                        }
                        return;
                    }
                }
            }
        });

        *self.task.lock().unwrap() = Some(handle);

        match tokio::time::timeout(conn_timeout, init_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(_)) => Err(Error::Timeout),
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn stop(&self) {
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
        }
    }
}
