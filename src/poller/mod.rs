//! Poller - fixed-interval fetch driver
//!
//! ## Responsibilities
//!
//! - Periodic camera-list and motion-event fetches (default 60s)
//! - Feeding fetch results through the tree builder into the
//!   reconciliation queue, one batch per source per tick
//! - Token renewal on authorization failures, deferred to the next
//!   scheduled tick (no immediate retry)
//! - Stale motion-event channel cleanup
//! - Writable-setting push-back to the NVR

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{info, warn};

use crate::protect::{
    MotionEventRecord, ProtectClient, MOTION_LOOKAHEAD_SECS, MOTION_LOOKBACK_SECS,
};
use crate::reconciler::{PendingBatch, ReconcileReport, ReconciliationQueue, StateUpdate};
use crate::settings::SettingsStore;
use crate::tree::{normalize, TreeBuilder, TreeNode, TreeValue, WritablePaths};
use crate::value_store::{ObjectKind, ObjectMeta, ValueStore};
use crate::{Error, Result};

/// Handle to one spawned poll loop
struct Runner {
    handle: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

/// Fixed-interval driver mirroring the NVR into the value store
pub struct Poller {
    client: Arc<ProtectClient>,
    store: Arc<dyn ValueStore>,
    queue: Arc<ReconciliationQueue>,
    builder: TreeBuilder,
    writable: WritablePaths,
    settings: Arc<SettingsStore>,
    running: Arc<RwLock<bool>>,
    runner: Mutex<Option<Runner>>,
}

impl Poller {
    pub fn new(
        client: Arc<ProtectClient>,
        store: Arc<dyn ValueStore>,
        queue: Arc<ReconciliationQueue>,
        writable: WritablePaths,
        settings: Arc<SettingsStore>,
    ) -> Self {
        Self {
            client,
            store,
            queue,
            builder: TreeBuilder::new(writable.clone()),
            writable,
            settings,
            running: Arc::new(RwLock::new(false)),
            runner: Mutex::new(None),
        }
    }

    /// Start the poll loop
    ///
    /// Refused while a previous loop is still alive, so a stop/start
    /// pair can never leave two loops ticking against the store.
    pub async fn start(self: Arc<Self>) {
        let mut slot = self.runner.lock().await;
        if let Some(runner) = slot.as_ref() {
            if !runner.handle.is_finished() {
                warn!("Poller already running");
                return;
            }
        }

        let period = self.settings.get().await.poll_interval_secs.max(1);
        info!(period_secs = period, "Starting poller");
        *self.running.write().await = true;

        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();
        let poller = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(period));

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !*poller.running.read().await {
                            break;
                        }
                        poller.tick().await;
                    }
                    _ = signal.notified() => break,
                }
            }

            info!("Poller stopped");
        });

        *slot = Some(Runner { handle, shutdown });
    }

    /// Stop the poll loop and wait for it to exit
    ///
    /// A tick already in flight drains before the loop winds down.
    pub async fn stop(&self) {
        info!("Stopping poller");
        *self.running.write().await = false;

        let runner = self.runner.lock().await.take();
        if let Some(runner) = runner {
            runner.shutdown.notify_one();
            if runner.handle.await.is_err() {
                warn!("Poll loop terminated abnormally");
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// One poll cycle: cameras, then motion events
    ///
    /// An authorization failure renews the token and defers everything
    /// else to the next scheduled tick. Transport errors skip the cycle.
    pub async fn tick(&self) {
        match self.sync_cameras().await {
            Ok(report) => {
                tracing::debug!(
                    written = report.written,
                    unchanged = report.unchanged,
                    "Camera sync done"
                );
            }
            Err(Error::Auth(msg)) => {
                warn!(error = %msg, "Authorization failure, renewing token");
                if let Err(e) = self.client.renew().await {
                    warn!(error = %e, "Token renewal failed, retrying next tick");
                }
                return;
            }
            Err(e) => {
                warn!(error = %e, "Camera sync failed, skipping cycle");
                return;
            }
        }

        match self.sync_motions().await {
            Ok(report) => {
                tracing::debug!(
                    written = report.written,
                    unchanged = report.unchanged,
                    "Motion sync done"
                );
            }
            Err(Error::Auth(msg)) => {
                warn!(error = %msg, "Authorization failure, renewing token");
                if let Err(e) = self.client.renew().await {
                    warn!(error = %e, "Token renewal failed, retrying next tick");
                }
            }
            Err(e) => {
                warn!(error = %e, "Motion sync failed, skipping cycle");
            }
        }
    }

    /// Mirror the camera inventory under `cameras.*`
    pub async fn sync_cameras(&self) -> Result<ReconcileReport> {
        let cameras = self.client.bootstrap().await?;
        let filter = self.settings.get().await.filter_for("cameras");

        let mut nodes = vec![TreeNode::Channel {
            path: "cameras".to_string(),
            name: "Cameras".to_string(),
        }];

        for camera in &cameras {
            let id = match camera.id() {
                Ok(id) => id,
                Err(e) => {
                    warn!(error = %e, "Skipping camera record");
                    continue;
                }
            };
            nodes.extend(self.builder.record_nodes(
                &format!("cameras.{}", id),
                &camera.display_name(),
                &camera.fields,
                filter.as_ref(),
            ));
        }

        Ok(self.apply_nodes(nodes).await)
    }

    /// Mirror recent motion events under `motions.*`
    ///
    /// Emits one channel per event plus a `lastMotion` mirror of the
    /// newest event, and deletes channels for events that fell out of
    /// the query window.
    pub async fn sync_motions(&self) -> Result<ReconcileReport> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let start_ms = now_ms - MOTION_LOOKBACK_SECS * 1000;
        let end_ms = now_ms + MOTION_LOOKAHEAD_SECS * 1000;

        let events = self.client.motion_events(start_ms, end_ms).await?;
        let filter = self.settings.get().await.filter_for("motions");

        let mut nodes = vec![TreeNode::Channel {
            path: "motions".to_string(),
            name: "Motion Events".to_string(),
        }];

        self.delete_stale_motions(&events).await;

        let mut last: Option<&MotionEventRecord> = None;
        for event in &events {
            let (camera, id) = match (event.camera(), event.id()) {
                (Ok(camera), Ok(id)) => (camera, id),
                _ => {
                    warn!("Skipping malformed motion event");
                    continue;
                }
            };
            nodes.extend(self.builder.record_nodes(
                &format!("motions.{}.{}", camera, id),
                id,
                &event.fields,
                filter.as_ref(),
            ));
            last = Some(event);
        }

        if let Some(event) = last {
            if let Ok(camera) = event.camera() {
                nodes.extend(self.builder.record_nodes(
                    &format!("motions.{}.lastMotion", camera),
                    "lastMotion",
                    &event.fields,
                    filter.as_ref(),
                ));
            }
        }

        Ok(self.apply_nodes(nodes).await)
    }

    /// Remove motion channels no longer present in the current fetch
    async fn delete_stale_motions(&self, events: &[MotionEventRecord]) {
        let channels = match self.store.list_channels("motions").await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(error = %e, "Motion channel listing failed, skipping cleanup");
                return;
            }
        };

        for channel in channels {
            let segments: Vec<&str> = channel.split('.').collect();
            // Only motions.<camera>.<event> channels; lastMotion survives
            let (camera, event_id) = match segments.as_slice() {
                ["motions", camera, event_id] if *event_id != "lastMotion" => (*camera, *event_id),
                _ => continue,
            };

            let still_current = events.iter().any(|e| {
                e.camera().map(|c| c == camera).unwrap_or(false)
                    && e.id().map(|i| i == event_id).unwrap_or(false)
            });

            if !still_current {
                if let Err(e) = self.store.delete_object(&channel).await {
                    warn!(channel = %channel, error = %e, "Stale motion cleanup failed");
                }
            }
        }
    }

    /// Ensure objects exist, then reconcile the collected batch
    async fn apply_nodes(&self, nodes: Vec<TreeNode>) -> ReconcileReport {
        let mut batch = PendingBatch::new();

        for node in nodes {
            match node {
                TreeNode::Channel { path, name } => {
                    if let Err(e) = self
                        .store
                        .create_object(&path, ObjectKind::Channel, ObjectMeta::channel(name))
                        .await
                    {
                        warn!(path = %path, error = %e, "Channel creation failed");
                    }
                }
                TreeNode::State { path, meta, value } => {
                    if let Err(e) = self
                        .store
                        .create_object(&path, ObjectKind::State, meta)
                        .await
                    {
                        warn!(path = %path, error = %e, "State object creation failed");
                    }
                    batch.push(StateUpdate { name: path, value });
                }
            }
        }

        self.queue.reconcile(batch).await
    }

    /// Push a user write on a writable path back to the NVR
    ///
    /// Accepts `cameras.<id>.<setting>` and
    /// `cameras.<id>.<parent>.<setting>` paths; anything else is
    /// rejected. On success the echoed value is reconciled so the
    /// mirror reflects the change before the next poll.
    pub async fn apply_setting(&self, path: &str, value: Value) -> Result<()> {
        if !self.writable.matches(path) {
            return Err(Error::Forbidden(format!("{} is not writable", path)));
        }

        let scalar = match normalize(&value) {
            TreeValue::Scalar(scalar) => scalar,
            TreeValue::Container(_) => {
                return Err(Error::Malformed("Setting value must be a scalar".to_string()))
            }
        };

        let segments: Vec<&str> = path.split('.').collect();
        let (camera_id, body) = match segments.as_slice() {
            ["cameras", camera_id, setting] => {
                (*camera_id, serde_json::json!({ (*setting): value }))
            }
            ["cameras", camera_id, parent, setting] => (
                *camera_id,
                serde_json::json!({ (*parent): { (*setting): value } }),
            ),
            _ => {
                return Err(Error::Malformed(format!(
                    "{} is not a camera setting path",
                    path
                )))
            }
        };

        self.client.patch_camera(camera_id, body).await?;
        info!(path = %path, "Camera setting pushed");

        self.queue
            .reconcile(vec![StateUpdate {
                name: path.to_string(),
                value: scalar,
            }])
            .await;

        Ok(())
    }
}
