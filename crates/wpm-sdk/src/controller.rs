//! Mission lifecycle controller.
//!
//! Drives a [`LifecycleMachine`] from vehicle events. Each mission attempt
//! registers one listener per event topic and spawns an event pump that
//! feeds those events into the machine; the directives the machine returns
//! are executed against the [`MissionOperator`] while the controller lock is
//! held, so an abort can never interleave with an upload decision.
//!
//! When a camera is attached, the attempt also listens for new media files
//! and reports each one as a notice.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use uuid::Uuid;
use wpm_core::{
    validate_mission, ActionUploadProgress, Directive, EventTopic, ExecutionStatus,
    LifecycleMachine, LifecycleState, Mission, MissionError, MissionOutcome, Result, UploadStage,
    VehicleEvent,
};

use crate::vehicle::{
    Camera, MediaFile, MediaSubscription, MissionOperator, Subscription, SubscriptionId,
};

const NOTICE_CAPACITY: usize = 256;

/// Something the caller may want to know about the current attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleNotice {
    pub attempt_id: String,
    pub at: DateTime<Utc>,
    pub kind: NoticeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NoticeKind {
    StateChanged {
        from: LifecycleState,
        to: LifecycleState,
    },
    ActionUpload(ActionUploadProgress),
    Progress {
        target_waypoint: usize,
        reached: bool,
    },
    MediaFile(MediaFile),
    Error(MissionError),
    Finished(MissionOutcome),
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LifecycleSnapshot {
    pub attempt_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub state: LifecycleState,
    pub status: ExecutionStatus,
    /// Media files reported by the camera during this attempt
    pub media_files: usize,
}

/// Exclusive right to start the next attempt. Released on drop.
#[derive(Debug)]
pub struct AttemptReservation {
    flag: Arc<AtomicBool>,
}

impl Drop for AttemptReservation {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Listeners registered for one attempt.
#[derive(Debug, Default)]
struct SubscriptionSet {
    ids: Vec<SubscriptionId>,
    media: Option<SubscriptionId>,
}

impl SubscriptionSet {
    /// Unregister every listener. Returns how many were removed; later calls
    /// return 0.
    fn release(&mut self, operator: &dyn MissionOperator, camera: Option<&dyn Camera>) -> usize {
        let vehicle = self
            .ids
            .drain(..)
            .filter(|id| operator.unsubscribe(*id))
            .count();
        let media = match (self.media.take(), camera) {
            (Some(id), Some(camera)) => usize::from(camera.unsubscribe_media(id)),
            _ => 0,
        };
        vehicle + media
    }

    fn len(&self) -> usize {
        self.ids.len() + usize::from(self.media.is_some())
    }
}

/// Receivers for the four vehicle topics and the optional media stream of
/// one attempt.
struct AttemptStreams {
    mission_state: mpsc::UnboundedReceiver<VehicleEvent>,
    action_upload: mpsc::UnboundedReceiver<VehicleEvent>,
    execution: mpsc::UnboundedReceiver<VehicleEvent>,
    finished: mpsc::UnboundedReceiver<VehicleEvent>,
    media: Option<mpsc::UnboundedReceiver<MediaFile>>,
}

enum PumpItem {
    Vehicle(VehicleEvent),
    Media(MediaFile),
}

struct Attempt {
    id: String,
    started_at: DateTime<Utc>,
    mission: Arc<Mission>,
    machine: LifecycleMachine,
    subscriptions: SubscriptionSet,
    pump_shutdown: Option<oneshot::Sender<()>>,
    media_files: usize,
}

impl Attempt {
    fn stop_pump(&mut self) {
        if let Some(tx) = self.pump_shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[derive(Default)]
struct Inner {
    attempt: Option<Attempt>,
}

/// Event-driven mission lifecycle controller. Cheap to clone.
#[derive(Clone)]
pub struct LifecycleController {
    operator: Arc<dyn MissionOperator>,
    camera: Option<Arc<dyn Camera>>,
    inner: Arc<Mutex<Inner>>,
    reserved: Arc<AtomicBool>,
    notices: broadcast::Sender<LifecycleNotice>,
    snapshot: Arc<watch::Sender<LifecycleSnapshot>>,
}

impl LifecycleController {
    pub fn new(operator: Arc<dyn MissionOperator>) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let (snapshot, _) = watch::channel(LifecycleSnapshot::default());
        Self {
            operator,
            camera: None,
            inner: Arc::new(Mutex::new(Inner::default())),
            reserved: Arc::new(AtomicBool::new(false)),
            notices,
            snapshot: Arc::new(snapshot),
        }
    }

    /// Report media files from this camera for every attempt.
    pub fn with_camera(mut self, camera: Arc<dyn Camera>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<LifecycleNotice> {
        self.notices.subscribe()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<LifecycleSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Wait until the current attempt finishes or is aborted.
    ///
    /// Returns immediately when there is no active attempt (nothing loaded
    /// yet, or the last load failed).
    pub async fn wait_until_terminal(&self) -> LifecycleSnapshot {
        let mut rx = self.watch_snapshot();
        // The sender lives as long as `self`, so this only fails if it is dropped.
        let snapshot = match rx.wait_for(|s| !s.state.is_active()).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        };
        snapshot
    }

    /// Claim the next attempt. Fails with `Busy` while an attempt is active
    /// or another caller holds a reservation.
    pub fn reserve(&self) -> Result<AttemptReservation> {
        if self.snapshot().state.is_active() {
            return Err(MissionError::Busy);
        }
        self.reserved
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| MissionError::Busy)?;
        Ok(AttemptReservation {
            flag: self.reserved.clone(),
        })
    }

    /// Load a mission and start the upload sequence. Returns the attempt id.
    pub async fn load(&self, mission: Mission) -> Result<String> {
        let reservation = self.reserve()?;
        self.load_reserved(mission, reservation).await
    }

    /// Load a mission under a reservation taken earlier with
    /// [`LifecycleController::reserve`].
    ///
    /// Uploads begin once the vehicle reports it is ready; the operator's
    /// current state is sampled right after loading so an already-ready
    /// vehicle does not wait for a transition that will never come.
    pub async fn load_reserved(
        &self,
        mission: Mission,
        _reservation: AttemptReservation,
    ) -> Result<String> {
        validate_mission(&mission, None)?;

        let mut inner = self.inner.lock().await;
        if let Some(attempt) = &inner.attempt {
            if attempt.machine.state().is_active() {
                return Err(MissionError::Busy);
            }
        }

        let attempt_id = Uuid::new_v4().to_string();
        let (subscriptions, streams) = self.subscribe_all();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(run_event_pump(
            self.clone(),
            attempt_id.clone(),
            streams,
            shutdown_rx,
        ));

        let mission = Arc::new(mission);
        let attempt = inner.attempt.insert(Attempt {
            id: attempt_id.clone(),
            started_at: Utc::now(),
            mission: mission.clone(),
            machine: LifecycleMachine::new(),
            subscriptions,
            pump_shutdown: Some(shutdown_tx),
            media_files: 0,
        });

        tracing::info!(
            attempt_id = %attempt_id,
            mission_id = mission.mission_id,
            waypoints = mission.waypoint_count(),
            actions = mission.action_count(),
            "Loading mission"
        );

        if let Err(e) = self.operator.load_mission(&mission).await {
            tracing::error!(attempt_id = %attempt_id, error = %e, "Mission load failed");
            let removed = attempt
                .subscriptions
                .release(self.operator.as_ref(), self.camera.as_deref());
            attempt.stop_pump();
            tracing::debug!(attempt_id = %attempt_id, removed, "Released listeners after failed load");
            let err = MissionError::Upload {
                stage: UploadStage::Load,
                reason: e.to_string(),
            };
            self.notify(&attempt_id, NoticeKind::Error(err.clone()));
            inner.attempt = None;
            self.publish(&inner);
            return Err(err);
        }

        attempt.machine.on_loaded()?;
        self.notify(
            &attempt_id,
            NoticeKind::StateChanged {
                from: LifecycleState::Idle,
                to: LifecycleState::Loaded,
            },
        );

        let observed = VehicleEvent::MissionState {
            previous: None,
            current: self.operator.current_state(),
        };
        self.apply_event(attempt, &observed).await;
        self.publish(&inner);

        Ok(attempt_id)
    }

    /// Start executing a fully uploaded mission.
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let attempt = inner.attempt.as_mut().ok_or(MissionError::InvalidState {
            state: LifecycleState::Idle,
            operation: "start",
        })?;
        attempt.machine.check_start()?;

        tracing::info!(attempt_id = %attempt.id, "Starting mission");
        if let Err(e) = self.operator.start_mission().await {
            tracing::error!(attempt_id = %attempt.id, error = %e, "Mission start failed");
            let err = MissionError::Vehicle {
                operation: "start mission",
                reason: e.to_string(),
            };
            self.notify(&attempt.id, NoticeKind::Error(err.clone()));
            return Err(err);
        }

        let before = attempt.machine.state();
        attempt.machine.on_started();
        self.notify_transition(attempt, before);
        self.publish(&inner);
        Ok(())
    }

    /// Stop the mission and release every listener of the attempt.
    ///
    /// Listeners are released even when the stop command fails; the stop
    /// error is still returned.
    pub async fn abort(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let attempt = inner.attempt.as_mut().ok_or(MissionError::InvalidState {
            state: LifecycleState::Idle,
            operation: "abort",
        })?;

        let before = attempt.machine.state();
        let directives = attempt.machine.abort()?;
        tracing::warn!(attempt_id = %attempt.id, from = %before, "Aborting mission");

        let stop_result = self.operator.stop_mission().await;
        self.execute(attempt, directives).await;
        self.notify_transition(attempt, before);
        self.notify(&attempt.id, NoticeKind::Finished(MissionOutcome::Aborted));
        self.publish(&inner);

        stop_result.map_err(|e| {
            tracing::error!(error = %e, "Stop command failed during abort");
            MissionError::Vehicle {
                operation: "stop mission",
                reason: e.to_string(),
            }
        })
    }

    /// Retry the upload stage that last failed, then re-sample the vehicle.
    pub async fn retry_upload(&self) -> Result<UploadStage> {
        let mut inner = self.inner.lock().await;
        let attempt = inner.attempt.as_mut().ok_or(MissionError::InvalidState {
            state: LifecycleState::Idle,
            operation: "retry upload",
        })?;

        let before = attempt.machine.state();
        let stage = attempt.machine.retry_upload()?;
        tracing::info!(attempt_id = %attempt.id, stage = %stage, "Retrying upload");
        self.notify_transition(attempt, before);

        let mission_state = VehicleEvent::MissionState {
            previous: None,
            current: self.operator.current_state(),
        };
        let action_state = VehicleEvent::ActionUpload {
            previous: None,
            current: self.operator.current_action_state(),
            progress: None,
        };
        self.apply_event(attempt, &mission_state).await;
        self.apply_event(attempt, &action_state).await;
        self.publish(&inner);
        Ok(stage)
    }

    /// Number of listeners the current attempt still holds.
    pub async fn active_subscriptions(&self) -> usize {
        let inner = self.inner.lock().await;
        inner
            .attempt
            .as_ref()
            .map(|a| a.subscriptions.len())
            .unwrap_or(0)
    }

    async fn handle_event(&self, attempt_id: &str, event: VehicleEvent) {
        let mut inner = self.inner.lock().await;
        let Some(attempt) = inner.attempt.as_mut().filter(|a| a.id == attempt_id) else {
            tracing::debug!(attempt_id, ?event, "Dropping event for stale attempt");
            return;
        };
        self.apply_event(attempt, &event).await;
        self.publish(&inner);
    }

    async fn handle_media(&self, attempt_id: &str, file: MediaFile) {
        let mut inner = self.inner.lock().await;
        let Some(attempt) = inner.attempt.as_mut().filter(|a| a.id == attempt_id) else {
            return;
        };
        attempt.media_files += 1;
        tracing::info!(
            attempt_id,
            file = %file.file_name,
            waypoint = ?file.waypoint,
            "New media file"
        );
        self.notify(attempt_id, NoticeKind::MediaFile(file));
        self.publish(&inner);
    }

    async fn apply_event(&self, attempt: &mut Attempt, event: &VehicleEvent) {
        let before = attempt.machine.state();
        let directives = attempt.machine.on_event(event);

        match event {
            VehicleEvent::ActionUpload {
                progress: Some(progress),
                ..
            } => self.notify(&attempt.id, NoticeKind::ActionUpload(*progress)),
            VehicleEvent::Execution { progress, .. } if attempt.machine.state() == LifecycleState::Executing => {
                tracing::debug!(
                    attempt_id = %attempt.id,
                    waypoint = progress.target_waypoint_index,
                    reached = progress.is_waypoint_reached,
                    "Execution progress"
                );
                self.notify(
                    &attempt.id,
                    NoticeKind::Progress {
                        target_waypoint: progress.target_waypoint_index,
                        reached: progress.is_waypoint_reached,
                    },
                );
            }
            _ => {}
        }

        self.notify_transition(attempt, before);
        self.execute(attempt, directives).await;

        if before != LifecycleState::Finished && attempt.machine.state() == LifecycleState::Finished {
            if let Some(outcome) = attempt.machine.status().outcome.clone() {
                tracing::info!(attempt_id = %attempt.id, ?outcome, "Mission finished");
                self.notify(&attempt.id, NoticeKind::Finished(outcome));
            }
        }
    }

    /// Execute directives, including any produced by failed uploads.
    async fn execute(&self, attempt: &mut Attempt, directives: Vec<Directive>) {
        let mut queue: std::collections::VecDeque<Directive> = directives.into();

        while let Some(directive) = queue.pop_front() {
            match directive {
                Directive::UploadMission => {
                    tracing::info!(attempt_id = %attempt.id, "Uploading mission");
                    if let Err(e) = self.operator.upload_mission().await {
                        queue.extend(attempt.machine.on_upload_failed(UploadStage::Mission, e.to_string()));
                    }
                }
                Directive::UploadActions => {
                    tracing::info!(
                        attempt_id = %attempt.id,
                        count = attempt.mission.actions.len(),
                        "Uploading actions"
                    );
                    if let Err(e) = self.operator.upload_actions(&attempt.mission.actions).await {
                        queue.extend(attempt.machine.on_upload_failed(UploadStage::Actions, e.to_string()));
                    }
                }
                Directive::ReleaseSubscriptions => {
                    let removed = attempt
                        .subscriptions
                        .release(self.operator.as_ref(), self.camera.as_deref());
                    attempt.stop_pump();
                    tracing::debug!(attempt_id = %attempt.id, removed, "Released mission listeners");
                }
                Directive::Report(err) => {
                    tracing::warn!(attempt_id = %attempt.id, error = %err, "Mission error");
                    self.notify(&attempt.id, NoticeKind::Error(err));
                }
            }
        }
    }

    fn subscribe_all(&self) -> (SubscriptionSet, AttemptStreams) {
        let mut set = SubscriptionSet::default();
        let mut take = |topic: EventTopic| {
            let Subscription { id, events, .. } = self.operator.subscribe(topic);
            set.ids.push(id);
            events
        };
        let mission_state = take(EventTopic::MissionState);
        let action_upload = take(EventTopic::ActionUpload);
        let execution = take(EventTopic::Execution);
        let finished = take(EventTopic::Finished);

        let media = self.camera.as_ref().map(|camera| {
            let MediaSubscription { id, files } = camera.subscribe_media();
            set.media = Some(id);
            files
        });

        let streams = AttemptStreams {
            mission_state,
            action_upload,
            execution,
            finished,
            media,
        };
        (set, streams)
    }

    fn notify_transition(&self, attempt: &Attempt, before: LifecycleState) {
        let after = attempt.machine.state();
        if before != after {
            tracing::info!(attempt_id = %attempt.id, from = %before, to = %after, "Mission state changed");
            self.notify(
                &attempt.id,
                NoticeKind::StateChanged {
                    from: before,
                    to: after,
                },
            );
        }
    }

    fn notify(&self, attempt_id: &str, kind: NoticeKind) {
        // No receivers is fine.
        let _ = self.notices.send(LifecycleNotice {
            attempt_id: attempt_id.to_string(),
            at: Utc::now(),
            kind,
        });
    }

    fn publish(&self, inner: &Inner) {
        let snapshot = match &inner.attempt {
            Some(attempt) => LifecycleSnapshot {
                attempt_id: Some(attempt.id.clone()),
                started_at: Some(attempt.started_at),
                state: attempt.machine.state(),
                status: attempt.machine.status().clone(),
                media_files: attempt.media_files,
            },
            None => LifecycleSnapshot::default(),
        };
        self.snapshot.send_replace(snapshot);
    }
}

/// Forward events of one attempt into the controller until its listeners are
/// released.
async fn run_event_pump(
    controller: LifecycleController,
    attempt_id: String,
    mut streams: AttemptStreams,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            Some(event) = streams.mission_state.recv() => PumpItem::Vehicle(event),
            Some(event) = streams.action_upload.recv() => PumpItem::Vehicle(event),
            Some(event) = streams.execution.recv() => PumpItem::Vehicle(event),
            Some(file) = next_media(&mut streams.media) => PumpItem::Media(file),
            Some(event) = streams.finished.recv() => PumpItem::Vehicle(event),
            else => break,
        };
        match item {
            PumpItem::Vehicle(event) => controller.handle_event(&attempt_id, event).await,
            PumpItem::Media(file) => controller.handle_media(&attempt_id, file).await,
        }
    }
    tracing::debug!(attempt_id = %attempt_id, "Event pump stopped");
}

async fn next_media(files: &mut Option<mpsc::UnboundedReceiver<MediaFile>>) -> Option<MediaFile> {
    match files {
        Some(files) => files.recv().await,
        None => std::future::pending().await,
    }
}
