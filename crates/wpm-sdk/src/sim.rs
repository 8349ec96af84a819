//! Simulated vehicle.
//!
//! Implements every vehicle trait in memory with the same state transitions
//! a real aircraft reports. Commands are recorded so tests can assert on
//! exactly what was sent, and any command can be scripted to fail. During a
//! flight, every photo action produces a media file once its waypoint is
//! reached.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use wpm_core::{
    Action, ActionActuator, ActionTrigger, ActionUploadProgress, ActionUploadState,
    CameraOperation, EventTopic, ExecutionProgress, GeoPoint, Mission, OperatorState,
    VehicleEvent,
};

use crate::vehicle::{
    Camera, CameraMode, FlightController, FocusMode, LensId, MediaFile, MediaSubscription,
    MissionOperator, PhotoFileFormat, Subscription, SubscriptionId, VehicleError, VehicleResult,
};

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Delay between simulated steps; zero only yields to the scheduler
    pub step_delay: Duration,
    /// Current photo format of each camera lens
    pub lens_formats: Vec<PhotoFileFormat>,
    pub aircraft_location: Option<GeoPoint>,
    pub camera_name: String,
    /// Report ReadyToUpload as soon as a mission is loaded
    pub ready_after_load: bool,
    /// Report an execution error on arrival at this waypoint (first pass only)
    pub execution_error_at: Option<usize>,
    pub finish_error: Option<String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            step_delay: Duration::ZERO,
            lens_formats: vec![PhotoFileFormat::Jpeg],
            aircraft_location: Some(GeoPoint::new(33.6209929, 130.6265251)),
            camera_name: "Simulated Camera".to_string(),
            ready_after_load: true,
            execution_error_at: None,
            finish_error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    LoadMission,
    UploadMission,
    UploadActions,
    StartMission,
    StopMission,
    SetHomeLocation,
    SetGoHomeHeight,
    SetMaxRadiusEnabled,
    SetMaxRadius,
    SetMaxHeight,
    StartLanding,
    SetFocusMode,
    SetCameraMode,
    GetPhotoFormat,
    SetPhotoFormat,
}

/// A command received by the simulator.
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleCommand {
    LoadMission {
        mission_id: u32,
        waypoints: usize,
        actions: usize,
    },
    UploadMission,
    UploadActions {
        count: usize,
    },
    StartMission,
    StopMission,
    SetHomeLocation(GeoPoint),
    SetGoHomeHeight(u32),
    SetMaxRadiusEnabled(bool),
    SetMaxRadius(u32),
    SetMaxHeight(u32),
    StartLanding,
    SetFocusMode(FocusMode),
    SetCameraMode(CameraMode),
    GetPhotoFormat(LensId),
    SetPhotoFormat(LensId, PhotoFileFormat),
}

impl VehicleCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            VehicleCommand::LoadMission { .. } => CommandKind::LoadMission,
            VehicleCommand::UploadMission => CommandKind::UploadMission,
            VehicleCommand::UploadActions { .. } => CommandKind::UploadActions,
            VehicleCommand::StartMission => CommandKind::StartMission,
            VehicleCommand::StopMission => CommandKind::StopMission,
            VehicleCommand::SetHomeLocation(_) => CommandKind::SetHomeLocation,
            VehicleCommand::SetGoHomeHeight(_) => CommandKind::SetGoHomeHeight,
            VehicleCommand::SetMaxRadiusEnabled(_) => CommandKind::SetMaxRadiusEnabled,
            VehicleCommand::SetMaxRadius(_) => CommandKind::SetMaxRadius,
            VehicleCommand::SetMaxHeight(_) => CommandKind::SetMaxHeight,
            VehicleCommand::StartLanding => CommandKind::StartLanding,
            VehicleCommand::SetFocusMode(_) => CommandKind::SetFocusMode,
            VehicleCommand::SetCameraMode(_) => CommandKind::SetCameraMode,
            VehicleCommand::GetPhotoFormat(_) => CommandKind::GetPhotoFormat,
            VehicleCommand::SetPhotoFormat(..) => CommandKind::SetPhotoFormat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Once,
    Always,
}

struct SimState {
    operator: OperatorState,
    action_state: ActionUploadState,
    mission: Option<Arc<Mission>>,
    lens_formats: Vec<PhotoFileFormat>,
    flight: Option<JoinHandle<()>>,
}

struct SimInner {
    config: SimConfig,
    listeners: DashMap<SubscriptionId, (EventTopic, mpsc::UnboundedSender<VehicleEvent>)>,
    media_listeners: DashMap<SubscriptionId, mpsc::UnboundedSender<MediaFile>>,
    next_subscription: AtomicU64,
    next_photo: AtomicU32,
    failures: DashMap<CommandKind, Failure>,
    commands: Mutex<Vec<VehicleCommand>>,
    state: Mutex<SimState>,
}

impl SimInner {
    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a command and apply any scripted failure for it.
    fn command(&self, command: VehicleCommand) -> VehicleResult<()> {
        let kind = command.kind();
        tracing::trace!(?command, "Simulator command");
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command);

        let failure = self.failures.get(&kind).map(|f| *f);
        match failure {
            Some(Failure::Once) => {
                self.failures.remove(&kind);
                Err(VehicleError::Rejected(format!("scripted failure for {:?}", kind)))
            }
            Some(Failure::Always) => {
                Err(VehicleError::Rejected(format!("scripted failure for {:?}", kind)))
            }
            None => Ok(()),
        }
    }

    fn emit(&self, event: VehicleEvent) {
        let topic = event.topic();
        for entry in self.listeners.iter() {
            let (listener_topic, tx) = entry.value();
            if *listener_topic == topic {
                // A closed receiver is removed on unsubscribe.
                let _ = tx.send(event.clone());
            }
        }
    }

    fn next_subscription_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst))
    }

    /// Write `count` photos for a reached waypoint and announce each one.
    fn shoot(&self, waypoint: usize, count: usize) {
        let lens = LensId(0);
        let format = self
            .state()
            .lens_formats
            .first()
            .copied()
            .unwrap_or_default();
        let extension = match format {
            PhotoFileFormat::Raw => "DNG",
            PhotoFileFormat::Jpeg | PhotoFileFormat::RawAndJpeg => "JPG",
        };
        for _ in 0..count {
            let number = self.next_photo.fetch_add(1, Ordering::SeqCst);
            let file = MediaFile {
                file_name: format!("IMG_{:04}.{}", number, extension),
                lens,
                format,
                waypoint: Some(waypoint),
            };
            tracing::trace!(file = %file.file_name, waypoint, "Simulated photo");
            for entry in self.media_listeners.iter() {
                let _ = entry.value().send(file.clone());
            }
        }
    }

    fn set_operator_state(&self, current: OperatorState) {
        let previous = {
            let mut state = self.state();
            std::mem::replace(&mut state.operator, current)
        };
        self.emit(VehicleEvent::MissionState {
            previous: Some(previous),
            current,
        });
    }

    fn set_action_state(&self, current: ActionUploadState, progress: Option<ActionUploadProgress>) {
        let previous = {
            let mut state = self.state();
            std::mem::replace(&mut state.action_state, current)
        };
        self.emit(VehicleEvent::ActionUpload {
            previous: Some(previous),
            current,
            progress,
        });
    }

    async fn step(&self) {
        if self.config.step_delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.config.step_delay).await;
        }
    }

    async fn fly(self: Arc<Self>, mission: Arc<Mission>) {
        let rounds = mission.parameters.repeat_times.max(1);
        let photos = photos_per_waypoint(&mission);
        for round in 0..rounds {
            for index in 0..mission.waypoint_count() {
                self.emit(execution(index, false, None));
                self.step().await;

                let error = (round == 0 && self.config.execution_error_at == Some(index))
                    .then(|| format!("payload fault at waypoint {}", index));
                self.emit(execution(index, true, error));
                self.shoot(index, photos.get(index).copied().unwrap_or(0));
                self.step().await;
            }
        }

        tracing::debug!(mission_id = mission.mission_id, rounds, "Simulated flight complete");
        {
            let mut state = self.state();
            state.operator = OperatorState::ReadyToUpload;
            state.action_state = ActionUploadState::ReadyToUpload;
            state.flight = None;
        }
        self.emit(VehicleEvent::Finished {
            error: self.config.finish_error.clone(),
        });
    }
}

/// Photos taken at each waypoint. Actions chained to a previous action fire
/// at the waypoint that action fired at; unchained ones at waypoint 0.
fn photos_per_waypoint(mission: &Mission) -> Vec<usize> {
    let mut photos = vec![0; mission.waypoint_count()];
    let mut current = 0;
    for action in &mission.actions {
        match action.trigger {
            ActionTrigger::ReachPoint { start_index, .. }
            | ActionTrigger::Interval { start_index, .. } => current = start_index,
            ActionTrigger::Associated {
                associated_action: None,
                ..
            } => current = 0,
            ActionTrigger::Associated { .. } => {}
        }
        if action.actuator == ActionActuator::Camera(CameraOperation::TakePhoto) {
            if let Some(count) = photos.get_mut(current) {
                *count += 1;
            }
        }
    }
    photos
}

fn execution(index: usize, reached: bool, error: Option<String>) -> VehicleEvent {
    VehicleEvent::Execution {
        progress: ExecutionProgress {
            target_waypoint_index: index,
            is_waypoint_reached: reached,
        },
        error,
    }
}

fn rejected(reason: impl Into<String>) -> VehicleError {
    VehicleError::Rejected(reason.into())
}

/// In-memory aircraft. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SimulatedVehicle {
    inner: Arc<SimInner>,
}

impl Default for SimulatedVehicle {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl SimulatedVehicle {
    pub fn new(config: SimConfig) -> Self {
        let state = SimState {
            operator: OperatorState::Recovering,
            action_state: ActionUploadState::Disconnected,
            mission: None,
            lens_formats: config.lens_formats.clone(),
            flight: None,
        };
        Self {
            inner: Arc::new(SimInner {
                config,
                listeners: DashMap::new(),
                media_listeners: DashMap::new(),
                next_subscription: AtomicU64::new(1),
                next_photo: AtomicU32::new(1),
                failures: DashMap::new(),
                commands: Mutex::new(Vec::new()),
                state: Mutex::new(state),
            }),
        }
    }

    /// Fail the next command of this kind.
    pub fn fail_next(&self, kind: CommandKind) {
        self.inner.failures.insert(kind, Failure::Once);
    }

    /// Fail every command of this kind until cleared.
    pub fn fail_always(&self, kind: CommandKind) {
        self.inner.failures.insert(kind, Failure::Always);
    }

    pub fn clear_failures(&self) {
        self.inner.failures.clear();
    }

    /// Every command received so far, in order.
    pub fn commands(&self) -> Vec<VehicleCommand> {
        self.inner
            .commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn count(&self, kind: CommandKind) -> usize {
        self.commands().iter().filter(|c| c.kind() == kind).count()
    }

    /// Deliver an arbitrary event to matching listeners.
    pub fn inject(&self, event: VehicleEvent) {
        self.inner.emit(event);
    }

    /// Change the reported mission state and notify listeners.
    pub fn set_operator_state(&self, state: OperatorState) {
        self.inner.set_operator_state(state);
    }

    pub fn photo_formats(&self) -> Vec<PhotoFileFormat> {
        self.inner.state().lens_formats.clone()
    }

    /// Whether a simulated flight task is running.
    pub fn is_flying(&self) -> bool {
        self.inner.state().flight.is_some()
    }

    pub fn media_listener_count(&self) -> usize {
        self.inner.media_listeners.len()
    }
}

#[async_trait]
impl MissionOperator for SimulatedVehicle {
    async fn load_mission(&self, mission: &Mission) -> VehicleResult<()> {
        self.inner.command(VehicleCommand::LoadMission {
            mission_id: mission.mission_id,
            waypoints: mission.waypoint_count(),
            actions: mission.action_count(),
        })?;
        self.inner.step().await;

        {
            let mut state = self.inner.state();
            if matches!(state.operator, OperatorState::Executing) {
                return Err(rejected("cannot load while executing"));
            }
            state.mission = Some(Arc::new(mission.clone()));
            state.action_state = ActionUploadState::Disconnected;
        }
        if self.inner.config.ready_after_load {
            self.inner.set_operator_state(OperatorState::ReadyToUpload);
        }
        Ok(())
    }

    async fn upload_mission(&self) -> VehicleResult<()> {
        self.inner.command(VehicleCommand::UploadMission)?;
        {
            let state = self.inner.state();
            if state.mission.is_none() {
                return Err(rejected("no mission loaded"));
            }
            if state.operator != OperatorState::ReadyToUpload {
                return Err(rejected(format!("mission state is {:?}", state.operator)));
            }
        }

        self.inner.set_operator_state(OperatorState::Uploading);
        self.inner.step().await;
        self.inner.set_operator_state(OperatorState::ReadyToExecute);
        self.inner.set_action_state(ActionUploadState::ReadyToUpload, None);
        Ok(())
    }

    async fn upload_actions(&self, actions: &[Action]) -> VehicleResult<()> {
        let total = actions.len();
        self.inner
            .command(VehicleCommand::UploadActions { count: total })?;
        {
            let state = self.inner.state();
            if state.action_state != ActionUploadState::ReadyToUpload {
                return Err(rejected(format!("action state is {:?}", state.action_state)));
            }
        }

        self.inner.set_action_state(
            ActionUploadState::Uploading,
            Some(ActionUploadProgress {
                total_action_count: total,
                last_uploaded_action_index: None,
            }),
        );
        for index in 0..total {
            self.inner.step().await;
            self.inner.emit(VehicleEvent::ActionUpload {
                previous: Some(ActionUploadState::Uploading),
                current: ActionUploadState::Uploading,
                progress: Some(ActionUploadProgress {
                    total_action_count: total,
                    last_uploaded_action_index: Some(index),
                }),
            });
        }
        self.inner.set_action_state(
            ActionUploadState::ReadyToExecute,
            Some(ActionUploadProgress {
                total_action_count: total,
                last_uploaded_action_index: total.checked_sub(1),
            }),
        );
        Ok(())
    }

    async fn start_mission(&self) -> VehicleResult<()> {
        self.inner.command(VehicleCommand::StartMission)?;
        let mission = {
            let state = self.inner.state();
            if state.operator != OperatorState::ReadyToExecute
                || state.action_state != ActionUploadState::ReadyToExecute
            {
                return Err(rejected(format!(
                    "not ready to execute (mission {:?}, actions {:?})",
                    state.operator, state.action_state
                )));
            }
            state.mission.clone().ok_or_else(|| rejected("no mission loaded"))?
        };

        self.inner.set_operator_state(OperatorState::Executing);
        // Store the handle before the flight can finish and clear it.
        let mut state = self.inner.state();
        state.flight = Some(tokio::spawn(self.inner.clone().fly(mission)));
        Ok(())
    }

    async fn stop_mission(&self) -> VehicleResult<()> {
        self.inner.command(VehicleCommand::StopMission)?;
        {
            let mut state = self.inner.state();
            if state.mission.is_none() {
                return Err(rejected("no mission loaded"));
            }
            if let Some(flight) = state.flight.take() {
                flight.abort();
            }
        }
        self.inner.set_operator_state(OperatorState::ReadyToUpload);
        Ok(())
    }

    fn current_state(&self) -> OperatorState {
        self.inner.state().operator
    }

    fn current_action_state(&self) -> ActionUploadState {
        self.inner.state().action_state
    }

    fn subscribe(&self, topic: EventTopic) -> Subscription {
        let id = self.inner.next_subscription_id();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.listeners.insert(id, (topic, tx));
        Subscription {
            id,
            topic,
            events: rx,
        }
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.listeners.remove(&id).is_some()
    }

    fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

#[async_trait]
impl FlightController for SimulatedVehicle {
    async fn set_home_location(&self, home: GeoPoint) -> VehicleResult<()> {
        self.inner.command(VehicleCommand::SetHomeLocation(home))
    }

    async fn set_go_home_height(&self, height_m: u32) -> VehicleResult<()> {
        self.inner.command(VehicleCommand::SetGoHomeHeight(height_m))
    }

    async fn set_max_flight_radius_enabled(&self, enabled: bool) -> VehicleResult<()> {
        self.inner.command(VehicleCommand::SetMaxRadiusEnabled(enabled))
    }

    async fn set_max_flight_radius(&self, radius_m: u32) -> VehicleResult<()> {
        self.inner.command(VehicleCommand::SetMaxRadius(radius_m))
    }

    async fn set_max_flight_height(&self, height_m: u32) -> VehicleResult<()> {
        self.inner.command(VehicleCommand::SetMaxHeight(height_m))
    }

    async fn aircraft_location(&self) -> VehicleResult<Option<GeoPoint>> {
        Ok(self.inner.config.aircraft_location)
    }

    async fn start_landing(&self) -> VehicleResult<()> {
        self.inner.command(VehicleCommand::StartLanding)
    }
}

#[async_trait]
impl Camera for SimulatedVehicle {
    fn display_name(&self) -> String {
        self.inner.config.camera_name.clone()
    }

    fn lenses(&self) -> Vec<LensId> {
        (0..self.inner.state().lens_formats.len())
            .map(|i| LensId(i as u8))
            .collect()
    }

    async fn set_focus_mode(&self, mode: FocusMode) -> VehicleResult<()> {
        self.inner.command(VehicleCommand::SetFocusMode(mode))
    }

    async fn set_mode(&self, mode: CameraMode) -> VehicleResult<()> {
        self.inner.command(VehicleCommand::SetCameraMode(mode))
    }

    async fn photo_file_format(&self, lens: LensId) -> VehicleResult<PhotoFileFormat> {
        self.inner.command(VehicleCommand::GetPhotoFormat(lens))?;
        self.inner
            .state()
            .lens_formats
            .get(lens.0 as usize)
            .copied()
            .ok_or_else(|| rejected(format!("no lens {}", lens.0)))
    }

    async fn set_photo_file_format(&self, lens: LensId, format: PhotoFileFormat) -> VehicleResult<()> {
        self.inner
            .command(VehicleCommand::SetPhotoFormat(lens, format))?;
        let mut state = self.inner.state();
        let slot = state
            .lens_formats
            .get_mut(lens.0 as usize)
            .ok_or_else(|| rejected(format!("no lens {}", lens.0)))?;
        *slot = format;
        Ok(())
    }

    fn subscribe_media(&self) -> MediaSubscription {
        let id = self.inner.next_subscription_id();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.media_listeners.insert(id, tx);
        MediaSubscription { id, files: rx }
    }

    fn unsubscribe_media(&self, id: SubscriptionId) -> bool {
        self.inner.media_listeners.remove(&id).is_some()
    }
}
