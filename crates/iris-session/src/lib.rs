//! Session controller: the state machine driving capture, transmission, and
//! session resolution.

use futures::StreamExt;
use iris_camera::CameraSource;
use iris_encoder::JpegFrameEncoder;
use iris_ops::SessionJournal;
use iris_transport::SessionTransport;
use iris_types::{
    config::SessionConfig,
    events::SessionEvent,
    protocol::{AckOutcome, ClientMessage, ServerMessage},
    session::{PendingResolution, SessionName, SessionState, UiProjection},
    IrisError, Result,
};
use tokio::{
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{info, warn};

const STATUS_WAITING: &str = "Waiting for server connection...";
const STATUS_CONNECTED: &str = "Connected. Ready to start.";
const STATUS_RECORDING: &str = "Recording started. Move your head around.";
const STATUS_SAVING: &str = "Saving... Please wait.";
const STATUS_DISCARDING: &str = "Discarding session...";
const STATUS_CAMERA_ERROR: &str = "Error: could not access camera.";

/// Actions the UI surface can request.
#[derive(Debug, Clone)]
pub enum UiCommand {
    Start(String),
    Save,
    Discard,
    Quit,
}

/// What the controller pushes back to the UI surface.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    Projection(UiProjection),
    /// Blocking validation error the UI renders as a modal alert.
    Alert(String),
}

/// Orchestrates one capture session at a time over injected camera and
/// transport implementations.
///
/// States: `Idle` (no camera held), `Recording` (cadence-driven frame
/// transmission), `Resolving` (save/discard sent, awaiting the server's
/// acknowledgment). Every transition out of `Recording`/`Resolving` releases
/// the camera and disarms the cadence.
pub struct SessionController<C, T>
where
    C: CameraSource,
    T: SessionTransport,
{
    camera: C,
    transport: T,
    encoder: JpegFrameEncoder,
    journal: SessionJournal,
    config: SessionConfig,
    state: SessionState,
    name: Option<SessionName>,
    pending: Option<PendingResolution>,
    status: String,
}

impl<C, T> SessionController<C, T>
where
    C: CameraSource,
    T: SessionTransport,
{
    pub fn new(
        config: SessionConfig,
        camera: C,
        transport: T,
        encoder: JpegFrameEncoder,
        journal: SessionJournal,
    ) -> Self {
        Self {
            camera,
            transport,
            encoder,
            journal,
            config,
            state: SessionState::Idle,
            name: None,
            pending: None,
            status: STATUS_WAITING.to_string(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn projection(&self) -> UiProjection {
        UiProjection::new(self.state, self.status.clone())
    }

    /// Which resolution request is awaiting the server, if any.
    pub fn pending(&self) -> Option<PendingResolution> {
        self.pending
    }

    /// `Idle -> Recording`, guarded by a non-empty trimmed name.
    ///
    /// An invalid name returns the validation error with no side effects. A
    /// camera acquisition failure is reported through the status readout and
    /// leaves the state untouched.
    pub async fn start(&mut self, raw_name: &str) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(session_error("start is only valid while idle"));
        }
        let name = SessionName::new(raw_name)?;

        if let Err(err) = self.camera.acquire().await {
            warn!("camera acquisition failed: {err}");
            self.status = STATUS_CAMERA_ERROR.to_string();
            return Ok(());
        }

        info!("Session '{name}' recording");
        self.name = Some(name);
        self.status = STATUS_RECORDING.to_string();
        self.transition(SessionState::Recording).await;
        Ok(())
    }

    /// One cadence tick: grab, encode, send. Failures are fatal to this tick
    /// only; the session keeps recording.
    pub async fn tick(&mut self) {
        if self.state != SessionState::Recording {
            return;
        }
        let frame = match self.camera.grab().await {
            Ok(frame) => frame,
            Err(err) => {
                warn!("frame grab failed, skipping tick: {err}");
                return;
            }
        };
        let image = match self.encoder.encode(&frame) {
            Ok(image) => image,
            Err(err) => {
                warn!("frame encode failed, skipping tick: {err}");
                return;
            }
        };
        self.send(ClientMessage::Frame { image }).await;
    }

    /// `Recording -> Resolving` with a commit request.
    pub async fn save(&mut self) -> Result<()> {
        if self.state != SessionState::Recording {
            return Err(session_error("save is only valid while recording"));
        }
        let name = self
            .name
            .clone()
            .ok_or_else(|| session_error("recording session has no name"))?;
        self.send(ClientMessage::Save {
            name: name.as_str().to_string(),
        })
        .await;
        self.status = STATUS_SAVING.to_string();
        self.pending = Some(PendingResolution::Save);
        self.transition(SessionState::Resolving).await;
        Ok(())
    }

    /// `Recording -> Resolving` with an abandon request.
    pub async fn discard(&mut self) -> Result<()> {
        if self.state != SessionState::Recording {
            return Err(session_error("discard is only valid while recording"));
        }
        self.send(ClientMessage::Discard {}).await;
        self.status = STATUS_DISCARDING.to_string();
        self.pending = Some(PendingResolution::Discard);
        self.transition(SessionState::Resolving).await;
        Ok(())
    }

    /// Single dispatch point for everything the server sends.
    pub async fn handle_server(&mut self, message: ServerMessage) {
        self.journal
            .record(SessionEvent::inbound(message.clone()))
            .await;

        match &message {
            ServerMessage::Connect => {
                if self.state == SessionState::Idle {
                    self.status = STATUS_CONNECTED.to_string();
                }
                return;
            }
            ServerMessage::Status { message } => {
                self.status = message.clone();
            }
            ServerMessage::Ack { outcome } => {
                self.status = match outcome {
                    AckOutcome::Saved => "Session saved.".to_string(),
                    AckOutcome::Discarded => "Session discarded.".to_string(),
                    AckOutcome::Error => "Server reported an error.".to_string(),
                };
            }
        }

        if let Some(outcome) = message.terminal_outcome() {
            // Terminal acks end the session from Resolving, and also from
            // Recording should the server resolve it unprompted (error path).
            if matches!(
                self.state,
                SessionState::Recording | SessionState::Resolving
            ) {
                self.finish(outcome).await;
            }
        }
    }

    /// Tear down back to `Idle`: release the camera on every exit route.
    async fn finish(&mut self, outcome: AckOutcome) {
        info!("Session resolved: {outcome:?}");
        if let Err(err) = self.camera.release().await {
            warn!("camera release failed: {err}");
        }
        self.name = None;
        self.pending = None;
        self.transition(SessionState::Idle).await;
    }

    async fn send(&self, message: ClientMessage) {
        self.journal
            .record(SessionEvent::outbound(message.clone()))
            .await;
        // Fire-and-forget: transport failures are logged, never retried.
        if let Err(err) = self.transport.send(message).await {
            warn!("transport send failed: {err}");
        }
    }

    async fn transition(&mut self, to: SessionState) {
        let from = self.state;
        self.state = to;
        self.journal
            .record(SessionEvent::lifecycle(from, to, Some(self.status.clone())))
            .await;
    }

    /// Drive the controller: UI commands, inbound server messages, and the
    /// cadence timer (armed only while `Recording`).
    ///
    /// Commands arrive over a tokio channel from async callers; updates go
    /// out over a std channel because the UI surface drains them from a
    /// blocking terminal thread.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<UiCommand>,
        updates: std::sync::mpsc::Sender<SessionUpdate>,
    ) -> Result<()> {
        let mut inbound = self.transport.incoming();
        let mut cadence = interval(Duration::from_millis(self.config.frame_interval_ms));
        cadence.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let _ = updates.send(SessionUpdate::Projection(self.projection()));

        loop {
            tokio::select! {
                _ = cadence.tick(), if self.state == SessionState::Recording => {
                    self.tick().await;
                }
                command = commands.recv() => {
                    match command {
                        Some(UiCommand::Start(raw)) => match self.start(&raw).await {
                            Ok(()) => {
                                if self.state == SessionState::Recording {
                                    // First frame one full period after start.
                                    cadence.reset();
                                }
                            }
                            Err(err) => {
                                let _ = updates.send(SessionUpdate::Alert(err.to_string()));
                            }
                        },
                        Some(UiCommand::Save) => {
                            if let Err(err) = self.save().await {
                                warn!("{err}");
                            }
                        }
                        Some(UiCommand::Discard) => {
                            if let Err(err) = self.discard().await {
                                warn!("{err}");
                            }
                        }
                        Some(UiCommand::Quit) | None => break,
                    }
                }
                Some(message) = inbound.next() => {
                    self.handle_server(message).await;
                }
            }
            let _ = updates.send(SessionUpdate::Projection(self.projection()));
        }

        if self.state != SessionState::Idle {
            if let Err(err) = self.camera.release().await {
                warn!("camera release on shutdown failed: {err}");
            }
        }
        Ok(())
    }
}

pub fn session_error(message: impl Into<String>) -> IrisError {
    IrisError::Session(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use iris_camera::CameraMetrics;
    use iris_transport::ChannelTransport;
    use iris_types::{config::EncoderConfig, frame::CameraFrame, session::ControlsView};
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    #[derive(Default)]
    struct FakeCameraCounters {
        acquires: AtomicU32,
        grabs: AtomicU32,
        releases: AtomicU32,
    }

    struct FakeCamera {
        counters: Arc<FakeCameraCounters>,
        fail_acquire: bool,
        fail_grab: bool,
    }

    impl FakeCamera {
        fn new(counters: Arc<FakeCameraCounters>) -> Self {
            Self {
                counters,
                fail_acquire: false,
                fail_grab: false,
            }
        }
    }

    #[async_trait]
    impl CameraSource for FakeCamera {
        async fn acquire(&mut self) -> Result<()> {
            if self.fail_acquire {
                return Err(iris_camera::camera_error("permission denied"));
            }
            self.counters.acquires.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn grab(&self) -> Result<CameraFrame> {
            if self.fail_grab {
                return Err(iris_camera::camera_error("device unplugged"));
            }
            self.counters.grabs.fetch_add(1, Ordering::SeqCst);
            Ok(CameraFrame::from_rgb(2, 2, vec![10; 2 * 2 * 3]))
        }

        async fn release(&mut self) -> Result<()> {
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn metrics(&self) -> CameraMetrics {
            CameraMetrics::default()
        }
    }

    struct Harness {
        controller: SessionController<FakeCamera, ChannelTransport>,
        transport: ChannelTransport,
        counters: Arc<FakeCameraCounters>,
    }

    fn harness_with(fail_acquire: bool, fail_grab: bool) -> Harness {
        let counters = Arc::new(FakeCameraCounters::default());
        let mut camera = FakeCamera::new(counters.clone());
        camera.fail_acquire = fail_acquire;
        camera.fail_grab = fail_grab;
        let transport = ChannelTransport::new(32);
        let controller = SessionController::new(
            iris_types::config::SessionConfig {
                frame_interval_ms: 500,
            },
            camera,
            transport.clone(),
            JpegFrameEncoder::new(&EncoderConfig { jpeg_quality: 0.8 }),
            SessionJournal::new(),
        );
        Harness {
            controller,
            transport,
            counters,
        }
    }

    fn harness() -> Harness {
        harness_with(false, false)
    }

    fn frames_sent(transport: &ChannelTransport) -> usize {
        transport
            .sent()
            .iter()
            .filter(|m| matches!(m, ClientMessage::Frame { .. }))
            .count()
    }

    #[tokio::test]
    async fn empty_or_whitespace_name_blocks_start() {
        let mut h = harness();
        for raw in ["", "   ", "\t \n"] {
            assert!(h.controller.start(raw).await.is_err());
            assert_eq!(h.controller.state(), SessionState::Idle);
        }
        assert_eq!(h.counters.acquires.load(Ordering::SeqCst), 0);
        assert!(h.transport.sent().is_empty());
        assert_eq!(h.controller.projection().view, ControlsView::PreSession);
    }

    #[tokio::test]
    async fn start_acquires_camera_and_shows_session_controls() {
        let mut h = harness();
        h.controller.start("Alice").await.expect("start");
        assert_eq!(h.controller.state(), SessionState::Recording);
        assert_eq!(h.counters.acquires.load(Ordering::SeqCst), 1);
        let projection = h.controller.projection();
        assert_eq!(projection.view, ControlsView::InSession);
        assert!(projection.status.starts_with("Recording started"));
    }

    #[tokio::test]
    async fn camera_failure_reports_status_and_stays_idle() {
        let mut h = harness_with(true, false);
        h.controller.start("Alice").await.expect("handled locally");
        assert_eq!(h.controller.state(), SessionState::Idle);
        let projection = h.controller.projection();
        assert_eq!(projection.view, ControlsView::PreSession);
        assert!(projection.status.contains("could not access camera"));
        h.controller.tick().await;
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn each_tick_sends_exactly_one_frame_while_recording() {
        let mut h = harness();
        h.controller.tick().await;
        assert_eq!(frames_sent(&h.transport), 0);

        h.controller.start("Alice").await.expect("start");
        for _ in 0..3 {
            h.controller.tick().await;
        }
        assert_eq!(frames_sent(&h.transport), 3);
        let first = &h.transport.sent()[0];
        if let ClientMessage::Frame { image } = first {
            assert!(image.starts_with("data:image/jpeg;base64,"));
        } else {
            panic!("expected a frame message, got {first:?}");
        }
    }

    #[tokio::test]
    async fn grab_failure_skips_the_tick_but_keeps_recording() {
        let mut h = harness_with(false, true);
        h.controller.start("Alice").await.expect("start");
        h.controller.tick().await;
        assert_eq!(frames_sent(&h.transport), 0);
        assert_eq!(h.controller.state(), SessionState::Recording);
    }

    #[tokio::test]
    async fn save_emits_once_with_trimmed_name_and_resolves_on_ack() {
        let mut h = harness();
        h.controller.start("  Alice  ").await.expect("start");
        h.controller.save().await.expect("save");

        let saves: Vec<_> = h
            .transport
            .sent()
            .into_iter()
            .filter(|m| matches!(m, ClientMessage::Save { .. }))
            .collect();
        assert_eq!(
            saves,
            vec![ClientMessage::Save {
                name: "Alice".into()
            }]
        );
        assert_eq!(h.controller.state(), SessionState::Resolving);
        assert_eq!(h.controller.pending(), Some(PendingResolution::Save));
        assert_eq!(h.controller.projection().status, "Saving... Please wait.");

        // A second save while resolving must not emit again.
        assert!(h.controller.save().await.is_err());

        // Generic advisory text updates the readout without resolving.
        h.controller
            .handle_server(ServerMessage::Status {
                message: "Face Detected! (3 collected)".into(),
            })
            .await;
        assert_eq!(h.controller.state(), SessionState::Resolving);
        assert_eq!(
            h.controller.projection().status,
            "Face Detected! (3 collected)"
        );

        h.controller
            .handle_server(ServerMessage::Status {
                message: "Success! Saved 3 unique faces for Alice.".into(),
            })
            .await;
        assert_eq!(h.controller.state(), SessionState::Idle);
        assert_eq!(h.controller.projection().view, ControlsView::PreSession);
        assert_eq!(h.counters.releases.load(Ordering::SeqCst), 1);

        // The cadence is over: further ticks send nothing.
        let before = frames_sent(&h.transport);
        h.controller.tick().await;
        assert_eq!(frames_sent(&h.transport), before);
    }

    #[tokio::test]
    async fn discard_emits_once_and_resolves_on_discarded_text() {
        let mut h = harness();
        assert!(h.controller.discard().await.is_err());
        h.controller.start("Alice").await.expect("start");
        h.controller.discard().await.expect("discard");

        let discards = h
            .transport
            .sent()
            .iter()
            .filter(|m| matches!(m, ClientMessage::Discard {}))
            .count();
        assert_eq!(discards, 1);
        assert_eq!(h.controller.state(), SessionState::Resolving);
        assert_eq!(h.controller.pending(), Some(PendingResolution::Discard));
        assert_eq!(h.controller.projection().status, "Discarding session...");

        h.controller
            .handle_server(ServerMessage::Status {
                message: "Session discarded. Ready for new registration.".into(),
            })
            .await;
        assert_eq!(h.controller.state(), SessionState::Idle);
        assert_eq!(h.counters.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn structured_acks_resolve_the_session() {
        for outcome in [AckOutcome::Saved, AckOutcome::Discarded, AckOutcome::Error] {
            let mut h = harness();
            h.controller.start("Alice").await.expect("start");
            h.controller.save().await.expect("save");
            h.controller
                .handle_server(ServerMessage::Ack { outcome })
                .await;
            assert_eq!(h.controller.state(), SessionState::Idle);
            assert_eq!(h.counters.releases.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn error_status_while_recording_releases_camera() {
        // The hypothetical unprompted exit route out of Recording.
        let mut h = harness();
        h.controller.start("Alice").await.expect("start");
        h.controller
            .handle_server(ServerMessage::Ack {
                outcome: AckOutcome::Error,
            })
            .await;
        assert_eq!(h.controller.state(), SessionState::Idle);
        assert_eq!(h.counters.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_signal_updates_idle_status_only() {
        let mut h = harness();
        h.controller.handle_server(ServerMessage::Connect).await;
        assert_eq!(
            h.controller.projection().status,
            "Connected. Ready to start."
        );

        h.controller.start("Alice").await.expect("start");
        h.controller.handle_server(ServerMessage::Connect).await;
        assert!(h.controller.projection().status.starts_with("Recording"));
        assert_eq!(h.controller.state(), SessionState::Recording);
    }

    #[tokio::test]
    async fn full_session_scenario() {
        let mut h = harness();
        h.controller.start("Alice").await.expect("start");
        assert!(h.controller.projection().status.starts_with("Recording"));
        assert_eq!(h.controller.projection().view, ControlsView::InSession);

        for _ in 0..3 {
            h.controller.tick().await;
        }
        assert_eq!(frames_sent(&h.transport), 3);

        h.controller.save().await.expect("save");
        assert!(h
            .transport
            .sent()
            .contains(&ClientMessage::Save {
                name: "Alice".into()
            }));
        assert_eq!(h.controller.projection().status, "Saving... Please wait.");

        h.controller
            .handle_server(ServerMessage::Status {
                message: "Success! saved.".into(),
            })
            .await;
        assert_eq!(h.controller.projection().view, ControlsView::PreSession);
        assert_eq!(h.controller.state(), SessionState::Idle);
        assert_eq!(h.counters.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_sends_one_frame_per_cadence_period() {
        let h = harness();
        let transport = h.transport.clone();
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (upd_tx, _upd_rx) = std::sync::mpsc::channel();
        let handle = tokio::spawn(h.controller.run(cmd_rx, upd_tx));

        cmd_tx
            .send(UiCommand::Start("Alice".into()))
            .await
            .expect("send start");
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(frames_sent(&transport), 0);

        // One period per step: a single large jump would be collapsed into
        // one delayed tick by the missed-tick policy.
        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(500)).await;
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
        }
        assert_eq!(frames_sent(&transport), 3);

        cmd_tx.send(UiCommand::Quit).await.expect("send quit");
        handle.await.expect("join").expect("run");
        // No further frames after leaving the run loop.
        assert_eq!(frames_sent(&transport), 3);
    }

    #[tokio::test]
    async fn run_loop_sees_connect_from_an_already_connected_transport() {
        // Production wiring connects the transport before the controller
        // subscribes; the connect signal must still reach the status line.
        let h = harness();
        let mut transport = h.transport.clone();
        transport.connect().await.expect("connect");

        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (upd_tx, upd_rx) = std::sync::mpsc::channel();
        let handle = tokio::spawn(h.controller.run(cmd_rx, upd_tx));
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        cmd_tx.send(UiCommand::Quit).await.expect("send quit");
        handle.await.expect("join").expect("run");

        let saw_connected = upd_rx.try_iter().any(|update| {
            matches!(
                update,
                SessionUpdate::Projection(p) if p.status == "Connected. Ready to start."
            )
        });
        assert!(saw_connected, "connect signal never reached the projection");
    }

    #[tokio::test]
    async fn run_loop_surfaces_validation_alerts() {
        let h = harness();
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (upd_tx, upd_rx) = std::sync::mpsc::channel();
        let handle = tokio::spawn(h.controller.run(cmd_rx, upd_tx));

        cmd_tx
            .send(UiCommand::Start("   ".into()))
            .await
            .expect("send start");
        cmd_tx.send(UiCommand::Quit).await.expect("send quit");
        handle.await.expect("join").expect("run");

        let alerts: Vec<_> = upd_rx
            .try_iter()
            .filter_map(|update| match update {
                SessionUpdate::Alert(text) => Some(text),
                SessionUpdate::Projection(_) => None,
            })
            .collect();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("name"));
    }
}
