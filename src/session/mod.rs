//! Session orchestration.
//!
//! [`SessionOrchestrator`] owns one realtime session at a time: it connects
//! and configures the transport, runs the inbound event loop, drives avatar
//! negotiation, forwards microphone audio and schedules proactive turns.

mod proactive;
pub mod state;
mod uplink;

pub use proactive::{GREETING_INSTRUCTIONS, NUDGE_PROMPT};
pub use state::{ConnectionState, SessionState};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::activity::{ActivityTracker, ProactiveAction};
use crate::audio::{AudioCapture, AudioCaptureFactory, AudioPlayback, NullPlayback};
#[cfg(feature = "recording")]
use crate::audio::SessionRecorder;
use crate::avatar::{AvatarNegotiator, AvatarSession, PeerConnectionFactory, RenderSurface};
use crate::config::{ClientConfig, ConnectOptions, CredentialResolver, TokenProvider};
use crate::conversation::MessageLog;
use crate::error::ParleyError;
use crate::lookup::{AzureSearchClient, LookupClient};
use crate::processor::ResponseProcessor;
use crate::realtime::transport::build_realtime_url;
use crate::realtime::{
    ClientEvent, ConversationItem, IceServer, InboundChannels, InboundEvent, RealtimeTransport,
    SessionConfig, SessionSignal, TransportParams, TransportSender, TurnSender,
};
use crate::tools::builtin::{get_time_tool, search_tool};
use crate::tools::{Tool, ToolDeclaration, ToolDispatcher};
use uplink::AudioUplink;

/// Everything owned by one connected session.
struct ActiveSession {
    transport: RealtimeTransport,
    sender: TransportSender,
    config: SessionConfig,
    tracker: ActivityTracker,
    uplink: AudioUplink,
    event_loop: JoinHandle<()>,
    signal_loop: JoinHandle<()>,
    action_loop: JoinHandle<()>,
    avatar: Option<AvatarSession>,
    #[cfg(feature = "recording")]
    recorder: Option<Arc<SessionRecorder>>,
}

pub struct SessionOrchestrator {
    config: ClientConfig,
    credentials: CredentialResolver,
    log: MessageLog,
    state: SessionState,
    lookup: Option<Arc<dyn LookupClient>>,
    tools: Vec<Arc<dyn Tool>>,
    extra_declarations: Vec<ToolDeclaration>,
    playback: Arc<dyn AudioPlayback>,
    capture_factory: Option<Arc<dyn AudioCaptureFactory>>,
    capture: Option<Box<dyn AudioCapture>>,
    /// Whether `capture` is started. Outlives the recording flag, which a
    /// connection loss clears.
    capturing: bool,
    avatar_factory: Option<Arc<dyn PeerConnectionFactory>>,
    render_surface: Option<Arc<dyn RenderSurface>>,
    active: Option<ActiveSession>,
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("endpoint", &self.config.endpoint)
            .field("state", &self.state.connection())
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl SessionOrchestrator {
    /// Create an orchestrator. A lookup client is built when the config
    /// carries search settings.
    pub fn new(config: ClientConfig, token_provider: Option<Arc<dyn TokenProvider>>) -> Self {
        let credentials = CredentialResolver::new(config.api_key.clone(), token_provider);
        let lookup = config
            .search
            .clone()
            .map(|search| Arc::new(AzureSearchClient::new(search)) as Arc<dyn LookupClient>);
        Self {
            config,
            credentials,
            log: MessageLog::new(),
            state: SessionState::new(),
            lookup,
            tools: vec![get_time_tool()],
            extra_declarations: Vec::new(),
            playback: Arc::new(NullPlayback),
            capture_factory: None,
            capture: None,
            capturing: false,
            avatar_factory: None,
            render_surface: None,
            active: None,
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn LookupClient>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Register an additional executable tool.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.retain(|existing| existing.name() != tool.name());
        self.tools.push(tool);
        self
    }

    /// Declare a tool to the service. Connecting fails unless an executor
    /// with the same name is registered.
    pub fn with_declared_tool(mut self, declaration: ToolDeclaration) -> Self {
        self.extra_declarations.push(declaration);
        self
    }

    pub fn with_playback(mut self, playback: Arc<dyn AudioPlayback>) -> Self {
        self.playback = playback;
        self
    }

    pub fn with_capture_factory(mut self, factory: Arc<dyn AudioCaptureFactory>) -> Self {
        self.capture_factory = Some(factory);
        self
    }

    pub fn with_avatar_media(
        mut self,
        factory: Arc<dyn PeerConnectionFactory>,
        surface: Option<Arc<dyn RenderSurface>>,
    ) -> Self {
        self.avatar_factory = Some(factory);
        self.render_surface = surface;
        self
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Snapshot sent in the current session's handshake.
    pub fn session_config(&self) -> Option<&SessionConfig> {
        self.active.as_ref().map(|active| &active.config)
    }

    /// Executors and declarations for one connect attempt.
    fn build_tools(
        &self,
        options: &ConnectOptions,
    ) -> Result<(ToolDispatcher, Vec<ToolDeclaration>), ParleyError> {
        let mut executors = self.tools.clone();
        if options.enable_search {
            if let Some(lookup) = &self.lookup {
                executors.push(search_tool(Some(lookup.clone())));
            }
        }
        let mut declarations: Vec<ToolDeclaration> =
            executors.iter().map(|tool| tool.declaration()).collect();
        for declaration in &self.extra_declarations {
            if !declarations.iter().any(|d| d.name == declaration.name) {
                declarations.push(declaration.clone());
            }
        }
        let dispatcher = ToolDispatcher::for_declarations(&declarations, &executors)?;
        Ok((dispatcher, declarations))
    }

    /// Connect and configure a session.
    ///
    /// Failures are appended to the message log and leave the state
    /// `Disconnected`. Avatar negotiation failure is not a connect failure.
    pub async fn connect(&mut self, options: ConnectOptions) -> Result<(), ParleyError> {
        if self.active.is_some() && self.state.connection() == ConnectionState::Disconnected {
            // The connection was lost; release what is left of it first.
            self.disconnect().await;
        }
        if self.active.is_some() || self.state.connection() != ConnectionState::Disconnected {
            return Err(ParleyError::InvalidState("Session is already active".into()));
        }
        if self.credentials.is_empty() {
            return Err(self.fail(ParleyError::Authentication(
                "An API key or token provider is required".into(),
            )));
        }
        let target = match options.target() {
            Ok(target) => target,
            Err(error) => return Err(self.fail(error)),
        };

        self.state.set_connection(ConnectionState::Connecting);
        match self.open_session(&options, target).await {
            Ok(active) => {
                self.active = Some(active);
                self.state.set_connection(ConnectionState::Connected);
                tracing::info!(session_id = ?self.state.session_id(), "session connected");
                Ok(())
            }
            Err(error) => {
                self.state.set_connection(ConnectionState::Disconnected);
                Err(self.fail(error))
            }
        }
    }

    fn fail(&self, error: ParleyError) -> ParleyError {
        tracing::warn!(error = %error, category = ?error.category(), "connect failed");
        let text = match &error {
            ParleyError::Configuration(message) => message.clone(),
            other => other.to_string(),
        };
        self.log.push_error(text);
        error
    }

    async fn open_session(
        &self,
        options: &ConnectOptions,
        target: crate::config::ConnectTarget,
    ) -> Result<ActiveSession, ParleyError> {
        let credential = self.credentials.resolve().await?;
        let (dispatcher, declarations) = self.build_tools(options)?;
        let config = options.session_config(declarations);
        let url = build_realtime_url(
            &self.config.endpoint,
            &self.config.api_version,
            &target,
            &credential,
        )?;

        let (transport, channels) = RealtimeTransport::open(
            TransportParams {
                url,
                credential,
                heartbeat_interval: self.config.heartbeat_interval,
                transcription_enabled: config.transcription_enabled(),
            },
            ClientEvent::SessionUpdate {
                session: config.to_session_payload(),
            },
        )
        .await?;
        let sender = transport.sender();
        let InboundChannels {
            events,
            mut signals,
        } = channels;

        let avatar = if config.wants_avatar() {
            self.start_avatar(&sender, &mut signals).await
        } else {
            None
        };

        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let tracker = ActivityTracker::new(
            self.config.proactive_interval,
            Arc::new(move |action: ProactiveAction| {
                let _ = actions_tx.send(action);
            }),
        );
        let action_loop = proactive::spawn_action_loop(sender.clone(), actions_rx, self.log.clone());

        let processor = ResponseProcessor::new(
            self.log.clone(),
            Arc::new(dispatcher),
            sender.clone(),
            self.playback.clone(),
            tracker.clone(),
        );
        let event_loop = tokio::spawn(run_event_loop(
            processor,
            events,
            sender.clone(),
            self.log.clone(),
        ));
        let signal_loop = tokio::spawn(run_signal_loop(
            signals,
            self.state.clone(),
            self.log.clone(),
            tracker.clone(),
        ));

        #[cfg(feature = "recording")]
        let recorder = self
            .config
            .recording_dir
            .clone()
            .map(|dir| Arc::new(SessionRecorder::new(dir)));
        let uplink = AudioUplink::new(sender.clone(), self.state.clone(), tracker.clone());
        #[cfg(feature = "recording")]
        let uplink = uplink.with_recorder(recorder.clone());

        if options.proactive {
            tracker.start();
        }

        Ok(ActiveSession {
            transport,
            sender,
            config,
            tracker,
            uplink,
            event_loop,
            signal_loop,
            action_loop,
            avatar,
            #[cfg(feature = "recording")]
            recorder,
        })
    }

    /// Negotiate avatar media. Failures degrade to audio only.
    async fn start_avatar(
        &self,
        sender: &TransportSender,
        signals: &mut mpsc::UnboundedReceiver<SessionSignal>,
    ) -> Option<AvatarSession> {
        let Some(factory) = self.avatar_factory.clone() else {
            tracing::warn!("avatar requested without a media stack, continuing audio only");
            return None;
        };

        let result = async {
            let ice_servers = wait_for_ice_servers(signals, &self.state).await?;
            let negotiator = AvatarNegotiator::new(
                factory,
                self.render_surface.clone(),
                self.config.avatar_settle_delay,
            );
            negotiator
                .negotiate(ice_servers, sender, wait_for_answer(signals, &self.state))
                .await
        }
        .await;

        match result {
            Ok(session) => Some(session),
            Err(error) => {
                tracing::warn!(error = %error, "avatar negotiation failed");
                self.log.push_error(error.to_string());
                None
            }
        }
    }

    /// Tear the session down. Never fails; teardown errors are logged.
    pub async fn disconnect(&mut self) {
        let Some(active) = self.active.take() else {
            self.state.set_connection(ConnectionState::Disconnected);
            return;
        };
        self.state.set_connection(ConnectionState::Disconnecting);

        active.tracker.stop();
        active.action_loop.abort();

        self.state.set_recording(false);
        self.release_capture().await;
        if let Err(error) = self.playback.stop().await {
            tracing::warn!(error = %error, "failed to stop audio playback");
        }
        if let Some(avatar) = active.avatar {
            if let Err(error) = avatar.close().await {
                tracing::warn!(error = %error, "failed to close avatar session");
            }
        }

        let mut transport = active.transport;
        if let Err(error) = transport.close().await {
            tracing::warn!(error = %error, "failed to close realtime transport");
        }
        active.event_loop.abort();
        active.signal_loop.abort();
        let _ = active.event_loop.await;
        let _ = active.signal_loop.await;

        #[cfg(feature = "recording")]
        if let Some(recorder) = active.recorder {
            let session_id = self.state.session_id();
            if let Err(error) = recorder.finish(session_id.as_deref()) {
                tracing::warn!(error = %error, "failed to save session recording");
            }
        }

        self.state.set_session_id(None);
        self.state.set_connection(ConnectionState::Disconnected);
        tracing::info!("session disconnected");
    }

    /// Send a user text turn and request a response.
    ///
    /// Blank input or a missing session is a no-op. The user message is
    /// logged before the send; a send failure appends an error message.
    pub async fn send_text(&self, text: &str) -> Result<(), ParleyError> {
        let text = text.trim();
        if text.is_empty() || !self.state.is_connected() {
            return Ok(());
        }
        let Some(active) = &self.active else {
            return Ok(());
        };

        self.log.push_user(text);
        let result = async {
            active
                .sender
                .send_item(ConversationItem::user_text(text))
                .await?;
            active.sender.generate_response(None).await
        }
        .await;
        if let Err(error) = &result {
            tracing::warn!(error = %error, "failed to send text turn");
            self.log.push_error(error.to_string());
        }
        result
    }

    /// Forward one captured PCM16 chunk. Requires recording to be on.
    pub fn send_audio_chunk(&self, pcm: Vec<u8>) -> Result<(), ParleyError> {
        let active = self
            .active
            .as_ref()
            .ok_or_else(|| ParleyError::InvalidState("Not connected".into()))?;
        active.uplink.send_chunk(pcm)
    }

    /// Flip the microphone. Returns the new recording flag.
    pub async fn toggle_recording(&mut self) -> Result<bool, ParleyError> {
        let target = !self.state.recording();
        self.set_recording(target).await?;
        Ok(target)
    }

    /// Turn the microphone on or off. Setting the current value is a no-op.
    pub async fn set_recording(&mut self, on: bool) -> Result<(), ParleyError> {
        if on == self.state.recording() {
            return Ok(());
        }
        if on {
            self.start_recording().await
        } else {
            self.stop_recording().await
        }
    }

    async fn start_recording(&mut self) -> Result<(), ParleyError> {
        let Some(active) = self.active.as_ref().filter(|_| self.state.is_connected()) else {
            return Err(ParleyError::InvalidState(
                "Connect before turning on the microphone".into(),
            ));
        };
        let sink = active.uplink.sink();

        if self.capture.is_none() {
            let factory = self.capture_factory.as_ref().ok_or_else(|| {
                ParleyError::Configuration("No audio capture device is configured".into())
            })?;
            self.capture = Some(factory.create()?);
        }
        let Some(capture) = self.capture.as_mut() else {
            return Ok(());
        };

        self.state.set_recording(true);
        if let Err(error) = capture.start(sink).await {
            self.state.set_recording(false);
            self.log.push_error(error.to_string());
            return Err(error);
        }
        self.capturing = true;
        tracing::debug!("microphone on");
        Ok(())
    }

    async fn stop_recording(&mut self) -> Result<(), ParleyError> {
        self.state.set_recording(false);
        self.release_capture().await;
        tracing::debug!("microphone off");

        let Some(active) = &self.active else {
            return Ok(());
        };
        if !active.config.turn_detection.is_manual() {
            return Ok(());
        }
        let result = async {
            active.sender.send_event(ClientEvent::InputAudioCommit).await?;
            active.sender.generate_response(None).await
        }
        .await;
        if let Err(error) = &result {
            self.log.push_error(error.to_string());
        }
        result
    }

    async fn release_capture(&mut self) {
        if !self.capturing {
            return;
        }
        self.capturing = false;
        if let Some(capture) = self.capture.as_mut() {
            if let Err(error) = capture.stop().await {
                tracing::warn!(error = %error, "failed to stop audio capture");
            }
        }
    }
}

async fn wait_for_ice_servers(
    signals: &mut mpsc::UnboundedReceiver<SessionSignal>,
    state: &SessionState,
) -> Result<Vec<IceServer>, ParleyError> {
    while let Some(signal) = signals.recv().await {
        match signal {
            SessionSignal::SessionCreated { session_id } => {
                state.set_session_id(Some(session_id));
            }
            SessionSignal::SessionUpdated {
                session_id,
                ice_servers,
            } => {
                if session_id.is_some() {
                    state.set_session_id(session_id);
                }
                return ice_servers.ok_or_else(|| {
                    ParleyError::Negotiation("Service returned no avatar relay servers".into())
                });
            }
            SessionSignal::ServerError { message } => {
                return Err(ParleyError::Negotiation(message));
            }
            SessionSignal::ConnectionLost { reason } => {
                return Err(ParleyError::Transport(reason));
            }
            SessionSignal::AvatarAnswer { .. } => {
                tracing::debug!("ignoring avatar answer before negotiation");
            }
        }
    }
    Err(ParleyError::Transport(
        "Connection closed before the session was configured".into(),
    ))
}

async fn wait_for_answer(
    signals: &mut mpsc::UnboundedReceiver<SessionSignal>,
    state: &SessionState,
) -> Result<String, ParleyError> {
    while let Some(signal) = signals.recv().await {
        match signal {
            SessionSignal::AvatarAnswer { server_sdp } => return Ok(server_sdp),
            SessionSignal::ServerError { message } => {
                return Err(ParleyError::Negotiation(message));
            }
            SessionSignal::ConnectionLost { reason } => {
                return Err(ParleyError::Transport(reason));
            }
            SessionSignal::SessionCreated { session_id } => {
                state.set_session_id(Some(session_id));
            }
            SessionSignal::SessionUpdated { session_id, .. } => {
                if session_id.is_some() {
                    state.set_session_id(session_id);
                }
            }
        }
    }
    Err(ParleyError::Transport(
        "Connection closed before the avatar answer arrived".into(),
    ))
}

/// One response at a time, in delivery order.
async fn run_event_loop<S: TurnSender>(
    mut processor: ResponseProcessor<S>,
    mut events: mpsc::UnboundedReceiver<InboundEvent>,
    sender: TransportSender,
    log: MessageLog,
) {
    while let Some(event) = events.recv().await {
        if let Err(error) = processor.process(event).await {
            if sender.is_closed() {
                tracing::debug!(error = %error, "transport gone, stopping event loop");
                break;
            }
            tracing::warn!(error = %error, "response processing failed");
            log.push_error(error.to_string());
        }
    }
    tracing::debug!("event loop finished");
}

async fn run_signal_loop(
    mut signals: mpsc::UnboundedReceiver<SessionSignal>,
    state: SessionState,
    log: MessageLog,
    tracker: ActivityTracker,
) {
    while let Some(signal) = signals.recv().await {
        match signal {
            SessionSignal::SessionCreated { session_id } => {
                tracing::info!(session_id = %session_id, "session created");
                state.set_session_id(Some(session_id));
            }
            SessionSignal::SessionUpdated { session_id, .. } => {
                if session_id.is_some() {
                    state.set_session_id(session_id);
                }
            }
            SessionSignal::AvatarAnswer { .. } => {
                tracing::debug!("ignoring unsolicited avatar answer");
            }
            SessionSignal::ServerError { message } => {
                tracing::warn!(error = %message, "realtime service error");
                log.push_error(message);
            }
            SessionSignal::ConnectionLost { reason } => {
                tracing::warn!(reason = %reason, "realtime connection lost");
                tracker.stop();
                log.push_error(reason);
                state.set_recording(false);
                state.set_connection(ConnectionState::Disconnected);
            }
        }
    }
}
