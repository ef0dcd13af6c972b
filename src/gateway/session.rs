//! Gateway session client
//!
//! One session owns one socket. The socket, the command queue and teardown
//! are multiplexed on a single actor task, so everything that touches the
//! message log runs in transport order without locking.
//!
//! ## Architecture
//!
//! ```text
//!  SessionClient ──Command──► actor task ──frames──► gateway
//!        ▲                       │  ▲
//!        │                       ▼  │
//!        └──watch<Snapshot>── SessionCore (state machine, log, pending ids)
//! ```
//!
//! [`SessionCore`] is the socket-free part and is driven directly in tests.

use futures::{SinkExt, StreamExt};
use moka::sync::Cache;
use secrecy::ExposeSecret;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::protocol::{
    decode, encode, events, methods, AuthParams, ChatEventPayload, ChatHistoryParams,
    ChatHistoryResult, ChatSendParams, ClientInfo, ConnectParams, Envelope, EventFrame,
    RequestFrame, ResponseFrame,
};
use super::state::{ConnectionState, StateMachine};
use super::url::{gateway_url_with_credentials, redact};
use crate::chat::{ChatMessage, Conversation};
use crate::config::GatewayConfig;
use crate::directory::AgentRecord;
use crate::error::{Error, Result};
use crate::vault::TokenVault;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on unanswered requests tracked at once
const MAX_PENDING_REQUESTS: u64 = 1024;

/// What the presentation layer observes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub messages: Vec<ChatMessage>,
    /// Last emotion tag seen, `idle` before the first one
    pub emotion: String,
}

// ============================================================================
// Core
// ============================================================================

/// Session state without the socket: connection state machine, reconciled
/// conversation and the table of requests awaiting a response.
pub struct SessionCore {
    config: GatewayConfig,
    machine: StateMachine,
    conversation: Conversation,
    /// request id -> method
    pending: Cache<String, String>,
}

impl SessionCore {
    pub fn new(config: GatewayConfig) -> Self {
        let pending = Cache::builder()
            .max_capacity(MAX_PENDING_REQUESTS)
            .time_to_live(config.pending_request_ttl)
            .build();

        SessionCore {
            conversation: Conversation::new(config.idless_events),
            machine: StateMachine::new(),
            pending,
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.current()
    }

    /// States visited so far, in order
    pub fn state_history(&self) -> &[ConnectionState] {
        self.machine.history()
    }

    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        self.machine.transition(next)?;
        debug!("Session state -> {}", next);
        Ok(())
    }

    /// Route a failure to `error`; false if already terminal
    pub fn fail(&mut self) -> bool {
        self.machine.fail()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            messages: self.conversation.messages().to_vec(),
            emotion: self.conversation.emotion().to_string(),
        }
    }

    /// Whether `id` is still awaiting its response
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Build a request and register it as pending. Only valid while connected.
    pub fn begin_request(&mut self, method: &str, params: Value) -> Result<RequestFrame> {
        if self.state() != ConnectionState::Connected {
            return Err(Error::Transport(format!(
                "cannot send {} while {}",
                method,
                self.state()
            )));
        }
        let frame = RequestFrame::new(method, params);
        self.pending.insert(frame.id.clone(), frame.method.clone());
        Ok(frame)
    }

    /// The `connect` and `chat.history` requests sent as soon as the socket opens
    pub fn opening_requests(&mut self, token: &str) -> Result<[RequestFrame; 2]> {
        let connect = ConnectParams {
            min_protocol: self.config.min_protocol,
            max_protocol: self.config.max_protocol,
            client: ClientInfo {
                id: self.config.client_id.clone(),
                mode: self.config.client_mode.clone(),
            },
            auth: AuthParams {
                token: token.to_string(),
            },
        };
        let history = ChatHistoryParams {
            session_key: self.config.session_key.clone(),
            limit: self.config.history_limit,
        };

        Ok([
            self.begin_request(methods::CONNECT, serde_json::to_value(connect)?)?,
            self.begin_request(methods::CHAT_HISTORY, serde_json::to_value(history)?)?,
        ])
    }

    /// Build a `chat.send` request. Blank text is rejected.
    pub fn chat_send(&mut self, text: &str) -> Result<RequestFrame> {
        if self.state() != ConnectionState::Connected {
            return Err(Error::Transport(format!("cannot send a message while {}", self.state())));
        }
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("message is empty".into()));
        }
        let params = ChatSendParams {
            session_key: self.config.session_key.clone(),
            message: text.to_string(),
            deliver: false,
        };
        self.begin_request(methods::CHAT_SEND, serde_json::to_value(params)?)
    }

    /// Show a sent user message in the log, keyed by its request id
    pub fn record_sent_message(&mut self, request_id: &str, text: &str) {
        self.conversation.push_user_message(request_id, text);
    }

    /// Process one inbound text frame. Returns true if the snapshot changed.
    /// Malformed frames are logged and dropped.
    pub fn handle_text(&mut self, text: &str) -> bool {
        if self.state() != ConnectionState::Connected {
            debug!("Ignoring frame received while {}", self.state());
            return false;
        }
        match decode(text) {
            Ok(envelope) => self.handle_envelope(envelope),
            Err(e) => {
                warn!("Dropping gateway frame: {}", e);
                false
            }
        }
    }

    pub fn handle_envelope(&mut self, envelope: Envelope) -> bool {
        match envelope {
            Envelope::Response(res) => self.handle_response(res),
            Envelope::Event(event) => self.handle_event(event),
            Envelope::Request(req) => {
                debug!("Ignoring gateway-initiated request {}", req.method);
                false
            }
        }
    }

    fn handle_response(&mut self, res: ResponseFrame) -> bool {
        let method = self.pending.remove(res.id.as_str()).or_else(|| res.method.clone());

        if !res.is_ok() {
            let error = res
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "request failed".to_string());
            warn!(
                "Gateway rejected {} ({}): {}",
                method.as_deref().unwrap_or("unknown request"),
                res.id,
                error
            );
            return false;
        }

        match method.as_deref() {
            Some(methods::CHAT_HISTORY) => {
                let Some(result) = res.result else {
                    debug!("chat.history response without result");
                    return false;
                };
                match serde_json::from_value::<ChatHistoryResult>(result) {
                    Ok(history) => {
                        self.conversation.load_history(&history.messages);
                        true
                    }
                    Err(e) => {
                        warn!("Dropping malformed chat.history result: {}", e);
                        false
                    }
                }
            }
            Some(methods::CONNECT) => {
                info!("Gateway accepted connect");
                false
            }
            Some(other) => {
                debug!("Response to {} ({})", other, res.id);
                false
            }
            None => {
                debug!("Response to unknown request {}", res.id);
                false
            }
        }
    }

    fn handle_event(&mut self, event: EventFrame) -> bool {
        if event.event != events::CHAT {
            debug!("Ignoring {} event", event.event);
            return false;
        }
        let payload: ChatEventPayload = match event.payload_as() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Dropping gateway event: {}", e);
                return false;
            }
        };

        let fold = self.conversation.apply_event(&payload.message);
        debug!(
            "Folded chat event {} ({}) -> {:?}",
            fold.id,
            payload.state.as_deref().unwrap_or("-"),
            fold.upsert
        );
        true
    }
}

impl std::fmt::Debug for SessionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCore")
            .field("state", &self.state())
            .field("messages", &self.conversation.messages().len())
            .field("emotion", &self.conversation.emotion())
            .finish()
    }
}

// ============================================================================
// Actor
// ============================================================================

enum Command {
    Request {
        method: String,
        params: Value,
        reply: oneshot::Sender<Result<String>>,
    },
    SendMessage {
        text: String,
        reply: oneshot::Sender<Result<String>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

impl Command {
    /// Answer a command that arrived before the socket was usable
    fn reject(self, state: ConnectionState) {
        let err = || Error::Transport(format!("session is {}", state));
        match self {
            Command::Request { reply, .. } | Command::SendMessage { reply, .. } => {
                let _ = reply.send(Err(err()));
            }
            Command::Shutdown { done } => {
                let _ = done.send(());
            }
        }
    }
}

enum Stage<T> {
    Done(T),
    Stopped,
}

enum Flow {
    Continue,
    Stop,
}

struct SessionActor {
    core: SessionCore,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl SessionActor {
    async fn run(mut self, gateway_url: String, encrypted_token: String, vault: Arc<TokenVault>) {
        let token = match self.until(vault.decrypt_token(&encrypted_token)).await {
            Stage::Done(Ok(token)) => token,
            Stage::Done(Err(e)) => {
                warn!("Could not decrypt gateway token: {}", e);
                self.fail();
                return;
            }
            Stage::Stopped => return,
        };

        if self.core.transition(ConnectionState::Connecting).is_err() {
            return;
        }
        self.publish();

        let url = match gateway_url_with_credentials(
            &gateway_url,
            token.expose_secret(),
            &self.core.config().client_id,
        ) {
            Ok(url) => url,
            Err(e) => {
                warn!("Invalid gateway URL: {}", e);
                self.fail();
                return;
            }
        };

        info!("Connecting to gateway at {}", redact(&url));
        let mut ws = match self.until(connect_async(url.as_str())).await {
            Stage::Done(Ok((ws, _))) => ws,
            Stage::Done(Err(e)) => {
                warn!("Gateway handshake failed: {}", e);
                self.fail();
                return;
            }
            Stage::Stopped => return,
        };

        if self.core.transition(ConnectionState::Connected).is_err() {
            return;
        }
        info!("Gateway session connected");
        self.publish();

        let opening = match self.core.opening_requests(token.expose_secret()) {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Could not build opening requests: {}", e);
                self.fail();
                return;
            }
        };
        drop(token);
        for frame in &opening {
            if self.send_or_fail(&mut ws, frame).await.is_err() {
                return;
            }
        }

        loop {
            let flow = tokio::select! {
                frame = ws.next() => self.on_frame(frame),
                command = self.commands.recv() => self.on_command(&mut ws, command).await,
            };
            if let Flow::Stop = flow {
                break;
            }
        }
    }

    /// Drive `fut` while answering commands that arrive in the meantime
    async fn until<F: Future>(&mut self, fut: F) -> Stage<F::Output> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                out = &mut fut => return Stage::Done(out),
                command = self.commands.recv() => match command {
                    None => return Stage::Stopped,
                    Some(Command::Shutdown { done }) => {
                        let _ = done.send(());
                        return Stage::Stopped;
                    }
                    Some(command) => command.reject(self.core.state()),
                },
            }
        }
    }

    fn on_frame(&mut self, frame: Option<std::result::Result<Message, tungstenite::Error>>) -> Flow {
        match frame {
            Some(Ok(Message::Text(text))) => {
                if self.core.handle_text(&text) {
                    self.publish();
                }
                Flow::Continue
            }
            Some(Ok(Message::Close(close))) => {
                info!("Gateway closed the session: {:?}", close);
                self.finish(ConnectionState::Disconnected);
                Flow::Stop
            }
            Some(Ok(_)) => Flow::Continue,
            Some(Err(tungstenite::Error::ConnectionClosed)) | None => {
                self.finish(ConnectionState::Disconnected);
                Flow::Stop
            }
            Some(Err(e)) => {
                warn!("Gateway socket error: {}", e);
                self.fail();
                Flow::Stop
            }
        }
    }

    async fn on_command(&mut self, ws: &mut Socket, command: Option<Command>) -> Flow {
        match command {
            // Handle dropped
            None => {
                let _ = ws.close(None).await;
                Flow::Stop
            }
            Some(Command::Shutdown { done }) => {
                if let Err(e) = ws.close(None).await {
                    debug!("Error closing gateway socket: {}", e);
                }
                let _ = done.send(());
                Flow::Stop
            }
            Some(Command::Request { method, params, reply }) => {
                let frame = match self.core.begin_request(&method, params) {
                    Ok(frame) => frame,
                    Err(e) => {
                        let _ = reply.send(Err(e));
                        return Flow::Continue;
                    }
                };
                match self.send_or_fail(ws, &frame).await {
                    Ok(()) => {
                        let _ = reply.send(Ok(frame.id));
                        Flow::Continue
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                        Flow::Stop
                    }
                }
            }
            Some(Command::SendMessage { text, reply }) => {
                let frame = match self.core.chat_send(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        let _ = reply.send(Err(e));
                        return Flow::Continue;
                    }
                };
                match self.send_or_fail(ws, &frame).await {
                    Ok(()) => {
                        self.core.record_sent_message(&frame.id, &text);
                        self.publish();
                        let _ = reply.send(Ok(frame.id));
                        Flow::Continue
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                        Flow::Stop
                    }
                }
            }
        }
    }

    async fn send_or_fail(&mut self, ws: &mut Socket, frame: &RequestFrame) -> Result<()> {
        let result = send_frame(ws, frame).await;
        if let Err(ref e) = result {
            warn!("Failed to send {}: {}", frame.method, e);
            self.fail();
        }
        result
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.core.snapshot());
    }

    fn fail(&mut self) {
        if self.core.fail() {
            self.publish();
        }
    }

    fn finish(&mut self, state: ConnectionState) {
        if self.core.transition(state).is_ok() {
            self.publish();
        }
    }
}

async fn send_frame(ws: &mut Socket, frame: &RequestFrame) -> Result<()> {
    let text = encode(&Envelope::Request(frame.clone()))?;
    ws.send(Message::Text(text))
        .await
        .map_err(|e| Error::Transport(e.to_string()))?;
    debug!("Sent {} ({})", frame.method, frame.id);
    Ok(())
}

// ============================================================================
// Handle
// ============================================================================

/// Handle to a running gateway session.
///
/// The session starts in `decrypting` as soon as it is created. It never
/// reconnects; after `disconnected` or `error`, build a new one.
/// Dropping the handle aborts the session task.
pub struct SessionClient {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl SessionClient {
    /// Start a session for an agent record
    pub fn connect(record: &AgentRecord, vault: Arc<TokenVault>, config: GatewayConfig) -> Self {
        Self::start(
            record.gateway_url.clone(),
            record.gateway_token_encrypted.clone(),
            vault,
            config,
        )
    }

    /// Start a session from a gateway URL and a vault-encrypted token
    pub fn start(
        gateway_url: impl Into<String>,
        encrypted_token: impl Into<String>,
        vault: Arc<TokenVault>,
        config: GatewayConfig,
    ) -> Self {
        let core = SessionCore::new(config);
        let (snapshot_tx, snapshot_rx) = watch::channel(core.snapshot());
        let (command_tx, command_rx) = mpsc::channel(32);

        let actor = SessionActor {
            core,
            commands: command_rx,
            snapshots: snapshot_tx,
        };
        let task = tokio::spawn(actor.run(gateway_url.into(), encrypted_token.into(), vault));

        SessionClient {
            commands: command_tx,
            snapshots: snapshot_rx,
            task: Some(task),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshots.borrow().state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Wait for the next published snapshot.
    /// Fails once the session has stopped publishing.
    pub async fn changed(&mut self) -> Result<()> {
        self.snapshots
            .changed()
            .await
            .map_err(|_| Error::Transport("session has stopped".into()))
    }

    /// Wait until a snapshot satisfies `predicate` (checked against the current one first)
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot> {
        self.snapshots
            .wait_for(predicate)
            .await
            .map(|snapshot| snapshot.clone())
            .map_err(|_| Error::Transport("session stopped before the condition was met".into()))
    }

    /// Independent receiver of snapshots
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Send user text with `chat.send`; the message appears in the log under
    /// the returned request id.
    pub async fn send_message(&self, text: impl Into<String>) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(Command::SendMessage { text: text.into(), reply }, rx).await
    }

    /// Send an arbitrary request, returning its id
    pub async fn request(&self, method: impl Into<String>, params: Value) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(
            Command::Request {
                method: method.into(),
                params,
                reply,
            },
            rx,
        )
        .await
    }

    async fn dispatch(&self, command: Command, rx: oneshot::Receiver<Result<String>>) -> Result<String> {
        let stopped = || Error::Transport(format!("session is {}", self.state()));
        self.commands.send(command).await.map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())?
    }

    /// Close the socket and stop the session. No snapshot is published after this returns.
    pub async fn shutdown(mut self) {
        let (done, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { done }).await.is_ok() {
            let _ = rx.await;
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("state", &self.state())
            .finish()
    }
}
