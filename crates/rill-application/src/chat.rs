//! Chat turn orchestration.
//!
//! `ChatUseCase` ties the engine together: it ensures an active session
//! (placeholder-first), issues the send-message request, drives the stream
//! decoder over sequential reads, feeds decoded text through the typing
//! scheduler into the transcript, migrates the placeholder when a stream
//! event carries the backend id, and finalizes the assistant message once
//! the visible output has settled.

use crate::recovery::ErrorTracker;
use rill_core::error::{RillError, Result};
use rill_core::session::{
    ConversationAction, ConversationState, Message, MigrationOutcome, Session, SessionConfig,
    SessionId, SessionRegistry, StreamEvent, StreamUsage, apply,
};
use rill_core::typing::{Clock, TokioClock, TypingScheduler, TypingSink};
use rill_interaction::client::{ByteStream, CompletionBackend};
use rill_interaction::decoder::StreamDecoder;
use rill_interaction::dto::SendMessageRequest;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;

/// Result of one completed (or interrupted) chat turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Session id after any migration.
    pub session_id: SessionId,
    /// Full assistant text received from the backend.
    pub reply: String,
    /// True when the turn was cut short by an interrupt.
    pub interrupted: bool,
    /// Error text reported by the backend inside the stream, if any.
    pub error: Option<String>,
}

/// Cancellation and pacing handles for one in-flight stream.
struct StreamHandle {
    cancel: CancellationToken,
    typing: Arc<TypingScheduler>,
}

/// Orchestrates chat turns against the completion backend.
///
/// Constructed once at the composition root; collaborators are shared by
/// reference. At most one stream is active per session: a second send is
/// rejected at the call boundary, not queued.
pub struct ChatUseCase {
    registry: Arc<SessionRegistry>,
    backend: Arc<dyn CompletionBackend>,
    tracker: Arc<ErrorTracker>,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    streams: Mutex<HashMap<SessionId, StreamHandle>>,
    conversation: Mutex<ConversationState>,
}

impl ChatUseCase {
    pub fn new(
        registry: Arc<SessionRegistry>,
        backend: Arc<dyn CompletionBackend>,
        tracker: Arc<ErrorTracker>,
        config: SessionConfig,
    ) -> Self {
        Self::with_clock(registry, backend, tracker, config, Arc::new(TokioClock))
    }

    /// Like `new`, with an injected clock for the typing scheduler.
    pub fn with_clock(
        registry: Arc<SessionRegistry>,
        backend: Arc<dyn CompletionBackend>,
        tracker: Arc<ErrorTracker>,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            backend,
            tracker,
            config,
            clock,
            streams: Mutex::new(HashMap::new()),
            conversation: Mutex::new(ConversationState::None),
        }
    }

    /// Current position in the `None → Placeholder → Real` lifecycle.
    pub fn conversation_state(&self) -> ConversationState {
        self.conversation.lock().expect("conversation lock").clone()
    }

    /// Sends one user message and drives the response stream to completion.
    ///
    /// # Errors
    ///
    /// - `StreamBusy` when a stream is already active for the session;
    /// - `Transport` when the request or a mid-stream read fails. Partial
    ///   content received before the failure stays committed.
    pub async fn send_message(&self, text: &str) -> Result<TurnOutcome> {
        let session_id = self.registry.ensure_active(self.config.clone()).await;
        self.note_session(&session_id);

        // Reserve the stream slot before any transcript mutation so a
        // rejected second send has no side effects.
        let cancel = CancellationToken::new();
        let (sink, token_rx) = forwarding_sink();
        let typing = Arc::new(TypingScheduler::with_clock(sink, Arc::clone(&self.clock)));
        {
            let mut streams = self.streams.lock().expect("streams lock");
            if streams.contains_key(&session_id) {
                return Err(RillError::stream_busy(session_id.to_string()));
            }
            streams.insert(
                session_id.clone(),
                StreamHandle {
                    cancel: cancel.clone(),
                    typing: Arc::clone(&typing),
                },
            );
        }

        let live_id = Arc::new(RwLock::new(session_id.clone()));
        let result = self
            .run_turn(text, live_id.clone(), typing, cancel, token_rx)
            .await;

        let final_id = live_id.read().await.clone();
        self.streams.lock().expect("streams lock").remove(&final_id);
        match &result {
            Ok(_) => self.tracker.record_success(&final_id),
            Err(RillError::Transport { .. }) => {
                self.tracker.record_failure(&final_id);
            }
            Err(_) => {}
        }
        result
    }

    async fn run_turn(
        &self,
        text: &str,
        live_id: Arc<RwLock<SessionId>>,
        typing: Arc<TypingScheduler>,
        cancel: CancellationToken,
        token_rx: mpsc::UnboundedReceiver<String>,
    ) -> Result<TurnOutcome> {
        let session_id = live_id.read().await.clone();
        self.registry
            .add_message(&session_id, Message::user(text))
            .await?;

        let request = SendMessageRequest {
            message: text.to_string(),
            session_id: Some(session_id.to_string()),
        };
        let mut stream = self.backend.send_message(request).await?;

        let message_id = self.registry.begin_streaming(&session_id).await?;
        let committed = Arc::new(AtomicUsize::new(0));
        let forwarder = self.spawn_forwarder(
            token_rx,
            Arc::clone(&live_id),
            message_id.clone(),
            Arc::clone(&committed),
        );

        let mut decoder = StreamDecoder::new();
        let mut received = String::new();
        let mut usage = StreamUsage::default();
        let mut stream_error: Option<String> = None;
        let mut interrupted = false;
        let mut transport_failure: Option<RillError> = None;

        // Reads are strictly sequential: one pending read at a time.
        'read: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    interrupted = true;
                    break 'read;
                }
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        for event in decoder.feed(&bytes) {
                            self.handle_event(
                                event,
                                &live_id,
                                &typing,
                                &mut received,
                                &mut usage,
                                &mut stream_error,
                            )
                            .await;
                        }
                        if decoder.is_complete() {
                            break 'read;
                        }
                    }
                    Some(Err(err)) => {
                        transport_failure = Some(err);
                        break 'read;
                    }
                    None => {
                        if let Some(event) = decoder.finish() {
                            self.handle_event(
                                event,
                                &live_id,
                                &typing,
                                &mut received,
                                &mut usage,
                                &mut stream_error,
                            )
                            .await;
                        }
                        break 'read;
                    }
                },
            }
        }

        if !interrupted {
            // Let the visible output catch up before sealing the message;
            // finalizing earlier would truncate what the user sees typed.
            typing.settled().await;
        }

        // Close the token channel and wait for queued tokens to land.
        let final_id = self.finish_handle(&live_id, typing).await;
        let _ = forwarder.await;

        // Commit whatever the typing path has not yet written. On
        // interruption this is the partial content the user never saw
        // fully typed; it is committed, not discarded.
        let done = committed.load(Ordering::SeqCst);
        if done < received.len() {
            self.registry
                .append_streaming(&final_id, &message_id, &received[done..])
                .await?;
        }
        self.registry
            .finish_streaming(&final_id, &message_id, usage, interrupted)
            .await?;

        if let Some(err) = transport_failure {
            return Err(err);
        }

        Ok(TurnOutcome {
            session_id: final_id,
            reply: received,
            interrupted,
            error: stream_error,
        })
    }

    async fn handle_event(
        &self,
        event: StreamEvent,
        live_id: &Arc<RwLock<SessionId>>,
        typing: &Arc<TypingScheduler>,
        received: &mut String,
        usage: &mut StreamUsage,
        stream_error: &mut Option<String>,
    ) {
        match event {
            StreamEvent::Processing { .. } => {}
            StreamEvent::TextChunk { content, .. }
            | StreamEvent::AssistantText { content, .. } => {
                received.push_str(&content);
                typing.push_chunk(&content);
            }
            StreamEvent::ToolUse { tool, .. } => {
                let id = live_id.read().await.clone();
                if let Err(err) = self
                    .registry
                    .record_tool_use(&id, &self.streaming_message_id(&id).await, &tool)
                    .await
                {
                    tracing::warn!(target: "chat", "failed to record tool use: {}", err);
                }
            }
            StreamEvent::ToolResult { .. } => {
                tracing::debug!(target: "chat", "tool result received");
            }
            StreamEvent::SessionMigrated { session_id } => {
                self.maybe_migrate(&session_id, live_id).await;
            }
            StreamEvent::Result {
                session_id,
                content,
                input_tokens,
                output_tokens,
                cost_usd,
            } => {
                if let Some(raw) = session_id {
                    self.maybe_migrate(&raw, live_id).await;
                }
                usage.input_tokens = input_tokens.or(usage.input_tokens);
                usage.output_tokens = output_tokens.or(usage.output_tokens);
                usage.cost = cost_usd.or(usage.cost);
                // Some backends only deliver the final text here.
                if received.is_empty() {
                    if let Some(content) = content.filter(|c| !c.is_empty()) {
                        received.push_str(&content);
                        typing.push_chunk(&content);
                    }
                }
            }
            StreamEvent::Error { error, .. } => {
                let message = error.unwrap_or_else(|| "backend error".to_string());
                tracing::warn!(target: "chat", "stream error event: {}", message);
                *stream_error = Some(message);
            }
            StreamEvent::Done { .. } => {}
        }
    }

    /// Promotes the placeholder when a stream event carries a real id.
    async fn maybe_migrate(&self, raw: &str, live_id: &Arc<RwLock<SessionId>>) {
        let parsed = match SessionId::parse(raw) {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(target: "chat", "ignoring unparseable session id: {}", err);
                return;
            }
        };
        let Some(real) = parsed.as_real().copied() else {
            // A placeholder echoed back is not a confirmation.
            return;
        };

        let outcome = self.registry.migrate_to_real(real).await;
        if matches!(outcome, MigrationOutcome::Unchanged) {
            return;
        }

        let new_id = SessionId::Real(real);
        let old_id = {
            let mut id = live_id.write().await;
            let old = id.clone();
            *id = new_id.clone();
            old
        };
        {
            let mut streams = self.streams.lock().expect("streams lock");
            if let Some(handle) = streams.remove(&old_id) {
                streams.insert(new_id.clone(), handle);
            }
        }
        let mut state = self.conversation.lock().expect("conversation lock");
        *state = apply(&state, &ConversationAction::Migrate { real: new_id });
    }

    /// Id of the message currently being streamed into a session.
    async fn streaming_message_id(&self, session_id: &SessionId) -> String {
        self.registry
            .get(session_id)
            .await
            .and_then(|session| {
                session
                    .messages
                    .iter()
                    .rev()
                    .find(|message| message.streaming)
                    .map(|message| message.id.clone())
            })
            .unwrap_or_default()
    }

    /// Drops the stream handle so the typing sink's channel closes.
    async fn finish_handle(
        &self,
        live_id: &Arc<RwLock<SessionId>>,
        typing: Arc<TypingScheduler>,
    ) -> SessionId {
        let final_id = live_id.read().await.clone();
        self.streams.lock().expect("streams lock").remove(&final_id);
        drop(typing);
        final_id
    }

    /// Interrupts the in-flight turn for a session.
    ///
    /// Ordering matters: the typing queue is cleared and its pending timer
    /// cancelled first, then the network read is signalled to stop. The
    /// partial content is committed by the turn driver, tagged interrupted.
    /// The backend interrupt call is best-effort.
    pub async fn interrupt(&self, session_id: &SessionId) -> Result<()> {
        let handle = {
            let streams = self.streams.lock().expect("streams lock");
            streams
                .get(session_id)
                .map(|handle| (handle.cancel.clone(), Arc::clone(&handle.typing)))
        };
        let Some((cancel, typing)) = handle else {
            return Err(RillError::session_not_found(session_id.to_string()));
        };

        typing.clear();
        cancel.cancel();

        if let Err(err) = self.backend.interrupt(&session_id.to_string()).await {
            tracing::warn!(target: "chat", "backend interrupt failed: {}", err);
        }
        Ok(())
    }

    /// Resumes an existing backend session without a placeholder phase.
    ///
    /// Fetches the transcript when the registry does not hold it yet.
    pub async fn resume_session(&self, session_id: &SessionId) -> Result<()> {
        if self.registry.get(session_id).await.is_none() {
            let response = self
                .backend
                .fetch_session_history(&session_id.to_string())
                .await?;
            let id = SessionId::parse(&response.session_id)?;
            let mut session = Session::new(id, self.config.clone());
            for wire in response.messages {
                let message = wire.into_message()?;
                session.metrics.record(&message);
                session.messages.push(message);
            }
            session.derive_title();
            self.registry.insert_session(session).await;
        }

        self.registry.set_active(session_id).await?;
        let mut state = self.conversation.lock().expect("conversation lock");
        *state = apply(
            &state,
            &ConversationAction::Resume {
                real: session_id.clone(),
            },
        );
        Ok(())
    }

    /// Deletes a session locally, then on the backend.
    ///
    /// The local removal is optimistic: when the backend delete fails for
    /// a real session, the local record is restored and the error returned.
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        let was_active = self.registry.active_session_id().await.as_ref() == Some(session_id);
        let removed = self.registry.delete_session(session_id).await?;

        if session_id.is_real() {
            if let Err(err) = self.backend.delete_session(&session_id.to_string()).await {
                self.registry.restore_session(removed, was_active).await;
                return Err(err);
            }
        }

        self.tracker.forget(session_id);
        if was_active {
            let mut state = self.conversation.lock().expect("conversation lock");
            *state = apply(&state, &ConversationAction::Reset);
        }
        Ok(())
    }

    /// Replaces a broken session with a fresh placeholder after the retry
    /// budget is exhausted.
    pub async fn replace_session(&self, session_id: &SessionId) -> Result<SessionId> {
        let replacement = self.registry.replace_session(session_id).await?;
        self.tracker.forget(session_id);

        let mut state = self.conversation.lock().expect("conversation lock");
        *state = apply(&state, &ConversationAction::Reset);
        *state = apply(
            &state,
            &ConversationAction::Start {
                placeholder: replacement.clone(),
            },
        );
        Ok(replacement)
    }

    /// Records the active session in the lifecycle state machine.
    fn note_session(&self, session_id: &SessionId) {
        let mut state = self.conversation.lock().expect("conversation lock");
        if !matches!(&*state, ConversationState::None) {
            return;
        }
        let action = if session_id.is_placeholder() {
            ConversationAction::Start {
                placeholder: session_id.clone(),
            }
        } else {
            ConversationAction::Resume {
                real: session_id.clone(),
            }
        };
        *state = apply(&state, &action);
    }

    /// Forwards released typing tokens into the transcript.
    fn spawn_forwarder(
        &self,
        mut token_rx: mpsc::UnboundedReceiver<String>,
        live_id: Arc<RwLock<SessionId>>,
        message_id: String,
        committed: Arc<AtomicUsize>,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            while let Some(token) = token_rx.recv().await {
                let id = live_id.read().await.clone();
                match registry.append_streaming(&id, &message_id, &token).await {
                    Ok(()) => {
                        committed.fetch_add(token.len(), Ordering::SeqCst);
                    }
                    Err(err) => {
                        tracing::warn!(target: "chat", "dropping typed token: {}", err);
                    }
                }
            }
        })
    }
}

/// Builds a typing sink that hands released tokens to a channel.
fn forwarding_sink() -> (TypingSink, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink: TypingSink = Arc::new(move |token| {
        let _ = tx.send(token);
    });
    (sink, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rill_core::session::MessageRole;
    use rill_interaction::dto::{HistoryMessage, SessionHistoryResponse, SessionSummary};
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    const REAL_ID: &str = "11111111-1111-1111-1111-111111111111";

    /// Clock that never waits: every token releases immediately.
    struct InstantClock;

    impl Clock for InstantClock {
        fn sleep(&self, _duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
            Box::pin(async {})
        }
    }

    /// Backend that replays a fixed list of stream reads.
    struct ScriptedBackend {
        chunks: Vec<Result<Vec<u8>>>,
        history: Option<SessionHistoryResponse>,
        fail_deletes: bool,
        interrupts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn with_chunks(chunks: Vec<Result<Vec<u8>>>) -> Self {
            Self {
                chunks,
                history: None,
                fail_deletes: false,
                interrupts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn send_message(&self, _request: SendMessageRequest) -> Result<ByteStream> {
            Ok(Box::pin(futures::stream::iter(self.chunks.clone())))
        }

        async fn fetch_session_history(
            &self,
            _session_id: &str,
        ) -> Result<SessionHistoryResponse> {
            self.history
                .clone()
                .ok_or_else(|| RillError::transport("no history", false))
        }

        async fn related_sessions(
            &self,
            _project_path: &str,
            _primary_session_id: &str,
        ) -> Result<Vec<SessionSummary>> {
            Ok(Vec::new())
        }

        async fn interrupt(&self, session_id: &str) -> Result<()> {
            self.interrupts
                .lock()
                .unwrap()
                .push(session_id.to_string());
            Ok(())
        }

        async fn clear_session(&self, _session_id: &str) -> Result<()> {
            Ok(())
        }

        async fn delete_session(&self, _session_id: &str) -> Result<()> {
            if self.fail_deletes {
                Err(RillError::transport("delete failed", true))
            } else {
                Ok(())
            }
        }
    }

    /// Backend whose stream stays open until the test feeds it.
    struct PendingBackend {
        tx_slot: Mutex<Option<mpsc::UnboundedSender<Result<Vec<u8>>>>>,
        started: tokio::sync::Notify,
        interrupts: Mutex<Vec<String>>,
    }

    impl PendingBackend {
        fn new() -> Self {
            Self {
                tx_slot: Mutex::new(None),
                started: tokio::sync::Notify::new(),
                interrupts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for PendingBackend {
        async fn send_message(&self, _request: SendMessageRequest) -> Result<ByteStream> {
            let (tx, rx) = mpsc::unbounded_channel();
            *self.tx_slot.lock().unwrap() = Some(tx);
            self.started.notify_one();
            let stream = futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            });
            Ok(Box::pin(stream))
        }

        async fn fetch_session_history(
            &self,
            _session_id: &str,
        ) -> Result<SessionHistoryResponse> {
            Err(RillError::transport("no history", false))
        }

        async fn related_sessions(
            &self,
            _project_path: &str,
            _primary_session_id: &str,
        ) -> Result<Vec<SessionSummary>> {
            Ok(Vec::new())
        }

        async fn interrupt(&self, session_id: &str) -> Result<()> {
            self.interrupts
                .lock()
                .unwrap()
                .push(session_id.to_string());
            Ok(())
        }

        async fn clear_session(&self, _session_id: &str) -> Result<()> {
            Ok(())
        }

        async fn delete_session(&self, _session_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn chat_over(
        backend: Arc<dyn CompletionBackend>,
    ) -> (Arc<SessionRegistry>, Arc<ErrorTracker>, Arc<ChatUseCase>) {
        let registry = Arc::new(SessionRegistry::new());
        let tracker = Arc::new(ErrorTracker::new());
        let chat = Arc::new(ChatUseCase::with_clock(
            Arc::clone(&registry),
            backend,
            Arc::clone(&tracker),
            SessionConfig::default(),
            Arc::new(InstantClock),
        ));
        (registry, tracker, chat)
    }

    fn event_line(json: &str) -> Result<Vec<u8>> {
        Ok(format!("data: {json}\n").into_bytes())
    }

    #[tokio::test]
    async fn test_first_turn_creates_placeholder_and_migrates() {
        let backend = Arc::new(ScriptedBackend::with_chunks(vec![
            event_line(r#"{"type":"processing"}"#),
            event_line(r#"{"type":"text_chunk","content":"Hi"}"#),
            event_line(
                r#"{"type":"result","session_id":"11111111-1111-1111-1111-111111111111","input_tokens":3,"output_tokens":1,"cost_usd":0.002}"#,
            ),
            event_line(r#"{"type":"done"}"#),
        ]));
        let (registry, _tracker, chat) = chat_over(backend);

        let outcome = chat.send_message("hello").await.unwrap();

        assert_eq!(outcome.reply, "Hi");
        assert!(!outcome.interrupted);
        assert!(outcome.error.is_none());

        let real_id = SessionId::parse(REAL_ID).unwrap();
        assert_eq!(outcome.session_id, real_id);
        assert_eq!(chat.conversation_state(), ConversationState::Real {
            id: real_id.clone()
        });

        // Exactly one session, under the real id; the placeholder is gone.
        let sessions = registry.list().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, real_id);

        let session = registry.get(&real_id).await.unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].role, MessageRole::User);
        assert_eq!(session.messages[0].content.text(), "hello");
        assert_eq!(session.messages[1].role, MessageRole::Assistant);
        assert_eq!(session.messages[1].content.text(), "Hi");
        assert!(!session.messages[1].streaming);
        assert_eq!(session.messages[1].output_tokens, Some(1));
        assert_eq!(session.metrics.message_count, 2);
        assert_eq!(session.metrics.total_tokens, 4);
    }

    #[tokio::test]
    async fn test_second_send_while_streaming_is_rejected() {
        let backend = Arc::new(PendingBackend::new());
        let (_registry, _tracker, chat) = chat_over(backend.clone());

        let first = {
            let chat = Arc::clone(&chat);
            tokio::spawn(async move { chat.send_message("hello").await })
        };
        backend.started.notified().await;

        let err = chat.send_message("again").await.unwrap_err();
        assert!(err.is_stream_busy());

        // Let the first turn finish cleanly.
        let tx = backend.tx_slot.lock().unwrap().take().unwrap();
        tx.send(event_line(r#"{"type":"done"}"#)).unwrap();
        drop(tx);
        let outcome = first.await.unwrap().unwrap();
        assert!(!outcome.interrupted);
    }

    #[tokio::test]
    async fn test_interrupt_commits_partial_content() {
        let backend = Arc::new(PendingBackend::new());
        let (registry, _tracker, chat) = chat_over(backend.clone());

        let turn = {
            let chat = Arc::clone(&chat);
            tokio::spawn(async move { chat.send_message("hello").await })
        };
        backend.started.notified().await;
        let session_id = registry.active_session_id().await.unwrap();

        let tx = backend.tx_slot.lock().unwrap().take().unwrap();
        tx.send(event_line(
            r#"{"type":"text_chunk","content":"Hello wor"}"#,
        ))
        .unwrap();

        // Wait for the typed content to reach the transcript.
        let mut visible = false;
        for _ in 0..500 {
            if let Some(session) = registry.get(&session_id).await {
                if session
                    .messages
                    .iter()
                    .any(|message| message.content.text() == "Hello wor")
                {
                    visible = true;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(visible, "streamed content never reached the transcript");

        chat.interrupt(&session_id).await.unwrap();
        let outcome = turn.await.unwrap().unwrap();

        assert!(outcome.interrupted);
        assert_eq!(outcome.reply, "Hello wor");

        let session = registry.get(&session_id).await.unwrap();
        let message = session.messages.last().unwrap();
        assert!(message.interrupted);
        assert!(!message.streaming);
        assert_eq!(message.content.text(), "Hello wor");
        assert_eq!(
            backend.interrupts.lock().unwrap().as_slice(),
            &[session_id.to_string()]
        );
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_committed_state() {
        let backend = Arc::new(ScriptedBackend::with_chunks(vec![
            event_line(r#"{"type":"text_chunk","content":"partial"}"#),
            Err(RillError::transport("connection reset", true)),
        ]));
        let (registry, tracker, chat) = chat_over(backend);

        let err = chat.send_message("hello").await.unwrap_err();
        assert!(err.is_retryable());

        let session_id = registry.active_session_id().await.unwrap();
        assert_eq!(tracker.failure_count(&session_id), 1);

        // The user message and the partial reply survived the failure.
        let session = registry.get(&session_id).await.unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[1].content.text(), "partial");
        assert!(!session.messages[1].streaming);
    }

    #[tokio::test]
    async fn test_backend_error_event_is_surfaced_not_fatal() {
        let backend = Arc::new(ScriptedBackend::with_chunks(vec![
            event_line(r#"{"type":"error","error":"model overloaded"}"#),
            event_line(r#"{"type":"done"}"#),
        ]));
        let (_registry, _tracker, chat) = chat_over(backend);

        let outcome = chat.send_message("hello").await.unwrap();
        assert_eq!(outcome.error.as_deref(), Some("model overloaded"));
        assert!(!outcome.interrupted);
    }

    #[tokio::test]
    async fn test_resume_session_enters_real_state_directly() {
        let real_id = SessionId::parse(REAL_ID).unwrap();
        let mut backend = ScriptedBackend::with_chunks(Vec::new());
        backend.history = Some(SessionHistoryResponse {
            session_id: REAL_ID.to_string(),
            total_messages: 1,
            messages: vec![HistoryMessage {
                role: "user".to_string(),
                content: rill_core::session::MessageContent::Plain("earlier".to_string()),
                timestamp: "2026-01-01T10:00:00Z".to_string(),
                input_tokens: None,
                output_tokens: None,
                cost: None,
                tools: Vec::new(),
            }],
        });
        let (registry, _tracker, chat) = chat_over(Arc::new(backend));

        chat.resume_session(&real_id).await.unwrap();

        assert_eq!(registry.active_session_id().await, Some(real_id.clone()));
        assert_eq!(chat.conversation_state(), ConversationState::Real {
            id: real_id.clone()
        });
        let session = registry.get(&real_id).await.unwrap();
        assert_eq!(session.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_rolls_back_when_backend_fails() {
        let real_id = SessionId::parse(REAL_ID).unwrap();
        let mut backend = ScriptedBackend::with_chunks(Vec::new());
        backend.fail_deletes = true;
        let (registry, _tracker, chat) = chat_over(Arc::new(backend));

        registry
            .insert_session(Session::new(real_id.clone(), SessionConfig::default()))
            .await;

        let err = chat.delete_session(&real_id).await.unwrap_err();
        assert!(matches!(err, RillError::Transport { .. }));
        // The optimistic local delete was rolled back.
        assert!(registry.get(&real_id).await.is_some());
    }

    #[tokio::test]
    async fn test_delete_placeholder_skips_backend() {
        let backend = Arc::new(ScriptedBackend::with_chunks(Vec::new()));
        let (registry, _tracker, chat) = chat_over(backend);

        let id = registry.create_session(SessionConfig::default()).await;
        chat.delete_session(&id).await.unwrap();
        assert!(registry.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_replace_session_resets_lifecycle() {
        let backend = Arc::new(ScriptedBackend::with_chunks(Vec::new()));
        let (registry, _tracker, chat) = chat_over(backend);

        let id = registry.create_session(SessionConfig::default()).await;
        let replacement = chat.replace_session(&id).await.unwrap();

        assert_ne!(replacement, id);
        assert!(registry.get(&id).await.is_none());
        assert_eq!(chat.conversation_state(), ConversationState::Placeholder {
            id: replacement
        });
    }
}
