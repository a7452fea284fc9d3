//! Conversation worker task
//!
//! Owns the orchestrator and the active character session. Commands arrive over
//! an unbounded channel and are handled one at a time, so at most one inference
//! is in flight per session. Replies go back over oneshot channels.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context_engine::{CharacterSession, MemoryOrchestrator, TurnOutcome};
use crate::error::{GameError, MemoryError, MemoryResult};
use crate::game::{AgentTurn, RoundState};
use crate::memory_db::{BufferRecord, VectorStoreStats};
use crate::model_runtime::{Emotion, SentimentClassifier};
use crate::utils::TextUtils;

/// A persona reply plus the emotion detected in it, when a classifier is set
#[derive(Debug)]
pub struct ChatReply {
    pub outcome: TurnOutcome,
    pub emotion: Option<Emotion>,
}

/// Board snapshot after a game command
#[derive(Debug, Clone)]
pub struct GameUpdate {
    pub state: RoundState,
    pub agent_turn: Option<AgentTurn>,
    pub board: String,
    pub ai_wins: u32,
    pub user_wins: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub character: String,
    pub window_len: usize,
    pub has_summary: bool,
    pub summary_pending: bool,
    pub long_term_entries: i64,
    pub vector_store: VectorStoreStats,
}

type Reply<T> = oneshot::Sender<MemoryResult<T>>;

pub enum ConversationCommand {
    SelectCharacter { name: String, reply: Reply<String> },
    Greet { cancel: CancellationToken, reply: Reply<ChatReply> },
    Respond { message: String, cancel: CancellationToken, reply: Reply<ChatReply> },
    Reset { reply: Reply<()> },
    Transcript { reply: Reply<String> },
    Rebuild { reply: Reply<BufferRecord> },
    StartGame { cancel: CancellationToken, reply: Reply<GameUpdate> },
    UserMove { cell: usize, cancel: CancellationToken, reply: Reply<GameUpdate> },
    RestartGame { cancel: CancellationToken, reply: Reply<GameUpdate> },
    QuitGame { cancel: CancellationToken, reply: Reply<ChatReply> },
    Stats { reply: Reply<SessionStats> },
    Shutdown,
}

pub struct ConversationWorker {
    orchestrator: Arc<MemoryOrchestrator>,
    classifier: Option<Arc<dyn SentimentClassifier>>,
    session: CharacterSession,
}

/// Cloneable front end of a running [`ConversationWorker`]. Each inferring
/// command carries its own token, created when the command is sent, so a
/// cancel reaches it even while it is still queued.
#[derive(Clone)]
pub struct ConversationHandle {
    sender: mpsc::UnboundedSender<ConversationCommand>,
    latest_cancel: Arc<Mutex<CancellationToken>>,
}

impl ConversationWorker {
    /// Open `character` and start the worker loop on the current runtime
    pub fn spawn(
        orchestrator: Arc<MemoryOrchestrator>,
        character: &str,
        classifier: Option<Arc<dyn SentimentClassifier>>,
    ) -> MemoryResult<(ConversationHandle, JoinHandle<()>)> {
        let session = orchestrator.open_session(character)?;
        let (sender, receiver) = mpsc::unbounded_channel();

        let worker = Self {
            orchestrator,
            classifier,
            session,
        };
        let task = tokio::spawn(worker.run(receiver));
        info!("Spawned conversation worker for {}", character);

        Ok((
            ConversationHandle {
                sender,
                latest_cancel: Arc::new(Mutex::new(CancellationToken::new())),
            },
            task,
        ))
    }

    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<ConversationCommand>) {
        while let Some(command) = receiver.recv().await {
            if matches!(command, ConversationCommand::Shutdown) {
                break;
            }
            self.handle_command(command).await;
        }
        info!("Conversation worker shutting down");
    }

    async fn handle_command(&mut self, command: ConversationCommand) {
        match command {
            ConversationCommand::SelectCharacter { name, reply } => {
                let result = self.orchestrator.open_session(&name).map(|session| {
                    self.session = session;
                    self.session.name().to_string()
                });
                send(reply, result);
            }
            ConversationCommand::Greet { cancel, reply } => {
                let result = self.orchestrator.greet(&mut self.session, &cancel).await;
                let result = self.with_emotion(result).await;
                send(reply, result);
            }
            ConversationCommand::Respond { message, cancel, reply } => {
                debug!(
                    "{} <- {}",
                    self.session.name(),
                    TextUtils::truncate_with_ellipsis(&message, 60)
                );
                let result = self.orchestrator.respond(&mut self.session, &message, &cancel).await;
                let result = self.with_emotion(result).await;
                send(reply, result);
            }
            ConversationCommand::Reset { reply } => {
                let result = self.orchestrator.reset_conversation(&mut self.session).await;
                send(reply, result);
            }
            ConversationCommand::Transcript { reply } => {
                send(reply, self.orchestrator.transcript(&self.session));
            }
            ConversationCommand::Rebuild { reply } => {
                let result = self
                    .orchestrator
                    .rebuild_short_term_from_long_term(&mut self.session)
                    .await;
                send(reply, result);
            }
            ConversationCommand::StartGame { cancel, reply } => {
                let result = self.orchestrator.start_game(&mut self.session, &cancel).await;
                let result = result.and_then(|turn| self.game_update(Some(turn)));
                send(reply, result);
            }
            ConversationCommand::UserMove { cell, cancel, reply } => {
                let result = self
                    .orchestrator
                    .user_game_move(&mut self.session, cell, &cancel)
                    .await;
                let result = result.and_then(|(_, turn)| self.game_update(turn));
                send(reply, result);
            }
            ConversationCommand::RestartGame { cancel, reply } => {
                let result = self.orchestrator.restart_game(&mut self.session, &cancel).await;
                let result = result.and_then(|turn| self.game_update(Some(turn)));
                send(reply, result);
            }
            ConversationCommand::QuitGame { cancel, reply } => {
                let result = self.orchestrator.quit_game(&mut self.session, &cancel).await;
                let result = self.with_emotion(result).await;
                send(reply, result);
            }
            ConversationCommand::Stats { reply } => {
                send(reply, self.stats());
            }
            ConversationCommand::Shutdown => {}
        }
    }

    async fn with_emotion(&self, result: MemoryResult<TurnOutcome>) -> MemoryResult<ChatReply> {
        let outcome = result?;
        if let Some(lag) = &outcome.persistence_lag {
            warn!("Turn with {} not fully persisted: {}", self.session.name(), lag);
        }

        let emotion = match &self.classifier {
            Some(classifier) if !outcome.response.is_empty() => match classifier.classify(&outcome.response).await {
                Ok(emotion) => Some(emotion),
                Err(e) => {
                    warn!("Sentiment classification failed: {}", e);
                    None
                }
            },
            _ => None,
        };
        Ok(ChatReply { outcome, emotion })
    }

    fn game_update(&self, agent_turn: Option<AgentTurn>) -> MemoryResult<GameUpdate> {
        let game = self.session.game().ok_or(GameError::NoActiveGame)?;
        Ok(GameUpdate {
            state: game.state(),
            agent_turn,
            board: game.board().render(),
            ai_wins: game.ai_wins(),
            user_wins: game.user_wins(),
        })
    }

    fn stats(&self) -> MemoryResult<SessionStats> {
        let name = self.session.name();
        let memory = self.orchestrator.memory();
        let record = memory.buffers.record(name)?;

        Ok(SessionStats {
            character: name.to_string(),
            window_len: record.window.len(),
            has_summary: !record.summary.is_empty(),
            summary_pending: memory.buffers.summary_pending(name),
            long_term_entries: memory.vectors.count(self.session.collection())?,
            vector_store: memory.vectors.stats()?,
        })
    }
}

fn send<T>(reply: Reply<T>, result: MemoryResult<T>) {
    if let Err(e) = &result {
        debug!("Conversation command failed: {}", e);
    }
    if reply.send(result).is_err() {
        error!("Conversation command caller went away before the reply");
    }
}

impl ConversationHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> ConversationCommand) -> MemoryResult<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .map_err(|_| MemoryError::WorkerStopped)?;
        rx.await.map_err(|_| MemoryError::WorkerStopped)?
    }

    /// Token for a command about to be sent; it becomes the one `cancel_current` hits
    fn next_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut latest = self.latest_cancel.lock().unwrap_or_else(|p| p.into_inner());
        *latest = token.clone();
        token
    }

    /// Cancel the most recently sent inferring command, queued or running. Its
    /// turn is not recorded.
    pub fn cancel_current(&self) {
        let token = self.latest_cancel.lock().unwrap_or_else(|p| p.into_inner());
        token.cancel();
    }

    pub async fn select_character(&self, name: &str) -> MemoryResult<String> {
        let name = name.to_string();
        self.request(|reply| ConversationCommand::SelectCharacter { name, reply }).await
    }

    pub async fn greet(&self) -> MemoryResult<ChatReply> {
        let cancel = self.next_token();
        self.request(|reply| ConversationCommand::Greet { cancel, reply }).await
    }

    pub async fn respond(&self, message: &str) -> MemoryResult<ChatReply> {
        let message = message.to_string();
        let cancel = self.next_token();
        self.request(|reply| ConversationCommand::Respond { message, cancel, reply }).await
    }

    pub async fn reset(&self) -> MemoryResult<()> {
        self.request(|reply| ConversationCommand::Reset { reply }).await
    }

    pub async fn transcript(&self) -> MemoryResult<String> {
        self.request(|reply| ConversationCommand::Transcript { reply }).await
    }

    pub async fn rebuild(&self) -> MemoryResult<BufferRecord> {
        self.request(|reply| ConversationCommand::Rebuild { reply }).await
    }

    pub async fn start_game(&self) -> MemoryResult<GameUpdate> {
        let cancel = self.next_token();
        self.request(|reply| ConversationCommand::StartGame { cancel, reply }).await
    }

    pub async fn user_move(&self, cell: usize) -> MemoryResult<GameUpdate> {
        let cancel = self.next_token();
        self.request(|reply| ConversationCommand::UserMove { cell, cancel, reply }).await
    }

    pub async fn restart_game(&self) -> MemoryResult<GameUpdate> {
        let cancel = self.next_token();
        self.request(|reply| ConversationCommand::RestartGame { cancel, reply }).await
    }

    pub async fn quit_game(&self) -> MemoryResult<ChatReply> {
        let cancel = self.next_token();
        self.request(|reply| ConversationCommand::QuitGame { cancel, reply }).await
    }

    pub async fn stats(&self) -> MemoryResult<SessionStats> {
        self.request(|reply| ConversationCommand::Stats { reply }).await
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(ConversationCommand::Shutdown);
    }
}
