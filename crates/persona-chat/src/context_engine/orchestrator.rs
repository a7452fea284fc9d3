//! Per-turn coordination of short-term and long-term memory
//!
//! A turn reads the running summary and the window, pulls related lines from the
//! vector store once a summary exists, and after the reply writes the exchange
//! to the vector store first and the summary buffer second. Neither write is
//! rolled back if the other fails; the vector store is the source of truth and
//! the buffer can be rebuilt from it.

use crate::characters::{Character, CharacterCatalog};
use crate::config::Config;
use crate::context_engine::context_builder::ContextBuilder;
use crate::error::{GameError, MemoryError, MemoryResult};
use crate::game::{parse_agent_step, AgentAction, AgentTurn, GameSession, GreedyStrategy, RoundState, StepEffect};
use crate::memory::{Exchange, Role};
use crate::memory_db::{BufferRecord, Collection, MemoryDatabase, NO_SUMMARY_SENTINEL};
use crate::model_runtime::ChatModel;
use crate::utils::format_messages::tag_many;
use crate::utils::TextUtils;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub user_name: String,
    pub num_query_results: usize,
    pub max_game_steps: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            user_name: "Halil".to_string(),
            num_query_results: 2,
            max_game_steps: 4,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            user_name: config.user_name.clone(),
            num_query_results: config.num_query_results,
            max_game_steps: config.max_game_steps.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    VectorStore,
    SummaryBuffer,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreKind::VectorStore => "long-term vector store",
            StoreKind::SummaryBuffer => "short-term summary buffer",
        })
    }
}

/// The reply was produced but memory could not be fully updated
#[derive(Debug)]
pub struct PersistenceLag {
    pub failed_store: StoreKind,
    pub error: MemoryError,
}

impl fmt::Display for PersistenceLag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} was not updated: {}", self.failed_store, self.error)
    }
}

#[derive(Debug)]
pub struct TurnOutcome {
    pub response: String,
    pub persistence_lag: Option<PersistenceLag>,
}

impl TurnOutcome {
    pub fn is_persisted(&self) -> bool {
        self.persistence_lag.is_none()
    }
}

/// The active persona: prompt builder, vector collection and game state
pub struct CharacterSession {
    builder: ContextBuilder,
    collection: Collection,
    is_new_chat: bool,
    game: Option<GameSession>,
}

impl CharacterSession {
    pub fn name(&self) -> &str {
        &self.builder.character().name
    }

    pub fn character(&self) -> &Character {
        self.builder.character()
    }

    pub fn builder(&self) -> &ContextBuilder {
        &self.builder
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// No exchange has been stored yet; the next reply becomes the greeting
    pub fn is_new_chat(&self) -> bool {
        self.is_new_chat
    }

    pub fn game(&self) -> Option<&GameSession> {
        self.game.as_ref()
    }
}

pub struct MemoryOrchestrator {
    memory: Arc<MemoryDatabase>,
    model: Arc<dyn ChatModel>,
    catalog: Arc<CharacterCatalog>,
    config: OrchestratorConfig,
    turn_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MemoryOrchestrator {
    pub fn new(
        memory: Arc<MemoryDatabase>,
        model: Arc<dyn ChatModel>,
        catalog: Arc<CharacterCatalog>,
        config: OrchestratorConfig,
    ) -> Self {
        info!(
            "Memory orchestrator initialized ({} backend, {} related lines per turn)",
            model.backend(),
            config.num_query_results
        );
        Self {
            memory,
            model,
            catalog,
            config,
            turn_locks: DashMap::new(),
        }
    }

    pub fn memory(&self) -> &Arc<MemoryDatabase> {
        &self.memory
    }

    pub fn catalog(&self) -> &CharacterCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Look up the persona and make sure both of its stores exist
    pub fn open_session(&self, character_name: &str) -> MemoryResult<CharacterSession> {
        let character = self.catalog.get(character_name)?;
        let buffers = &self.memory.buffers;

        buffers.ensure_record_exists(&character.name)?;
        buffers.refresh_fullness(&character.name)?;
        let is_new_chat = buffers.is_empty(&character.name)?;
        let collection = self.memory.vectors.select_session(&character.name)?;

        info!(
            "Opened session for {} ({})",
            character.name,
            if is_new_chat { "new chat" } else { "resuming" }
        );
        Ok(CharacterSession {
            builder: ContextBuilder::new(character, self.config.user_name.clone()),
            collection,
            is_new_chat,
            game: None,
        })
    }

    fn turn_lock(&self, character_name: &str) -> Arc<Mutex<()>> {
        self.turn_locks
            .entry(TextUtils::sanitize_name(character_name))
            .or_default()
            .clone()
    }

    pub async fn compose_prompt(&self, session: &CharacterSession, user_message: &str) -> MemoryResult<Vec<Exchange>> {
        let lock = self.turn_lock(session.name());
        let _guard = lock.lock().await;
        self.compose_prompt_locked(session, user_message).await
    }

    async fn compose_prompt_locked(&self, session: &CharacterSession, user_message: &str) -> MemoryResult<Vec<Exchange>> {
        let record = self.memory.buffers.record(session.name())?;

        if record.summary.is_empty() {
            debug!("No summary yet for {}, prompting with the raw window", session.name());
            return Ok(session.builder.chat_prompt(None, &record.window, user_message));
        }

        let related: Vec<String> = self
            .memory
            .vectors
            .query(&session.collection, user_message, self.config.num_query_results)
            .await?
            .into_iter()
            .map(|hit| hit.document)
            .collect();
        debug!("Retrieved {} related lines for {}", related.len(), session.name());

        Ok(session
            .builder
            .chat_prompt(Some((&record.summary, &related)), &record.window, user_message))
    }

    pub async fn record_turn(
        &self,
        session: &mut CharacterSession,
        user_message: &str,
        response: &str,
    ) -> Result<(), PersistenceLag> {
        let lock = self.turn_lock(session.name());
        let _guard = lock.lock().await;
        self.record_turn_locked(session, user_message, response).await
    }

    async fn record_turn_locked(
        &self,
        session: &mut CharacterSession,
        user_message: &str,
        response: &str,
    ) -> Result<(), PersistenceLag> {
        if session.is_new_chat {
            return self.record_greeting(session, response).await;
        }

        let name = session.name().to_string();
        let vector_lag = |error: MemoryError| {
            error!(
                "Vector store update failed for {}: {}; summary buffer left unchanged",
                name, error
            );
            PersistenceLag {
                failed_store: StoreKind::VectorStore,
                error,
            }
        };
        let buffer_lag = |error: MemoryError| {
            error!(
                "Summary buffer update failed for {}: {}; vector store is ahead of the buffer",
                name, error
            );
            PersistenceLag {
                failed_store: StoreKind::SummaryBuffer,
                error,
            }
        };

        let new_lines = tag_many(&[Role::User, Role::Assistant], &[user_message, response]).map_err(vector_lag)?;

        self.memory
            .vectors
            .index_exchanges(&session.collection, &new_lines, &name, session.builder.user_name())
            .await
            .map_err(vector_lag)?;

        let buffers = &self.memory.buffers;
        let pending = buffers.refresh_fullness(&name).map_err(buffer_lag)?;
        if !pending {
            buffers.append_to_window(&name, &new_lines).map_err(buffer_lag)?;
        } else {
            let current_summary = buffers.load_summary(&name).map_err(buffer_lag)?;
            let window = buffers.load_window(&name).map_err(buffer_lag)?;
            info!("Summarizing {} buffered exchanges for {}", window.len(), name);

            let prompt = session.builder.summarizer_prompt(&current_summary, &window);
            let new_summary = self
                .model
                .generate(&prompt)
                .await
                .map_err(|e| buffer_lag(MemoryError::Backend(e)))?;

            buffers
                .fold_into_summary(&name, &new_summary, &new_lines)
                .map_err(buffer_lag)?;
        }
        buffers.refresh_fullness(&name).map_err(buffer_lag)?;
        Ok(())
    }

    async fn record_greeting(&self, session: &mut CharacterSession, response: &str) -> Result<(), PersistenceLag> {
        let name = session.name().to_string();
        let greeting = Exchange::assistant(response);

        if let Err(error) = self
            .memory
            .vectors
            .index_greeting(&session.collection, &greeting, &name)
            .await
        {
            error!("Failed to index greeting for {}: {}", name, error);
            return Err(PersistenceLag {
                failed_store: StoreKind::VectorStore,
                error,
            });
        }

        let buffers = &self.memory.buffers;
        if let Err(error) = buffers
            .save_initial_greeting(&name, &greeting)
            .and_then(|_| buffers.refresh_fullness(&name))
        {
            error!("Failed to store greeting for {}: {}; vector store is ahead of the buffer", name, error);
            return Err(PersistenceLag {
                failed_store: StoreKind::SummaryBuffer,
                error,
            });
        }

        session.is_new_chat = false;
        debug!("Stored greeting for {}", name);
        Ok(())
    }

    async fn infer(&self, prompt: &[Exchange], cancel: &CancellationToken) -> MemoryResult<String> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Inference cancelled");
                Err(MemoryError::Cancelled)
            }
            result = self.model.generate(prompt) => result.map_err(MemoryError::Backend),
        }
    }

    /// Opening line of a conversation. For a chat that already has history the
    /// latest persona line is returned without calling the model.
    pub async fn greet(&self, session: &mut CharacterSession, cancel: &CancellationToken) -> MemoryResult<TurnOutcome> {
        let lock = self.turn_lock(session.name());
        let _guard = lock.lock().await;

        if !session.is_new_chat {
            return Ok(TurnOutcome {
                response: self.latest_persona_line(session)?,
                persistence_lag: None,
            });
        }

        let response = self.infer(&session.builder.greeting_prompt(), cancel).await?;
        let persistence_lag = self.record_turn_locked(session, "", &response).await.err();
        Ok(TurnOutcome {
            response,
            persistence_lag,
        })
    }

    /// Newest persona line from the window, else from the vector store. Empty
    /// only if the persona never spoke.
    fn latest_persona_line(&self, session: &CharacterSession) -> MemoryResult<String> {
        let window = self.memory.buffers.load_window(session.name())?;
        if let Some(line) = window.iter().rev().find(|e| e.role == Role::Assistant) {
            return Ok(line.content.clone());
        }
        Ok(self
            .memory
            .vectors
            .entries(&session.collection)?
            .iter()
            .rev()
            .map(|doc| Self::parse_document(session, doc))
            .find(|e| e.role == Role::Assistant)
            .map(|e| e.content)
            .unwrap_or_default())
    }

    /// Compose, infer, record. Cancellation before the reply arrives skips the
    /// memory update entirely.
    pub async fn respond(
        &self,
        session: &mut CharacterSession,
        user_message: &str,
        cancel: &CancellationToken,
    ) -> MemoryResult<TurnOutcome> {
        let lock = self.turn_lock(session.name());
        let _guard = lock.lock().await;

        let prompt = self.compose_prompt_locked(session, user_message).await?;
        let response = self.infer(&prompt, cancel).await?;
        let persistence_lag = self.record_turn_locked(session, user_message, &response).await.err();

        Ok(TurnOutcome {
            response,
            persistence_lag,
        })
    }

    pub async fn reset_conversation(&self, session: &mut CharacterSession) -> MemoryResult<()> {
        let lock = self.turn_lock(session.name());
        let _guard = lock.lock().await;

        self.memory.vectors.reset_collection(&session.collection)?;
        self.memory.buffers.reset_session(session.name())?;
        self.memory.buffers.refresh_fullness(session.name())?;
        session.is_new_chat = true;
        session.game = None;
        info!("Conversation with {} reset", session.name());
        Ok(())
    }

    pub fn transcript(&self, session: &CharacterSession) -> MemoryResult<String> {
        self.memory.vectors.full_history(&session.collection)
    }

    /// Map a stored `"speaker: content"` line back to an exchange
    fn parse_document(session: &CharacterSession, document: &str) -> Exchange {
        match document.split_once(": ") {
            Some((speaker, content)) if speaker == session.name() => Exchange::assistant(content),
            Some((speaker, content)) if speaker == session.builder.user_name() => Exchange::user(content),
            _ => Exchange::user(document),
        }
    }

    /// Re-derive the buffer from the full vector-store history. The newest
    /// `buffer_size` lines become the window; anything older is summarized so
    /// the summary stays non-empty once the conversation has outgrown the window.
    pub async fn rebuild_short_term_from_long_term(&self, session: &mut CharacterSession) -> MemoryResult<BufferRecord> {
        let lock = self.turn_lock(session.name());
        let _guard = lock.lock().await;

        let limit = self.memory.buffers.buffer_size();
        let history: Vec<Exchange> = self
            .memory
            .vectors
            .entries(&session.collection)?
            .iter()
            .map(|doc| Self::parse_document(session, doc))
            .collect();
        let split = history.len().saturating_sub(limit);
        let (older, window) = history.split_at(split);

        let summary = if older.is_empty() {
            String::new()
        } else {
            info!("Summarizing {} older lines while rebuilding {}", older.len(), session.name());
            let prompt = session.builder.summarizer_prompt(NO_SUMMARY_SENTINEL, older);
            self.model.generate(&prompt).await.map_err(MemoryError::Backend)?
        };

        let record = BufferRecord {
            summary,
            window: window.to_vec(),
        };
        let persona = session.name().to_string();
        self.memory.buffers.replace_record(&persona, &record)?;
        self.memory.buffers.refresh_fullness(&persona)?;
        session.is_new_chat = history.is_empty();

        warn!(
            "Rebuilt short-term memory for {} from {} vector store entries ({} summarized)",
            persona,
            history.len(),
            older.len()
        );
        Ok(record)
    }

    /// Start (or restart) a game; the persona moves first
    pub async fn start_game(&self, session: &mut CharacterSession, cancel: &CancellationToken) -> MemoryResult<AgentTurn> {
        match session.game.as_mut() {
            Some(game) => game.restart(),
            None => session.game = Some(GameSession::new(Box::new(GreedyStrategy))),
        }
        info!("{} started a game of Tic-Tac-Toe", session.name());
        self.agent_game_turn(session, cancel).await
    }

    /// New round of a running game; win counters carry over
    pub async fn restart_game(&self, session: &mut CharacterSession, cancel: &CancellationToken) -> MemoryResult<AgentTurn> {
        let game = session.game.as_mut().ok_or(GameError::NoActiveGame)?;
        game.restart();
        debug!("Restarted round ({} / {})", game.ai_wins(), game.user_wins());
        self.agent_game_turn(session, cancel).await
    }

    /// Apply the user's move; if the round goes on, the persona answers with its own
    pub async fn user_game_move(
        &self,
        session: &mut CharacterSession,
        cell: usize,
        cancel: &CancellationToken,
    ) -> MemoryResult<(RoundState, Option<AgentTurn>)> {
        let game = session.game.as_mut().ok_or(GameError::NoActiveGame)?;
        let state = game.user_move(cell)?;
        if state != RoundState::InProgress {
            return Ok((state, None));
        }
        let turn = self.agent_game_turn(session, cancel).await?;
        let state = session.game.as_ref().map_or(RoundState::InProgress, |g| g.state());
        Ok((state, Some(turn)))
    }

    async fn agent_game_turn(&self, session: &mut CharacterSession, cancel: &CancellationToken) -> MemoryResult<AgentTurn> {
        let current_summary = self.memory.buffers.load_summary(session.name())?;
        let user_name = self.config.user_name.clone();
        let CharacterSession { builder, game, .. } = session;
        let game = game.as_mut().ok_or(GameError::NoActiveGame)?;

        game.begin_agent_turn();
        let mut turn = AgentTurn::default();

        for step_number in 0..self.config.max_game_steps {
            let prompt_text = if game.is_first_session() {
                builder.game_start_prompt(&current_summary, game.action_log())
            } else {
                builder.game_continue_prompt(&current_summary, game.ai_wins(), game.user_wins(), game.action_log())
            };
            let reply = self.infer(&[Exchange::system(prompt_text)], cancel).await?;

            let step = match parse_agent_step(&reply) {
                Ok(step) => step,
                Err(e) => {
                    warn!("Unusable agent step {}: {}", step_number, e);
                    game.log_observation(&format!(
                        "{}. The action must be one of [{}].",
                        e,
                        AgentAction::NAMES.join(", ")
                    ));
                    continue;
                }
            };

            match game.apply_step(&step, &user_name)? {
                StepEffect::Moved { cell, state } => {
                    debug!("Agent moved to {} ({:?})", cell, state);
                    turn.agent_move = Some(cell);
                    return Ok(turn);
                }
                StepEffect::BoardChecked(status) => debug!("Agent checked the board: {}", status),
                StepEffect::Replied(text) => turn.replies.push(text),
            }
        }

        warn!("Agent used all {} steps without moving, forcing a move", self.config.max_game_steps);
        let (cell, _) = game.force_move(&user_name)?;
        turn.agent_move = Some(cell);
        turn.forced = true;
        Ok(turn)
    }

    /// End the game: the persona reacts to the results and the exchange is stored
    /// like a normal turn.
    pub async fn quit_game(&self, session: &mut CharacterSession, cancel: &CancellationToken) -> MemoryResult<TurnOutcome> {
        let lock = self.turn_lock(session.name());
        let _guard = lock.lock().await;

        let (ai_wins, user_wins) = session
            .game
            .as_ref()
            .map(|g| (g.ai_wins(), g.user_wins()))
            .ok_or(GameError::NoActiveGame)?;

        let current_summary = self.memory.buffers.load_summary(session.name())?;
        let prompt = session.builder.game_quit_prompt(&current_summary, ai_wins, user_wins);
        let response = self.infer(&[Exchange::system(prompt)], cancel).await?;

        session.game = None;
        let user_message = session.builder.game_quit_user_message(ai_wins, user_wins);
        let persistence_lag = self.record_turn_locked(session, &user_message, &response).await.err();
        info!("Game ended for {} (persona {} / user {})", session.name(), ai_wins, user_wins);

        Ok(TurnOutcome {
            response,
            persistence_lag,
        })
    }
}
