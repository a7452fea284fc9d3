//! Tic-Tac-Toe played through the persona's agent loop
pub mod action;
pub mod board;
pub mod session;

pub use action::{parse_agent_step, AgentAction, AgentStep};
pub use board::{Board, BoardAnalysis, GreedyStrategy, Mark, MoveStrategy, RoundState, AGENT_MARK, USER_MARK};
pub use session::{AgentTurn, GameSession, StepEffect, GAME_NAME};
