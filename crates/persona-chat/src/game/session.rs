//! Game session bookkeeping: board, win counters and the agent's action log

use super::action::{AgentAction, AgentStep};
use super::board::{Board, MoveStrategy, RoundState, AGENT_MARK, USER_MARK};
use crate::error::GameError;
use tracing::debug;

pub const GAME_NAME: &str = "Tic-Tac-Toe";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEffect {
    Moved { cell: usize, state: RoundState },
    BoardChecked(&'static str),
    Replied(String),
}

/// Everything the agent did during one of its turns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentTurn {
    pub replies: Vec<String>,
    pub agent_move: Option<usize>,
    /// The step budget ran out and the strategy moved on the agent's behalf
    pub forced: bool,
}

pub struct GameSession {
    board: Board,
    strategy: Box<dyn MoveStrategy>,
    ai_wins: u32,
    user_wins: u32,
    action_log: String,
    first_session: bool,
    board_checked: bool,
}

impl GameSession {
    pub fn new(strategy: Box<dyn MoveStrategy>) -> Self {
        Self {
            board: Board::new(),
            strategy,
            ai_wins: 0,
            user_wins: 0,
            action_log: String::new(),
            first_session: true,
            board_checked: false,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn state(&self) -> RoundState {
        self.board.state()
    }

    pub fn ai_wins(&self) -> u32 {
        self.ai_wins
    }

    pub fn user_wins(&self) -> u32 {
        self.user_wins
    }

    pub fn action_log(&self) -> &str {
        &self.action_log
    }

    /// True until the first round is restarted
    pub fn is_first_session(&self) -> bool {
        self.first_session
    }

    pub fn user_move(&mut self, cell: usize) -> Result<RoundState, GameError> {
        let state = self.board.place(cell, USER_MARK)?;
        if state == RoundState::Won(USER_MARK) {
            self.user_wins += 1;
        }
        debug!("User played cell {} -> {:?}", cell, state);
        Ok(state)
    }

    /// Play the strategy's move for the agent
    pub fn agent_move(&mut self) -> Result<(usize, RoundState), GameError> {
        if self.board.state() != RoundState::InProgress {
            return Err(GameError::GameOver);
        }
        let cell = self
            .strategy
            .choose_move(&self.board, AGENT_MARK)
            .ok_or(GameError::GameOver)?;
        let state = self.board.place(cell, AGENT_MARK)?;
        if state == RoundState::Won(AGENT_MARK) {
            self.ai_wins += 1;
        }
        debug!("Agent played cell {} -> {:?}", cell, state);
        Ok((cell, state))
    }

    /// Start of an agent turn: a board check is allowed once per turn
    pub fn begin_agent_turn(&mut self) {
        self.board_checked = false;
    }

    pub fn apply_step(&mut self, step: &AgentStep, user_name: &str) -> Result<StepEffect, GameError> {
        match &step.action {
            AgentAction::CheckBoard if !self.board_checked => {
                let status = self.board.analyze().describe();
                self.action_log
                    .push_str(&format!("{}\nBoard status: {}\n", step.transcript, status));
                self.board_checked = true;
                Ok(StepEffect::BoardChecked(status))
            }
            // A second check in the same turn becomes a move
            AgentAction::MakeMove | AgentAction::CheckBoard => {
                let (cell, state) = self.agent_move()?;
                self.log_move(&step.transcript, user_name);
                Ok(StepEffect::Moved { cell, state })
            }
            AgentAction::RespondToUser(text) => {
                self.action_log.push_str(&format!("\n{}\n", step.transcript));
                Ok(StepEffect::Replied(text.clone()))
            }
        }
    }

    /// Move on the agent's behalf when it failed to pick a usable action
    pub fn force_move(&mut self, user_name: &str) -> Result<(usize, RoundState), GameError> {
        let result = self.agent_move()?;
        self.log_move("Thought: I took too long to decide.\nAction: Make move", user_name);
        Ok(result)
    }

    pub fn log_observation(&mut self, note: &str) {
        self.action_log.push_str(&format!("\nObservation: {}\n", note));
    }

    /// New round; counters are kept
    pub fn restart(&mut self) {
        self.board = Board::new();
        self.action_log.clear();
        self.first_session = false;
        self.board_checked = false;
    }

    fn log_move(&mut self, transcript: &str, user_name: &str) {
        self.action_log.push_str(&format!(
            "{}\nResult of move: You made a move and then {} made their move.\n",
            transcript, user_name
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::action::parse_agent_step;
    use crate::game::board::GreedyStrategy;

    fn session() -> GameSession {
        GameSession::new(Box::new(GreedyStrategy))
    }

    #[test]
    fn test_make_move_logs_result() {
        let mut game = session();
        game.begin_agent_turn();
        let step = parse_agent_step("Thought: centre\nAction: Make move").unwrap();

        let effect = game.apply_step(&step, "Halil").unwrap();
        assert_eq!(effect, StepEffect::Moved { cell: 4, state: RoundState::InProgress });
        assert!(game
            .action_log()
            .ends_with("Result of move: You made a move and then Halil made their move.\n"));
    }

    #[test]
    fn test_second_check_becomes_a_move() {
        let mut game = session();
        game.begin_agent_turn();
        let step = parse_agent_step("Thought: look\nAction: Check board").unwrap();

        assert_eq!(
            game.apply_step(&step, "Halil").unwrap(),
            StepEffect::BoardChecked("Neither you nor the user has an immediate win available.")
        );
        assert!(matches!(game.apply_step(&step, "Halil").unwrap(), StepEffect::Moved { cell: 4, .. }));
    }

    #[test]
    fn test_respond_keeps_turn_open() {
        let mut game = session();
        game.begin_agent_turn();
        let step = parse_agent_step("Thought: taunt\nAction: Respond to user\nAction Input: Ready?").unwrap();
        assert_eq!(game.apply_step(&step, "Halil").unwrap(), StepEffect::Replied("Ready?".into()));
        assert!(game.board().available_moves().len() == 9);
    }

    #[test]
    fn test_win_counters_survive_restart() {
        let mut game = session();
        for cell in [0, 3, 1, 4] {
            assert_eq!(game.user_move(cell).unwrap(), RoundState::InProgress);
        }
        game.user_move(2).unwrap();
        assert_eq!(game.state(), RoundState::Won(USER_MARK));
        assert_eq!(game.user_wins(), 1);
        assert_eq!(game.agent_move(), Err(GameError::GameOver));

        game.restart();
        assert!(!game.is_first_session());
        assert_eq!(game.state(), RoundState::InProgress);
        assert_eq!(game.user_wins(), 1);
        assert!(game.action_log().is_empty());
    }

    #[test]
    fn test_agent_win_is_counted() {
        let mut game = session();
        assert_eq!(game.agent_move().unwrap().0, 4);
        game.user_move(0).unwrap();
        assert_eq!(game.agent_move().unwrap().0, 2);
        game.user_move(6).unwrap();
        // Blocks the left column
        let (cell, state) = game.agent_move().unwrap();
        assert_eq!(cell, 3);
        assert_eq!(state, RoundState::InProgress);
        game.user_move(7).unwrap();
        let (_, state) = game.agent_move().unwrap();
        assert_eq!(state, RoundState::Won(AGENT_MARK));
        assert_eq!(game.ai_wins(), 1);
    }
}
