use persona_chat::game::{parse_agent_step, AgentAction, Board, GreedyStrategy, Mark, MoveStrategy, RoundState};
use persona_chat::memory::Exchange;
use persona_chat::memory_db::SummaryBufferStore;
use proptest::prelude::*;
use tempfile::TempDir;

proptest! {
    #[test]
    fn fullness_tracks_window_length(buffer_size in 1usize..8, appended in 0usize..12) {
        let dir = TempDir::new().unwrap();
        let store = SummaryBufferStore::new(dir.path(), buffer_size).unwrap();
        store.ensure_record_exists("Goku").unwrap();

        let exchanges: Vec<Exchange> = (0..appended).map(|i| Exchange::user(format!("line {}", i))).collect();
        store.append_to_window("Goku", &exchanges).unwrap();

        prop_assert_eq!(store.refresh_fullness("Goku").unwrap(), appended >= buffer_size);
        prop_assert_eq!(store.summary_pending("Goku"), appended >= buffer_size);
    }

    #[test]
    fn parser_never_panics(reply in ".{0,200}") {
        if let Ok(step) = parse_agent_step(&reply) {
            if let AgentAction::RespondToUser(text) = step.action {
                prop_assert!(!text.is_empty());
            }
        }
    }

    #[test]
    fn greedy_strategy_always_picks_a_free_cell(moves in proptest::collection::vec(0usize..9, 0..9)) {
        let mut board = Board::new();
        let mut mark = Mark::X;
        for cell in moves {
            if board.state() != RoundState::InProgress {
                break;
            }
            if board.place(cell, mark).is_ok() {
                mark = mark.opponent();
            }
        }

        match board.state() {
            RoundState::InProgress => {
                let choice = GreedyStrategy.choose_move(&board, mark);
                prop_assert!(choice.map_or(false, |c| board.available_moves().contains(&c)));
            }
            RoundState::Draw => prop_assert!(board.is_full()),
            RoundState::Won(_) => prop_assert!(board.winner().is_some()),
        }
    }
}
