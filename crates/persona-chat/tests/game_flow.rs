mod common;

use common::{orchestrator, ScriptedModel};
use persona_chat::game::{RoundState, AGENT_MARK};
use persona_chat::memory::Exchange;
use persona_chat::worker_threads::ConversationWorker;
use persona_chat::{GameError, MemoryError};
use tempfile::TempDir;

const MOVE: &str = "Thought: I'll take the best spot.\nAction: Make move\nAction Input: ";
const CHECK: &str = "Thought: Let me look at the board first.\nAction: Check board\nAction Input: ";

#[tokio::test]
async fn test_full_round_and_quit() {
    let dir = TempDir::new().unwrap();
    let model = ScriptedModel::new(&[
        "Yo! Ready to train?",
        // agent opens in the centre
        MOVE,
        // user 0, agent checks then moves to 2
        CHECK,
        MOVE,
        // user 6, agent must block 3
        "Thought: Halil is close!\nAction: Respond to user\nAction Input: Not so fast!",
        MOVE,
        // user 7, agent completes the middle row with 5
        MOVE,
        "That was a great match, Halil!",
    ]);
    let orch = orchestrator(&dir, 10, model.clone());
    let (handle, _task) = ConversationWorker::spawn(orch.clone(), "Goku", None).unwrap();
    handle.greet().await.unwrap();

    let update = handle.start_game().await.unwrap();
    assert_eq!(update.agent_turn.as_ref().unwrap().agent_move, Some(4));
    assert_eq!(update.state, RoundState::InProgress);

    let update = handle.user_move(0).await.unwrap();
    assert_eq!(update.agent_turn.as_ref().unwrap().agent_move, Some(2));

    let update = handle.user_move(6).await.unwrap();
    let turn = update.agent_turn.unwrap();
    assert_eq!(turn.replies, vec!["Not so fast!".to_string()]);
    assert_eq!(turn.agent_move, Some(3));

    let update = handle.user_move(7).await.unwrap();
    assert_eq!(update.state, RoundState::Won(AGENT_MARK));
    assert_eq!((update.ai_wins, update.user_wins), (1, 0));

    // The board check shows up in the prompt of the following step
    let prompts = model.prompts();
    assert!(prompts[3][0].content.contains("Board status: "));
    assert!(prompts[3][0].content.contains("Thought: Let me look at the board first."));

    let reply = handle.quit_game().await.unwrap();
    assert_eq!(reply.outcome.response, "That was a great match, Halil!");
    let quit_prompt = &model.prompts()[7][0].content;
    assert!(quit_prompt.contains("You won 1 times.\nThe user won 0 times."));

    let window = orch.memory().buffers.load_window("Goku").unwrap();
    assert_eq!(
        &window[1..],
        &[
            Exchange::user("We just finished our Tic-Tac-Toe game session. I won 0 times and you won 1 time."),
            Exchange::assistant("That was a great match, Halil!"),
        ]
    );

    let err = handle.user_move(1).await.unwrap_err();
    assert!(matches!(err, MemoryError::Game(GameError::NoActiveGame)));
}

#[tokio::test]
async fn test_forced_moves_illegal_move_and_restart() {
    let dir = TempDir::new().unwrap();
    // The agent's answers are wasted words; every turn is forced after four steps
    let babble: Vec<&str> = std::iter::repeat("I am not sure what to do").take(40).collect();
    let orch = orchestrator(&dir, 10, ScriptedModel::new(&babble));
    let (handle, _task) = ConversationWorker::spawn(orch, "Goku", None).unwrap();

    let update = handle.start_game().await.unwrap();
    assert!(update.agent_turn.unwrap().forced);

    // Nothing to win or block, so the agent takes the next corner
    let update = handle.user_move(0).await.unwrap();
    assert_eq!(update.agent_turn.unwrap().agent_move, Some(2));
    let err = handle.user_move(2).await.unwrap_err();
    assert!(matches!(err, MemoryError::Game(GameError::IllegalMove(2))));

    let update = handle.restart_game().await.unwrap();
    assert_eq!(update.agent_turn.as_ref().unwrap().agent_move, Some(4));
    assert_eq!((update.ai_wins, update.user_wins), (0, 0));
    assert_eq!(update.board.matches('O').count(), 1);
    assert_eq!(update.board.matches('X').count(), 0);
}
