// persona-chat/crates/persona-chat/src/main.rs

#[cfg(feature = "cli")]
mod cli {
    use std::future::Future;
    use std::path::PathBuf;

    use anyhow::Result;
    use clap::Parser;
    use persona_chat::{
        config::Config,
        error::MemoryResult,
        game::{RoundState, AGENT_MARK},
        shared_state::SharedState,
        telemetry,
        utils::TextUtils,
        worker_threads::{ChatReply, ConversationHandle, GameUpdate},
        MemoryError,
    };
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tracing::{error, info};

    const HELP: &str = "Commands:
  /reset          forget the whole conversation with the current character
  /history        print the full transcript
  /rebuild        rebuild short-term memory from long-term memory
  /switch NAME    talk to another character
  /play           start a game of Tic-Tac-Toe
  /move N         place your mark on cell N (0-8)
  /restart        start a new round
  /quit-game      stop playing and return to the conversation
  /stats          memory statistics
  /exit           leave
Press Ctrl-C while a reply is being generated to cancel it.";

    #[derive(Parser, Debug)]
    #[command(name = "persona-chat", about = "Chat with a fictional character that remembers you")]
    struct Args {
        /// Character to talk to (defaults to DEFAULT_CHARACTER or the first in the list)
        #[arg(short, long)]
        character: Option<String>,

        /// Your name as the character should address you
        #[arg(short, long, env = "USER_NAME")]
        user_name: Option<String>,

        /// Data directory holding both memory stores
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Label each reply with the emotion it expresses
        #[arg(long)]
        sentiment: bool,
    }

    pub async fn run() -> Result<()> {
        telemetry::init_tracing();
        let args = Args::parse();

        let mut cfg = Config::from_env()?;
        if let Some(user_name) = args.user_name {
            cfg.user_name = user_name;
        }
        if let Some(data_dir) = args.data_dir {
            cfg.data_dir = data_dir;
        }
        cfg.print_config();

        let state = SharedState::new(cfg)?;
        let character = state.initial_character(args.character.as_deref())?;
        let (handle, worker) = state.spawn_conversation(&character, args.sentiment)?;

        println!("Characters: {}", state.catalog.names().join(", "));
        println!("{}\n", HELP);

        let user_name = state.config.user_name.clone();
        let mut current = character;
        if let Ok(reply) = cancellable(&handle, handle.greet()).await.map_err(report) {
            print_reply(&current, &reply);
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            eprint!("{}> ", user_name);
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else { break };
            let input = TextUtils::normalize_whitespace(line.trim()).into_owned();
            if input.is_empty() {
                continue;
            }

            let (command, argument) = match input.split_once(' ') {
                Some((command, argument)) => (command, argument.trim()),
                None => (input.as_str(), ""),
            };

            match command {
                "/exit" => break,
                "/help" => println!("{}", HELP),
                "/reset" => {
                    if handle.reset().await.map_err(report).is_ok() {
                        println!("Conversation with {} reset.", current);
                        if let Ok(reply) = cancellable(&handle, handle.greet()).await.map_err(report) {
                            print_reply(&current, &reply);
                        }
                    }
                }
                "/history" => {
                    if let Ok(history) = handle.transcript().await.map_err(report) {
                        print!("{}", history);
                    }
                }
                "/rebuild" => {
                    if let Ok(record) = handle.rebuild().await.map_err(report) {
                        println!("Short-term memory rebuilt with {} exchanges.", record.window.len());
                    }
                }
                "/switch" => match handle.select_character(argument).await {
                    Ok(name) => {
                        current = name;
                        if let Ok(reply) = cancellable(&handle, handle.greet()).await.map_err(report) {
                            print_reply(&current, &reply);
                        }
                    }
                    Err(e) => report(e),
                },
                "/play" => {
                    if let Ok(update) = cancellable(&handle, handle.start_game()).await.map_err(report) {
                        print_game(&current, &update);
                    }
                }
                "/move" => match argument.parse::<usize>() {
                    Ok(cell) => {
                        if let Ok(update) = cancellable(&handle, handle.user_move(cell)).await.map_err(report) {
                            print_game(&current, &update);
                        }
                    }
                    Err(_) => println!("Usage: /move N (0-8)"),
                },
                "/restart" => {
                    if let Ok(update) = cancellable(&handle, handle.restart_game()).await.map_err(report) {
                        print_game(&current, &update);
                    }
                }
                "/quit-game" => {
                    if let Ok(reply) = cancellable(&handle, handle.quit_game()).await.map_err(report) {
                        print_reply(&current, &reply);
                    }
                }
                "/stats" => {
                    if let Ok(stats) = handle.stats().await.map_err(report) {
                        println!("{}", serde_json::to_string_pretty(&stats)?);
                    }
                }
                _ if command.starts_with('/') => println!("Unknown command. Type /help for the list."),
                _ => {
                    if let Ok(reply) = cancellable(&handle, handle.respond(&input)).await.map_err(report) {
                        print_reply(&current, &reply);
                    }
                }
            }
        }

        handle.shutdown();
        if let Err(e) = worker.await {
            error!("Conversation worker ended abnormally: {}", e);
        }
        info!("Goodbye");
        Ok(())
    }

    /// Await a worker request; Ctrl-C cancels the inference behind it
    async fn cancellable<T>(handle: &ConversationHandle, request: impl Future<Output = MemoryResult<T>>) -> MemoryResult<T> {
        tokio::pin!(request);
        tokio::select! {
            result = &mut request => result,
            _ = tokio::signal::ctrl_c() => {
                handle.cancel_current();
                request.await
            }
        }
    }

    fn report(e: MemoryError) {
        match e {
            MemoryError::Cancelled => println!("(cancelled, nothing was remembered)"),
            other => println!("Error: {}", other),
        }
    }

    fn print_reply(name: &str, reply: &ChatReply) {
        if reply.outcome.response.is_empty() {
            return;
        }
        match reply.emotion {
            Some(emotion) => println!("{} [{}]: {}", name, emotion, reply.outcome.response),
            None => println!("{}: {}", name, reply.outcome.response),
        }
        if let Some(lag) = &reply.outcome.persistence_lag {
            println!("(memory warning: {}; /rebuild can repair short-term memory)", lag);
        }
    }

    fn print_game(name: &str, update: &GameUpdate) {
        if let Some(turn) = &update.agent_turn {
            for line in &turn.replies {
                println!("{}: {}", name, line);
            }
            if let Some(cell) = turn.agent_move {
                println!("{} played cell {}.", name, cell);
            }
        }
        println!("{}", update.board);
        match update.state {
            RoundState::InProgress => println!("Your move: /move N"),
            RoundState::Won(mark) if mark == AGENT_MARK => println!("{} wins this round. /restart or /quit-game", name),
            RoundState::Won(_) => println!("You win this round. /restart or /quit-game"),
            RoundState::Draw => println!("Draw. /restart or /quit-game"),
        }
        println!("Score: {} {} - {} you", name, update.ai_wins, update.user_wins);
    }
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
