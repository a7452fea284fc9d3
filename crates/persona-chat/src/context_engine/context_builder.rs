//! Prompt composition for chat turns, summarization and the game loop

use crate::characters::Character;
use crate::game::GAME_NAME;
use crate::memory::{Exchange, Role};
use crate::utils::format_messages::speaker_for;

const SUMMARIZER_SYSTEM_TEMPLATE: &str = "Progressively summarize the new lines of conversation. Use the provided current summary and the new lines of conversation to create an updated summary.\n";

const NO_ACTIONS_YET: &str = "You have not taken any action yet.";

const TIC_TAC_TOE_TOOLS: &str = "Make move: Use this tool to automatically make a move.
Check board: Use this tool to anaylze the board and check if you or the user can win the game with the next round.
Respond to user: Use this tool to tell the user something. You can express your thought about the game or taunt the user to distract them from making the best move.

Start a loop and always use the following format:

Thought: you should always think about what to do
Action: the action to take, should be one of [Make move, Check board, Respond to user]
Action Input: the input to the action you take, only applicable for action 'Respond to user'

Do NOT deviate from the shown format and make sure to always include 'Thought' in your responses.";

/// Builds every prompt for one persona and one user
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    character: Character,
    user_name: String,
    roleplay_instructions: String,
}

impl ContextBuilder {
    pub fn new(character: Character, user_name: impl Into<String>) -> Self {
        let user_name = user_name.into();
        let roleplay_instructions = format!(
            "You are roleplaying as the character {name} from the {ptype} {pname}. The name of the user you are talking to is {user}. Only talk as {name} and respond to {user}. Always stay in character and never do something {name} wouldn't do. React and respond the way {name} would react and respond. Start the conversation with something {name} does regularly.",
            name = character.name,
            ptype = character.platform_type,
            pname = character.platform_name,
            user = user_name,
        );
        Self {
            character,
            user_name,
            roleplay_instructions,
        }
    }

    pub fn character(&self) -> &Character {
        &self.character
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Persona instructions; also the opening prompt of a brand-new conversation
    pub fn initial_system_prompt(&self) -> &str {
        &self.roleplay_instructions
    }

    pub fn greeting_prompt(&self) -> Vec<Exchange> {
        vec![Exchange::system(self.roleplay_instructions.clone())]
    }

    /// Lines are `Name: content\n`; system entries are skipped
    pub fn summarizer_prompt(&self, current_summary: &str, window: &[Exchange]) -> Vec<Exchange> {
        let new_lines: String = window
            .iter()
            .filter(|e| e.role != Role::System)
            .map(|e| {
                format!(
                    "{}: {}\n",
                    speaker_for(e, &self.character.name, &self.user_name),
                    e.content
                )
            })
            .collect();

        vec![
            Exchange::system(SUMMARIZER_SYSTEM_TEMPLATE),
            Exchange::user(format!(
                "Current summary:\n{}\n\nNew lines of conversation:\n{}\n\nUpdated summary:",
                current_summary, new_lines
            )),
        ]
    }

    pub fn chat_system_prompt(&self, current_summary: &str, related: &[String]) -> String {
        let related_information: String = related.iter().map(|line| format!("{}\n", line)).collect();
        format!(
            "You are roleplaying as the character {name} from the {ptype} {pname}. Use the following information to continue the roleplay conversation between you and the user.\n\n\
             Roleplay instruction rules:\n{rules}\n\n\
             Use the following summary of the conversation so far as context:\n{summary}\n\n\
             Additionally, use the following related messages as context:\n{related}\n",
            name = self.character.name,
            ptype = self.character.platform_type,
            pname = self.character.platform_name,
            rules = self.roleplay_instructions,
            summary = current_summary,
            related = related_information,
        )
    }

    /// Without a summary the prompt is the raw window plus the new message.
    /// With one, a system prompt carrying summary and related lines goes first.
    pub fn chat_prompt(
        &self,
        summary: Option<(&str, &[String])>,
        window: &[Exchange],
        user_message: &str,
    ) -> Vec<Exchange> {
        let mut prompt = Vec::with_capacity(window.len() + 2);
        if let Some((current_summary, related)) = summary {
            prompt.push(Exchange::system(self.chat_system_prompt(current_summary, related)));
        }
        prompt.extend_from_slice(window);
        prompt.push(Exchange::user(user_message));
        prompt
    }

    pub fn game_start_prompt(&self, current_summary: &str, action_log: &str) -> String {
        format!(
            "The user wants to play the game {game} with you and started a session right now. Do not draw the board visually, keep everything in plain text. You will make the first move in the game. For that, use the following rules to play the game with him:\n\n\
             Roleplay instruction rules:\n{rules}\n\n\
             Summary of your conversation with {user} so far:\n{summary}\n\n\
             Use the following function as tools to properly play the game:\n{tools}\n\n\
             Here are your previous actions so far:\n{log}\n",
            game = GAME_NAME,
            rules = self.roleplay_instructions,
            user = self.user_name,
            summary = current_summary,
            tools = TIC_TAC_TOE_TOOLS,
            log = action_log_or_default(action_log),
        )
    }

    pub fn game_continue_prompt(&self, current_summary: &str, ai_wins: u32, user_wins: u32, action_log: &str) -> String {
        format!(
            "\nContinue playing the game {game} with {user}. So far, you have won {ai_wins} times and {user} has won {user_wins} times. Do not draw the game visually. Use the following rules to properly continue playing the game with him:\n\n\
             Roleplay instruction rules:\n{rules}\n\n\
             Summary of your conversation with {user} so far:\n{summary}\n\n\
             Use the following functions as tools to properly continue playing the game:\n{tools}\n\n\
             Here are your previous actions so far:\n{log}\n",
            game = GAME_NAME,
            user = self.user_name,
            ai_wins = ai_wins,
            user_wins = user_wins,
            rules = self.roleplay_instructions,
            summary = current_summary,
            tools = TIC_TAC_TOE_TOOLS,
            log = action_log_or_default(action_log),
        )
    }

    pub fn game_quit_prompt(&self, current_summary: &str, ai_wins: u32, user_wins: u32) -> String {
        format!(
            "You are roleplaying as the character {name} from the {ptype} {pname}. You were playing the game {game} with the user. The game session ended now. Use the following information to continue the roleplay conversation between you and the user.\n\n\
             Roleplay instruction rules:\n{rules}\n\n\
             {game} game session results:\nYou won {ai_wins} times.\nThe user won {user_wins} times.\n\n\
             Use the following summary of the conversation so far as context:\n{summary}\n\n",
            name = self.character.name,
            ptype = self.character.platform_type,
            pname = self.character.platform_name,
            game = GAME_NAME,
            rules = self.roleplay_instructions,
            ai_wins = ai_wins,
            user_wins = user_wins,
            summary = current_summary,
        )
    }

    /// Stands in for the user's side of the turn when the game ends
    pub fn game_quit_user_message(&self, ai_wins: u32, user_wins: u32) -> String {
        format!(
            "We just finished our {} game session. I won {} times and you won {} time.",
            GAME_NAME, user_wins, ai_wins
        )
    }
}

fn action_log_or_default(action_log: &str) -> &str {
    if action_log.is_empty() {
        NO_ACTIONS_YET
    } else {
        action_log
    }
}
