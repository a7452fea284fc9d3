//! Parser for the agent's "Thought / Action / Action Input" replies

use crate::error::GameError;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ACTION_REGEX: Regex = Regex::new(r"(?m)^\s*Action:[ \t]*(.+?)[ \t]*$").unwrap();
    static ref ACTION_INPUT_REGEX: Regex = Regex::new(r"(?m)^\s*Action Input:[ \t]*(.*?)[ \t]*$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentAction {
    MakeMove,
    CheckBoard,
    RespondToUser(String),
}

impl AgentAction {
    pub const NAMES: [&'static str; 3] = ["Make move", "Check board", "Respond to user"];
}

/// One parsed reply. `transcript` is the reply with everything before the first
/// `Thought:` removed, which is what goes into the action log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStep {
    pub transcript: String,
    pub action: AgentAction,
}

/// Drop any preamble before the first `Thought:`
pub fn strip_preamble(response: &str) -> &str {
    match response.find("Thought:") {
        Some(start) => &response[start..],
        None => response,
    }
}

/// The last `Action:` line decides; its `Action Input:` is the first one after it.
pub fn parse_agent_step(response: &str) -> Result<AgentStep, GameError> {
    let transcript = strip_preamble(response);

    let action_match = ACTION_REGEX
        .captures_iter(transcript)
        .last()
        .ok_or(GameError::MissingField("Action"))?;
    let whole = action_match.get(0).map_or(0..0, |m| m.range());
    let name = action_match.get(1).map_or("", |m| m.as_str());

    let action = match normalize_action_name(name).as_str() {
        "make move" => AgentAction::MakeMove,
        "check board" => AgentAction::CheckBoard,
        "respond to user" => {
            let input = ACTION_INPUT_REGEX
                .captures(&transcript[whole.end..])
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim_matches(|c| c == '"' || c == '\'').trim())
                .filter(|s| !s.is_empty())
                .ok_or(GameError::MissingField("Action Input"))?;
            AgentAction::RespondToUser(input.to_string())
        }
        _ => return Err(GameError::UnrecognizedAction(name.to_string())),
    };

    Ok(AgentStep {
        transcript: transcript.trim_end().to_string(),
        action,
    })
}

fn normalize_action_name(name: &str) -> String {
    name.trim()
        .trim_matches(|c: char| matches!(c, '[' | ']' | '"' | '\'' | '`' | '.' | '*'))
        .trim()
        .to_lowercase()
}
