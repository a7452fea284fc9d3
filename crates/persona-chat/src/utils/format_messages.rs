//! Role tagging and speaker-prefixed rendering of exchanges

use crate::error::{MemoryError, MemoryResult};
use crate::memory::{Exchange, Role};

pub fn tag(role: Role, content: impl Into<String>) -> Exchange {
    Exchange::new(role, content)
}

/// Pair roles with contents. Unequal lengths are an error rather than a silent truncation.
pub fn tag_many<S: AsRef<str>>(roles: &[Role], contents: &[S]) -> MemoryResult<Vec<Exchange>> {
    if roles.len() != contents.len() {
        return Err(MemoryError::LengthMismatch {
            roles: roles.len(),
            contents: contents.len(),
        });
    }

    Ok(roles
        .iter()
        .zip(contents)
        .map(|(role, content)| tag(*role, content.as_ref()))
        .collect())
}

pub fn render_for_index(exchange: &Exchange, speaker_name: &str) -> String {
    format!("{}: {}", speaker_name, exchange.content)
}

/// Persona name for assistant turns, user name for everything else.
pub fn speaker_for<'a>(exchange: &Exchange, persona_name: &'a str, user_name: &'a str) -> &'a str {
    match exchange.role {
        Role::Assistant => persona_name,
        _ => user_name,
    }
}

/// Transcript form of a stored line: first character upper-cased, the rest lower-cased
pub fn render_transcript_line(document: &str) -> String {
    crate::utils::TextUtils::capitalize(document)
}

pub fn render_many(exchanges: &[Exchange], persona_name: &str, user_name: &str) -> Vec<String> {
    exchanges
        .iter()
        .map(|e| render_for_index(e, speaker_for(e, persona_name, user_name)))
        .collect()
}
