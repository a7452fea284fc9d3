//! Text helpers shared by the stores, the embedder and the game parser

use std::borrow::Cow;
use regex::Regex;
use lazy_static::lazy_static;

lazy_static! {
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
    static ref WORD_REGEX: Regex = Regex::new(r"[\p{L}\p{N}]+").unwrap();
}

pub struct TextUtils;

impl TextUtils {
    /// Collapse runs of whitespace into single spaces and trim the ends
    pub fn normalize_whitespace(text: &str) -> Cow<'_, str> {
        if WHITESPACE_REGEX.is_match(text) {
            Cow::Owned(WHITESPACE_REGEX.replace_all(text, " ").trim().to_string())
        } else {
            Cow::Borrowed(text)
        }
    }

    /// First character upper-cased, the rest lower-cased.
    ///
    /// This is the transcript convention: `"Halil: Hello there"` becomes
    /// `"Halil: hello there"`.
    pub fn capitalize(text: &str) -> String {
        let mut chars = text.chars();
        match chars.next() {
            Some(first) => {
                let mut out = String::with_capacity(text.len());
                out.extend(first.to_uppercase());
                out.push_str(&chars.as_str().to_lowercase());
                out
            }
            None => String::new(),
        }
    }

    /// Stable storage key for a character name. Whitespace becomes `_`; anything
    /// that is not alphanumeric, `_`, `-` or `.` is replaced as well so the key is
    /// safe as both a file stem and a collection name.
    pub fn sanitize_name(name: &str) -> String {
        name.trim()
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Lower-cased word tokens
    pub fn words(text: &str) -> Vec<String> {
        WORD_REGEX
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect()
    }

    pub fn truncate_with_ellipsis(text: &str, max_len: usize) -> Cow<'_, str> {
        if text.chars().count() <= max_len {
            Cow::Borrowed(text)
        } else if max_len <= 3 {
            Cow::Borrowed("...")
        } else {
            let mut result: String = text.chars().take(max_len - 3).collect();
            result.push_str("...");
            Cow::Owned(result)
        }
    }

    /// Check if word is significant (not stop word, long enough)
    pub fn is_significant_word(word: &str, min_len: usize) -> bool {
        if word.chars().count() < min_len {
            return false;
        }

        !matches!(word.to_lowercase().as_str(), "the" | "a" | "an" | "and" | "or" | "but" | "in" | "on" | "at" | "to" | "for" |
            "of" | "with" | "by" | "is" | "am" | "are" | "was" | "were" | "be" | "been" |
            "being" | "have" | "has" | "had" | "do" | "does" | "did")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize_lowercases_tail() {
        assert_eq!(TextUtils::capitalize("Halil: Hello there"), "Halil: hello there");
        assert_eq!(TextUtils::capitalize("test_character: General Kenobi"), "Test_character: general kenobi");
        assert_eq!(TextUtils::capitalize(""), "");
    }

    #[test]
    fn test_sanitize_name_replaces_spaces() {
        assert_eq!(TextUtils::sanitize_name("Sherlock Holmes"), "Sherlock_Holmes");
        assert_eq!(TextUtils::sanitize_name("../etc/passwd"), ".._etc_passwd");
        assert_eq!(TextUtils::sanitize_name("Goku"), "Goku");
    }

    #[test]
    fn test_words_splits_on_punctuation() {
        assert_eq!(TextUtils::words("General Kenobi! Hello, there."), vec!["general", "kenobi", "hello", "there"]);
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(TextUtils::normalize_whitespace("  a \n b  "), "a b");
    }
}
