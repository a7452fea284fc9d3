//! Utilities module - message formatting and text processing

pub mod format_messages;
pub mod text_utils;

pub use text_utils::TextUtils;
