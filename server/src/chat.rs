//! Chat line formatting: colour escapes, truncation and line wrapping.

use protocol::{truncate_wire, STRING_LENGTH};

/// Rewrites every `%` followed by a hex digit into the wire colour escape
/// `&`. A `%` followed by anything else is left untouched.
pub fn rewrite_colors(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '%' && chars.peek().is_some_and(|next| next.is_ascii_hexdigit()) {
            out.push('&');
        } else {
            out.push(ch);
        }
    }

    out
}

/// Formats a player's chat line for broadcast, cut to the wire limit.
pub fn format_chat(sender: &str, message: &str) -> String {
    let line = format!("{}: {}", sender, rewrite_colors(message));
    truncate_wire(&line, STRING_LENGTH)
}

/// Splits `text` into lines of at most `width` characters, preferring to
/// break at spaces. Words longer than a line are split hard.
pub fn wrap_lines(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split(' ').filter(|word| !word.is_empty()) {
        let mut word: Vec<char> = word.chars().collect();

        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(word.drain(..width).collect());
        }
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() {
            word.len()
        } else {
            current.chars().count() + 1 + word.len()
        };
        if needed > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.extend(word);
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// The periodic "who is online" text, or `None` when nobody is.
pub fn online_summary(names: &[String]) -> Option<String> {
    if names.is_empty() {
        return None;
    }
    Some(format!("Online ({}): {}", names.len(), names.join(", ")))
}

pub fn join_notice(name: &str) -> String {
    format!("&e{} joined the game", name)
}

pub fn leave_notice(name: &str) -> String {
    format!("&e{} left the game", name)
}
