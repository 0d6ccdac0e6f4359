use intake_core::dialog::action::CallbackAction;
use intake_core::dialog::states::{Keyboard, Reply};

/// Hard limit of one outbound chat message.
pub const MAX_MESSAGE_LEN: usize = 4000;

/// One inbound event from the chat service, already decoded. Callback data
/// is parsed at the transport boundary, so malformed payloads never reach
/// the dialogue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundEvent {
    pub user: String,
    pub kind: InboundKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundKind {
    Text(String),
    Action(CallbackAction),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

impl OutboundMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), keyboard: None }
    }
}

impl From<Reply> for OutboundMessage {
    fn from(reply: Reply) -> Self {
        Self { text: reply.text, keyboard: reply.keyboard }
    }
}

/// Splits a long message at line boundaries so that every part fits within
/// `limit` and joining the parts with `'\n'` reproduces the input exactly.
/// A single line longer than the limit is emitted as its own oversized part
/// rather than being cut mid-line.
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut parts = Vec::new();
    let mut current: Option<String> = None;

    for line in text.split('\n') {
        match current.as_mut() {
            None => current = Some(line.to_owned()),
            Some(part) if part.len() + 1 + line.len() > limit => {
                parts.push(std::mem::replace(part, line.to_owned()));
            }
            Some(part) => {
                part.push('\n');
                part.push_str(line);
            }
        }
    }

    if let Some(part) = current {
        parts.push(part);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::chunk_text;

    #[test]
    fn short_text_stays_in_one_part() {
        assert_eq!(chunk_text("hello\nworld", 40), vec!["hello\nworld"]);
        assert!(chunk_text("", 40).is_empty());
    }

    #[test]
    fn joining_the_parts_reconstructs_the_input() {
        let text = "first line\n\nthird line\nfourth\n\nlast";
        let parts = chunk_text(text, 12);

        assert!(parts.len() > 1);
        assert_eq!(parts.join("\n"), text);
        for part in &parts {
            assert!(part.len() <= 12, "part {part:?} exceeds the limit");
        }
    }

    #[test]
    fn leading_and_trailing_empty_lines_survive() {
        let text = "\nbody\n";
        assert_eq!(chunk_text(text, 40).join("\n"), text);
    }

    #[test]
    fn an_oversized_line_is_emitted_unsplit() {
        let long = "x".repeat(50);
        let text = format!("short\n{long}\nshort");
        let parts = chunk_text(&text, 20);

        assert_eq!(parts, vec!["short".to_owned(), long, "short".to_owned()]);
    }
}
