//! Conventions the chat client layers on top of plain lines.
//!
//! The server never acts on these shapes: every line is fanned out
//! verbatim. They are recognized only to label sessions in logs.
//!
//! Note that nothing distinguishes a real join/leave notice from a client
//! typing the same text as an ordinary message.

/// Suffix of the notice a client sends right after connecting.
pub const JOIN_SUFFIX: &str = " has joined the chat";
/// Suffix of the notice a client sends before disconnecting.
pub const LEAVE_SUFFIX: &str = " has left the chat";
/// Separator between sender and body in a chat message.
pub const SENDER_SEPARATOR: &str = ": ";

/// How a client would read a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatLine<'a> {
    Joined { user: &'a str },
    Left { user: &'a str },
    Message { sender: &'a str, body: &'a str },
    Other(&'a str),
}

impl<'a> ChatLine<'a> {
    /// Classify a line the same way the client does. Join/leave notices are
    /// checked before the sender split, so `"x has joined the chat"` is a
    /// join even if `x` contains `": "`.
    pub fn parse(line: &'a str) -> Self {
        if let Some(user) = line.strip_suffix(JOIN_SUFFIX) {
            return ChatLine::Joined { user: user.trim() };
        }
        if let Some(user) = line.strip_suffix(LEAVE_SUFFIX) {
            return ChatLine::Left { user: user.trim() };
        }
        match line.split_once(SENDER_SEPARATOR) {
            Some((sender, body)) => ChatLine::Message { sender, body },
            None => ChatLine::Other(line),
        }
    }

    /// Advisory display name carried by this line, if any.
    pub fn display_name(&self) -> Option<&'a str> {
        let name = match self {
            ChatLine::Joined { user } => *user,
            ChatLine::Message { sender, .. } => *sender,
            ChatLine::Left { .. } | ChatLine::Other(_) => return None,
        };
        let name = name.trim();
        (!name.is_empty()).then_some(name)
    }
}

/// Best-effort name hint from raw line bytes. Invalid UTF-8 yields `None`.
pub fn display_name_hint(line: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(line).ok()?;
    ChatLine::parse(text).display_name().map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_join_and_leave() {
        assert_eq!(
            ChatLine::parse("alice has joined the chat"),
            ChatLine::Joined { user: "alice" }
        );
        assert_eq!(
            ChatLine::parse("alice has left the chat"),
            ChatLine::Left { user: "alice" }
        );
    }

    #[test]
    fn splits_message_on_first_separator() {
        assert_eq!(
            ChatLine::parse("bob: see: this"),
            ChatLine::Message {
                sender: "bob",
                body: "see: this"
            }
        );
    }

    #[test]
    fn ambiguous_sender_takes_first_split() {
        // A sender named "a: b" cannot be told apart from sender "a".
        let line = ChatLine::parse("a: b: hello");
        assert_eq!(line.display_name(), Some("a"));
    }

    #[test]
    fn plain_text_is_other() {
        assert_eq!(ChatLine::parse("no separator"), ChatLine::Other("no separator"));
        assert_eq!(ChatLine::parse("no separator").display_name(), None);
    }

    #[test]
    fn leave_notice_carries_no_name() {
        assert_eq!(ChatLine::parse("carol has left the chat").display_name(), None);
    }

    #[test]
    fn empty_sender_is_ignored() {
        assert_eq!(display_name_hint(b": body"), None);
        assert_eq!(display_name_hint(b" has joined the chat"), None);
    }

    #[test]
    fn hint_from_bytes() {
        assert_eq!(display_name_hint(b"dave: yo").as_deref(), Some("dave"));
        assert_eq!(display_name_hint(b"\xff: yo"), None);
    }
}
