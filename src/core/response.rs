//! Outbound reply types and message-length utilities
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//!
//! A [`Reply`] is transport-neutral: plain text, optionally paired with a
//! button keyboard (rows of labelled tags) and/or a file attachment. The
//! transport adapter in `bin/bot.rs` renders it for Discord.

/// Discord message content limit
pub const MESSAGE_LIMIT: usize = 2000;

/// A single inline button: label shown to the user, tag sent back on press
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub tag: String,
}

impl Button {
    pub fn new(label: impl Into<String>, tag: impl Into<String>) -> Self {
        Button {
            label: label.into(),
            tag: tag.into(),
        }
    }
}

/// A file attached to an outbound reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

/// One outbound message: text plus optional keyboard and attachment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Vec<Vec<Button>>,
    pub attachment: Option<Attachment>,
}

impl Reply {
    /// Plain text reply
    pub fn text(text: impl Into<String>) -> Self {
        Reply {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Attach a button keyboard (rows of buttons)
    pub fn with_keyboard(mut self, keyboard: Vec<Vec<Button>>) -> Self {
        self.keyboard = keyboard;
        self
    }

    /// Attach a file
    pub fn with_attachment(mut self, filename: impl Into<String>, data: Vec<u8>) -> Self {
        self.attachment = Some(Attachment {
            filename: filename.into(),
            data,
        });
        self
    }
}

/// Truncate text to fit the message limit, adding ellipsis if needed
pub fn truncate_for_message(text: &str) -> String {
    if text.len() <= MESSAGE_LIMIT {
        text.to_string()
    } else {
        // Find a safe UTF-8 boundary
        let mut end = MESSAGE_LIMIT - 3; // Room for "..."
        while !text.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate_for_message("hello"), "hello");
    }

    #[test]
    fn test_truncate_long_text() {
        let text = "a".repeat(MESSAGE_LIMIT + 100);
        let result = truncate_for_message(&text);
        assert!(result.len() <= MESSAGE_LIMIT);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_truncate_respects_utf8_boundaries() {
        let text = "é".repeat(MESSAGE_LIMIT);
        let result = truncate_for_message(&text);
        assert!(result.len() <= MESSAGE_LIMIT);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_reply_builder() {
        let reply = Reply::text("pick one")
            .with_keyboard(vec![vec![Button::new("Notes", "notes")]]);
        assert_eq!(reply.text, "pick one");
        assert_eq!(reply.keyboard[0][0].tag, "notes");
        assert!(reply.attachment.is_none());
    }
}
