//! Note flow handlers
//!
//! Handles: add-note, view-notes, delete-note, export-notes

use anyhow::Result;
use log::info;

use super::{not_registered, parse_id_tag, DialogueEngine, Stage, UNKNOWN_ACTION};
use crate::core::{truncate_for_message, Button, Reply};
use crate::transport::ChatUser;

pub const EXPORT_FILENAME: &str = "notes_export.txt";

impl DialogueEngine {
    pub(crate) async fn start_add_note(&self, chat: &ChatUser) -> Result<Vec<Reply>> {
        self.sessions.set(&chat.external_id, Stage::NoteTitle);
        Ok(vec![Reply::text("✍️ Send me the note title:")])
    }

    pub(crate) async fn note_title(&self, chat: &ChatUser, title: String) -> Result<Vec<Reply>> {
        self.sessions
            .set(&chat.external_id, Stage::NoteContent { title });
        Ok(vec![Reply::text("📝 Now send the note content:")])
    }

    pub(crate) async fn note_content(
        &self,
        chat: &ChatUser,
        title: String,
        content: String,
    ) -> Result<Vec<Reply>> {
        let Some(user) = self.known_user(chat).await? else {
            return Ok(not_registered());
        };
        self.db.add_note(user.id, &title, &content).await?;
        self.sessions.clear(&chat.external_id);
        info!("User {} saved note {title:?}", chat.external_id);
        Ok(vec![Reply::text(format!("✅ Note '{title}' saved."))])
    }

    pub(crate) async fn view_notes(&self, chat: &ChatUser) -> Result<Vec<Reply>> {
        let Some(user) = self.known_user(chat).await? else {
            return Ok(not_registered());
        };
        let notes = self.db.get_notes(user.id).await?;
        if notes.is_empty() {
            return Ok(vec![Reply::text("You don't have any notes yet.")]);
        }
        let listing = notes
            .iter()
            .map(|note| format!("📝 {}\n{}", note.title, note.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(vec![Reply::text(truncate_for_message(&listing))])
    }

    pub(crate) async fn delete_note_menu(&self, chat: &ChatUser) -> Result<Vec<Reply>> {
        let Some(user) = self.known_user(chat).await? else {
            return Ok(not_registered());
        };
        let notes = self.db.get_notes(user.id).await?;
        if notes.is_empty() {
            return Ok(vec![Reply::text("You have no notes to delete.")]);
        }
        let mut keyboard: Vec<Vec<Button>> = notes
            .iter()
            .map(|note| vec![Button::new(&note.title, format!("delete-note:{}", note.id))])
            .collect();
        keyboard.push(vec![Button::new("🔙 Back", "notes")]);
        Ok(vec![
            Reply::text("Pick a note to delete:").with_keyboard(keyboard)
        ])
    }

    pub(crate) async fn delete_note_by_tag(
        &self,
        chat: &ChatUser,
        tag: &str,
    ) -> Result<Vec<Reply>> {
        let Some(id) = parse_id_tag(tag, "delete-note:") else {
            return Ok(vec![Reply::text(UNKNOWN_ACTION)]);
        };
        if self.db.delete_note(id).await? {
            info!("User {} deleted note {id}", chat.external_id);
            Ok(vec![Reply::text("❌ Note deleted.")])
        } else {
            Ok(vec![Reply::text("❗ Note not found.")])
        }
    }

    /// Serialize all of the user's notes as `title\ncontent\n\n` blocks and
    /// return them as a downloadable text file.
    pub(crate) async fn export_notes(&self, chat: &ChatUser) -> Result<Vec<Reply>> {
        let Some(user) = self.known_user(chat).await? else {
            return Ok(not_registered());
        };
        let notes = self.db.get_notes(user.id).await?;
        if notes.is_empty() {
            return Ok(vec![Reply::text("You have no notes to export.")]);
        }
        let mut data = String::new();
        for note in &notes {
            data.push_str(&note.title);
            data.push('\n');
            data.push_str(&note.content);
            data.push_str("\n\n");
        }
        Ok(vec![Reply::text("Here are your notes as a .txt file.")
            .with_attachment(EXPORT_FILENAME, data.into_bytes())])
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;

    #[tokio::test]
    async fn test_add_note_flow_then_view_renders_exact_text() {
        let (engine, _) = engine().await;
        let chat = chat();
        register(&engine, &chat).await;

        button(&engine, &chat, "add-note").await;
        text(&engine, &chat, "groceries").await;
        let replies = text(&engine, &chat, "milk, eggs, bread").await;
        assert_eq!(replies[0].text, "✅ Note 'groceries' saved.");

        let replies = button(&engine, &chat, "view-notes").await;
        assert_eq!(replies[0].text, "📝 groceries\nmilk, eggs, bread");
    }

    #[tokio::test]
    async fn test_empty_title_and_content_accepted() {
        let (engine, _) = engine().await;
        let chat = chat();
        register(&engine, &chat).await;

        button(&engine, &chat, "add-note").await;
        text(&engine, &chat, "").await;
        let replies = text(&engine, &chat, "").await;
        assert_eq!(replies[0].text, "✅ Note '' saved.");
    }

    #[tokio::test]
    async fn test_delete_note_via_button_tag() {
        let (engine, _) = engine().await;
        let chat = chat();
        register(&engine, &chat).await;

        button(&engine, &chat, "add-note").await;
        text(&engine, &chat, "old").await;
        text(&engine, &chat, "stale content").await;

        let menu = button(&engine, &chat, "delete-note").await;
        let tag = menu[0].keyboard[0][0].tag.clone();
        assert!(tag.starts_with("delete-note:"));

        let replies = button(&engine, &chat, &tag).await;
        assert_eq!(replies[0].text, "❌ Note deleted.");

        // pressing the stale button again reports not found
        let replies = button(&engine, &chat, &tag).await;
        assert_eq!(replies[0].text, "❗ Note not found.");
    }

    #[tokio::test]
    async fn test_export_block_format() {
        let (engine, _) = engine().await;
        let chat = chat();
        register(&engine, &chat).await;

        for (title, content) in [("a", "first"), ("b", "second")] {
            button(&engine, &chat, "add-note").await;
            text(&engine, &chat, title).await;
            text(&engine, &chat, content).await;
        }

        let replies = button(&engine, &chat, "export-notes").await;
        let attachment = replies[0].attachment.as_ref().unwrap();
        assert_eq!(attachment.filename, EXPORT_FILENAME);
        assert_eq!(
            String::from_utf8(attachment.data.clone()).unwrap(),
            "a\nfirst\n\nb\nsecond\n\n"
        );
    }

    #[tokio::test]
    async fn test_view_with_no_notes() {
        let (engine, _) = engine().await;
        let chat = chat();
        register(&engine, &chat).await;
        let replies = button(&engine, &chat, "view-notes").await;
        assert_eq!(replies[0].text, "You don't have any notes yet.");
    }
}
