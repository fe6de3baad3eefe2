use chrono::Utc;
use log::{debug, info};

use crate::{
    ChatData, ChatEntry, CollabContext, CollabError, CollabResult, Database, DatabaseResult,
    RoomId,
};

/// The first message of every chat log
pub const WELCOME_MESSAGE: &str = "Welcome to the chat!";
/// The name welcome messages are shown with
pub const SYSTEM_DISPLAY_NAME: &str = "System";

/// Provisions and appends to the chat log of each room.
///
/// A log doesn't exist until the first message is sent to its room. It is then created
/// with a welcome message from the system identity, followed by the message itself.
pub struct ChatManager<Db> {
    context: CollabContext<Db>,
}

impl<Db> ChatManager<Db>
where
    Db: Database,
{
    pub fn new(context: &CollabContext<Db>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Returns the chat log of a room, if it has one yet
    pub async fn chat_log(&self, room_id: RoomId) -> CollabResult<Option<ChatData>> {
        Ok(self
            .context
            .database
            .chat_by_room_id(room_id)
            .await
            .optional()?)
    }

    /// Creates the chat log of a room, seeded with the welcome message.
    /// Fails if the room already has a log.
    pub async fn create_chat_log(&self, room_id: RoomId) -> CollabResult<ChatData> {
        let welcome = ChatEntry {
            user_id: self.context.config.system_user_id.clone(),
            message: WELCOME_MESSAGE.to_string(),
            display_name: SYSTEM_DISPLAY_NAME.to_string(),
            sent_at: Utc::now(),
        };

        let chat = self.context.database.create_chat(room_id, welcome).await?;

        info!("Chat created for room {}", room_id);
        Ok(chat)
    }

    /// Appends a message to a room's chat log, creating the log first if needed.
    ///
    /// Empty messages are ignored and return `None`. They do not create a log either.
    /// Whitespace is message text like any other and is kept as sent.
    pub async fn append_message(
        &self,
        room_id: RoomId,
        user_id: &str,
        message: &str,
        display_name: &str,
    ) -> CollabResult<Option<ChatEntry>> {
        if message.is_empty() {
            debug!("Ignoring empty message from {} in room {}", user_id, room_id);
            return Ok(None);
        }

        let entry = ChatEntry {
            user_id: user_id.to_string(),
            message: message.to_string(),
            display_name: display_name.to_string(),
            sent_at: Utc::now(),
        };

        let database = &self.context.database;

        let entry = match database.append_chat_entry(room_id, entry.clone()).await {
            Ok(entry) => entry,
            Err(e) if e.is_not_found() => {
                self.provision(room_id).await?;
                database.append_chat_entry(room_id, entry).await?
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Some(entry))
    }

    /// Ensures a chat log exists, tolerating one created concurrently
    async fn provision(&self, room_id: RoomId) -> CollabResult<()> {
        match self.create_chat_log(room_id).await {
            Ok(_) | Err(CollabError::UniquenessViolation { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
