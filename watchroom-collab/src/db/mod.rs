use async_trait::async_trait;
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// The database could not be reached
    #[error("Database is unavailable: {0}")]
    Unavailable(String),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    /// Turns a uniqueness violation into a conflict on whichever of `fields` it concerns
    fn conflict_or(self, resource: &'static str, fields: &[(&'static str, &str)]) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult<T> {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
    /// Turns a not found error into `None`
    fn optional(self) -> Result<Option<T>>;
}

impl<T> DatabaseResult<T> for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Represents a type that can store and fetch watchroom data.
///
/// Every room mutation goes through [Database::update_room], which implementations must
/// apply as a single atomic update so concurrent mutations of the same room never
/// overwrite each other.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn user_by_id(&self, user_id: &str) -> Result<UserData>;
    async fn user_by_discord_id(&self, discord_id: &str) -> Result<UserData>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;
    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData>;

    async fn video_by_id(&self, video_id: &str) -> Result<VideoData>;
    async fn list_videos_by_owner(&self, owner: &str) -> Result<Vec<VideoData>>;
    async fn create_video(&self, new_video: NewVideo) -> Result<VideoData>;

    async fn room_by_id(&self, room_id: RoomId) -> Result<RoomData>;
    async fn room_by_url(&self, url: &str) -> Result<RoomData>;
    async fn room_by_code(&self, code: &str) -> Result<RoomData>;
    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData>;
    async fn update_room(&self, url: &str, update: RoomUpdate) -> Result<RoomData>;
    /// Deletes the room with the given url, returning how many rooms were deleted
    async fn delete_room_by_url(&self, url: &str) -> Result<u64>;

    async fn chat_by_room_id(&self, room_id: RoomId) -> Result<ChatData>;
    /// Creates a chat log that starts with the given welcome entry
    async fn create_chat(&self, room_id: RoomId, welcome: ChatEntry) -> Result<ChatData>;
    async fn append_chat_entry(&self, room_id: RoomId, entry: ChatEntry) -> Result<ChatEntry>;
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_id: UserId,
    pub discord_id: String,
    pub email: String,
    pub name: String,
    pub global_name: String,
    pub avatar: Option<String>,
    pub refresh_token: String,
    pub session_token: Option<String>,
    pub role: SiteRole,
}

/// Fields set to `None` are left untouched
#[derive(Debug, Clone, Default)]
pub struct UpdatedUser {
    pub user_id: UserId,
    pub email: Option<String>,
    pub name: Option<String>,
    pub global_name: Option<String>,
    pub avatar: Option<String>,
    pub refresh_token: Option<String>,
    pub session_token: Option<String>,
    pub role: Option<SiteRole>,
}

#[derive(Debug, Clone)]
pub struct NewVideo {
    pub video_id: VideoId,
    pub owner: UserId,
    pub name: String,
    pub duration: Option<u32>,
    pub url: String,
}

/// A fully resolved room, ready to be inserted
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub url: String,
    pub name: String,
    /// The owner of the new room
    pub owner: UserId,
    pub code: String,
    pub members: Vec<UserId>,
    pub roles: std::collections::BTreeMap<UserId, RoomRole>,
    pub queue: Vec<VideoId>,
}
