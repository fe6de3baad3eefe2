mod chat;
mod config;
mod db;
mod errors;
mod issuer;
mod rooms;
mod users;
mod util;
mod videos;

use std::sync::Arc;

pub use chat::*;
pub use config::*;
pub use db::*;
pub use errors::*;
pub use issuer::*;
pub use rooms::*;
pub use users::*;
pub use videos::*;

/// The watchroom collab system, facilitating rooms, their chats, and the users and videos in them.
///
/// This is the single entry point for callers such as UI actions or API handlers.
pub struct Collab<Db> {
    context: CollabContext<Db>,

    pub rooms: RoomManager<Db>,
    pub chats: ChatManager<Db>,
    pub users: UserRegistry<Db>,
    pub videos: VideoLibrary<Db>,
}

/// A type passed to the components of the collab system, to access configuration and the database.
pub struct CollabContext<Db> {
    pub config: Arc<Config>,
    pub database: Arc<Db>,
    pub issuer: Arc<CodeIssuer>,
}

impl<Db> Collab<Db>
where
    Db: Database,
{
    pub fn new(config: Config, database: Db) -> Self {
        let issuer = CodeIssuer::new(&config);

        Self::with_issuer(config, database, issuer)
    }

    pub fn with_issuer(config: Config, database: Db, issuer: CodeIssuer) -> Self {
        let context = CollabContext {
            config: Arc::new(config),
            database: Arc::new(database),
            issuer: Arc::new(issuer),
        };

        Self {
            rooms: RoomManager::new(&context),
            chats: ChatManager::new(&context),
            users: UserRegistry::new(&context),
            videos: VideoLibrary::new(&context),
            context,
        }
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    pub fn database(&self) -> &Arc<Db> {
        &self.context.database
    }

    /// Creates a room and returns its shareable url
    pub async fn create_room(&self, spec: RoomSpec) -> CollabResult<String> {
        self.rooms.create_room(spec).await.map(|room| room.url)
    }

    /// Looks up a room by its url
    pub async fn check_room(&self, url: &str) -> CollabResult<Option<RoomData>> {
        self.rooms.room_by_url(url).await
    }

    /// Looks up a room by its join code
    pub async fn get_room(&self, code: &str) -> CollabResult<Option<RoomData>> {
        self.rooms.room_by_code(code).await
    }

    pub async fn add_viewer(&self, url: &str, user_id: &str) -> CollabResult<RoomData> {
        self.rooms.add_member(url, user_id).await
    }

    pub async fn remove_viewer(&self, url: &str, user_id: &str) -> CollabResult<RoomData> {
        self.rooms.remove_member(url, user_id).await
    }

    /// Sets the role of a user in a room. `role` is one of `admin`, `viewer` or `remote`.
    pub async fn set_viewer_role(
        &self,
        url: &str,
        user_id: &str,
        role: &str,
    ) -> CollabResult<RoomData> {
        let role: RoomRole = role.parse()?;

        self.rooms.set_member_role(url, user_id, role).await
    }

    pub async fn check_owner_video_access(
        &self,
        url: &str,
        user_id: &str,
    ) -> CollabResult<AccessDecision> {
        self.rooms.check_owner_video_access(url, user_id).await
    }

    pub async fn add_video_to_queue(&self, url: &str, video_id: &str) -> CollabResult<RoomData> {
        self.rooms.enqueue_video(url, video_id).await
    }

    /// Ends a room, returning how many rooms were deleted
    pub async fn end_room(&self, url: &str) -> CollabResult<u64> {
        self.rooms.end_room(url).await
    }

    pub async fn get_global_name(&self, user_id: &str) -> CollabResult<String> {
        self.rooms.owner_display_name(user_id).await
    }

    pub async fn get_chat(&self, room_id: RoomId) -> CollabResult<Option<ChatData>> {
        self.chats.chat_log(room_id).await
    }

    pub async fn add_chat_session(&self, room_id: RoomId) -> CollabResult<ChatData> {
        self.chats.create_chat_log(room_id).await
    }

    pub async fn add_chat_message(
        &self,
        room_id: RoomId,
        user_id: &str,
        message: &str,
        display_name: &str,
    ) -> CollabResult<Option<ChatEntry>> {
        self.chats
            .append_message(room_id, user_id, message, display_name)
            .await
    }

    pub async fn register_login(&self, login: Login) -> CollabResult<UserData> {
        self.users.register_login(login).await
    }

    /// Sets the global role of a user. `role` is one of `admin`, `basic`, `tester` or `privileged`.
    pub async fn set_site_role(&self, user_id: &str, role: &str) -> CollabResult<UserData> {
        let role: SiteRole = role.parse()?;

        self.users.set_site_role(user_id, role).await
    }

    pub async fn register_video(&self, spec: VideoSpec) -> CollabResult<VideoData> {
        self.videos.register_video(spec).await
    }

    pub async fn video(&self, video_id: &str) -> CollabResult<Option<VideoData>> {
        self.videos.video(video_id).await
    }
}

impl<Db> Clone for CollabContext<Db> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            database: self.database.clone(),
            issuer: self.issuer.clone(),
        }
    }
}


#[cfg(test)]
mod test {
    use crate::{
        AccessDecision, Collab, CollabError, Config, Login, MemoryDatabase, RoomRole, RoomSpec,
        VideoSpec,
    };

    async fn collab_with_owner() -> (Collab<MemoryDatabase>, String) {
        let collab = Collab::new(Config::default(), MemoryDatabase::new());
        let owner = collab
            .register_login(Login {
                discord_id: "1001".to_string(),
                email: "owner@example.com".to_string(),
                name: "owner".to_string(),
                global_name: "The Owner".to_string(),
                avatar: None,
                refresh_token: "refresh".to_string(),
                session_token: None,
            })
            .await
            .unwrap();

        (collab, owner.user_id)
    }

    #[tokio::test]
    async fn a_watch_session_from_creation_to_end() {
        let (collab, owner) = collab_with_owner().await;

        let url = collab
            .create_room(RoomSpec {
                url: Some("room/abc123".to_string()),
                code: Some("XYZ1".to_string()),
                ..RoomSpec::new("Movie night", owner.clone())
            })
            .await
            .unwrap();
        assert_eq!(url, "room/abc123");

        let room = collab.get_room("XYZ1").await.unwrap().unwrap();
        assert_eq!(room.url, url);
        assert_eq!(collab.get_global_name(&room.owner).await.unwrap(), "The Owner");

        collab.add_viewer(&url, "u1").await.unwrap();
        assert_eq!(
            collab.check_owner_video_access(&url, "u1").await.unwrap(),
            AccessDecision::Allow
        );
        let room = collab.remove_viewer(&url, "u1").await.unwrap();
        assert!(room.members.is_empty());

        let video = collab
            .register_video(VideoSpec {
                video_id: None,
                owner: owner.clone(),
                name: "Trailer".to_string(),
                duration: None,
                url: "https://cdn.example.com/trailer.mp4".to_string(),
            })
            .await
            .unwrap();
        let room = collab
            .add_video_to_queue(&url, &video.video_id)
            .await
            .unwrap();
        assert_eq!(room.queue, vec![video.video_id]);

        collab
            .add_chat_message(room.id, &owner, "popcorn ready?", "The Owner")
            .await
            .unwrap();
        assert_eq!(collab.get_chat(room.id).await.unwrap().unwrap().entries.len(), 2);

        assert_eq!(collab.end_room(&url).await.unwrap(), 1);
        assert_eq!(collab.check_room(&url).await.unwrap(), None);
        assert_eq!(collab.end_room(&url).await.unwrap(), 0);

        // The chat outlives the room
        assert!(collab.get_chat(room.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn generated_urls_are_returned_on_creation() {
        let (collab, owner) = collab_with_owner().await;

        let url = collab
            .create_room(RoomSpec::new("Quick room", owner))
            .await
            .unwrap();
        let room = collab.check_room(&url).await.unwrap().unwrap();

        assert!(url.starts_with(&collab.config().room_url_prefix));
        assert_eq!(room.code.len(), collab.config().code_length);
    }

    #[tokio::test]
    async fn role_labels_are_validated_at_the_boundary() {
        let (collab, owner) = collab_with_owner().await;
        let url = collab
            .create_room(RoomSpec::new("Room", owner.clone()))
            .await
            .unwrap();

        collab.add_viewer(&url, "u1").await.unwrap();
        let room = collab.set_viewer_role(&url, "u1", "remote").await.unwrap();
        assert_eq!(room.role_of("u1"), Some(RoomRole::Remote));

        let err = collab.set_viewer_role(&url, "u1", "owner").await.unwrap_err();
        assert!(matches!(err, CollabError::Validation { field: "role", .. }));

        let err = collab.set_site_role(&owner, "superuser").await.unwrap_err();
        assert!(matches!(err, CollabError::Validation { field: "role", .. }));

        let user = collab.set_site_role(&owner, "privileged").await.unwrap();
        assert_eq!(user.role.as_str(), "privileged");
    }

    #[tokio::test]
    async fn chat_sessions_start_with_one_welcome_entry() {
        let (collab, _) = collab_with_owner().await;

        let chat = collab.add_chat_session(9).await.unwrap();
        assert_eq!(chat.entries.len(), 1);
        assert_eq!(chat.entries[0].user_id, collab.config().system_user_id);

        let result = collab.add_chat_message(9, "u1", "", "Alice").await.unwrap();
        assert_eq!(result, None);
        assert_eq!(collab.get_chat(9).await.unwrap().unwrap().entries.len(), 1);
    }
}
