mod spec;

pub use spec::*;

use log::{debug, info, warn};

use crate::{
    CollabContext, CollabError, CollabResult, Database, DatabaseError, DatabaseResult, NewRoom,
    RoomData, RoomId, RoomRole, RoomUpdate,
};

/// Creates, looks up, mutates and ends rooms.
pub struct RoomManager<Db> {
    context: CollabContext<Db>,
}

impl<Db> RoomManager<Db>
where
    Db: Database,
{
    pub fn new(context: &CollabContext<Db>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates a new room, issuing a url and code if the spec leaves them out.
    pub async fn create_room(&self, spec: RoomSpec) -> CollabResult<RoomData> {
        spec.validate()?;

        // The owner has to exist before anything is issued for the room
        self.context.database.user_by_id(&spec.owner).await?;

        let issuer = &self.context.issuer;
        let max_attempts = if spec.url.is_some() && spec.code.is_some() {
            1
        } else {
            issuer.max_attempts()
        };

        let mut attempt = 0;

        loop {
            attempt += 1;

            let new_room = NewRoom {
                url: spec.url.clone().unwrap_or_else(|| issuer.issue_url()),
                code: spec.code.clone().unwrap_or_else(|| issuer.issue_code()),
                name: spec.name.clone(),
                owner: spec.owner.clone(),
                members: spec.members.clone(),
                roles: spec.roles.clone(),
                queue: spec.queue.clone(),
            };

            match self.context.database.create_room(new_room).await {
                Ok(room) => {
                    info!("Room {} created by {} at {}", room.name, room.owner, room.url);
                    return Ok(room);
                }
                Err(DatabaseError::Conflict { field, value, .. })
                    if attempt < max_attempts && spec.is_issued(field) =>
                {
                    warn!(
                        "Issued room {} {} is taken, retrying ({}/{})",
                        field, value, attempt, max_attempts
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn room_by_id(&self, room_id: RoomId) -> CollabResult<Option<RoomData>> {
        Ok(self.context.database.room_by_id(room_id).await.optional()?)
    }

    pub async fn room_by_url(&self, url: &str) -> CollabResult<Option<RoomData>> {
        Ok(self.context.database.room_by_url(url).await.optional()?)
    }

    pub async fn room_by_code(&self, code: &str) -> CollabResult<Option<RoomData>> {
        Ok(self.context.database.room_by_code(code).await.optional()?)
    }

    /// Appends a user to the member list of a room. Users already in the room are added again.
    pub async fn add_member(&self, url: &str, user_id: &str) -> CollabResult<RoomData> {
        require("user_id", user_id)?;

        let room = self
            .update(url, RoomUpdate::PushMember(user_id.to_string()))
            .await?;

        debug!("User {} joined room {}", user_id, room.url);
        Ok(room)
    }

    /// Removes every occurrence of a user from the member list of a room.
    pub async fn remove_member(&self, url: &str, user_id: &str) -> CollabResult<RoomData> {
        let room = self
            .update(url, RoomUpdate::PullMember(user_id.to_string()))
            .await?;

        debug!("User {} left room {}", user_id, room.url);
        Ok(room)
    }

    /// Sets the role of a user in a room. Only members of the room can be given a role.
    pub async fn set_member_role(
        &self,
        url: &str,
        user_id: &str,
        role: RoomRole,
    ) -> CollabResult<RoomData> {
        require("user_id", user_id)?;

        let room = self
            .update(url, RoomUpdate::SetRole(user_id.to_string(), role))
            .await?;

        debug!("User {} is now {} in room {}", user_id, role, room.url);
        Ok(room)
    }

    /// Appends a video to the tail of a room's queue
    pub async fn enqueue_video(&self, url: &str, video_id: &str) -> CollabResult<RoomData> {
        require("video_id", video_id)?;

        let room = self
            .update(url, RoomUpdate::PushVideo(video_id.to_string()))
            .await?;

        debug!(
            "Video {} queued in room {} at position {}",
            video_id,
            room.url,
            room.queue.len()
        );
        Ok(room)
    }

    /// Deletes a room, returning how many rooms were deleted.
    /// Ending a room that doesn't exist is not an error.
    pub async fn end_room(&self, url: &str) -> CollabResult<u64> {
        let deleted = self.context.database.delete_room_by_url(url).await?;

        if deleted > 0 {
            info!("Room {} ended", url);
        }

        Ok(deleted)
    }

    /// Returns the global display name of a user
    pub async fn owner_display_name(&self, user_id: &str) -> CollabResult<String> {
        let user = self.context.database.user_by_id(user_id).await?;

        Ok(user.global_name)
    }

    /// Decides whether a user may access the videos played in a room.
    /// Only the owner and listed members are allowed; a missing room denies everyone.
    pub async fn check_owner_video_access(
        &self,
        url: &str,
        user_id: &str,
    ) -> CollabResult<AccessDecision> {
        let decision = match self.room_by_url(url).await? {
            Some(room) if room.owner == user_id || room.is_member(user_id) => AccessDecision::Allow,
            _ => AccessDecision::Deny,
        };

        debug!("Video access for {} in room {}: {:?}", user_id, url, decision);
        Ok(decision)
    }

    async fn update(&self, url: &str, update: RoomUpdate) -> CollabResult<RoomData> {
        Ok(self.context.database.update_room(url, update).await?)
    }
}

fn require(field: &'static str, value: &str) -> CollabResult<()> {
    if value.trim().is_empty() {
        return Err(CollabError::validation(field, "must not be empty"));
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::{collections::BTreeMap, sync::Arc};

    use futures_util::future::join_all;
    use parking_lot::Mutex;

    use super::{AccessDecision, RoomManager, RoomSpec};
    use crate::{
        test_support::{context_with, seed_user},
        CodeIssuer, CollabError, Config, MemoryDatabase, RoomRole, TokenSource,
    };

    /// Hands out a fixed sequence of tokens
    struct SequenceTokens(Mutex<Vec<&'static str>>);

    impl TokenSource for SequenceTokens {
        fn token(&self, _alphabet: &'static [u8], _length: usize) -> String {
            self.0.lock().remove(0).to_string()
        }
    }

    async fn manager() -> RoomManager<MemoryDatabase> {
        let context = context_with(Config::default(), None);
        seed_user(&context, "owner").await;

        RoomManager::new(&context)
    }

    fn spec(url: &str, code: &str) -> RoomSpec {
        RoomSpec {
            url: Some(url.to_string()),
            code: Some(code.to_string()),
            ..RoomSpec::new("Movie night", "owner")
        }
    }

    #[tokio::test]
    async fn created_rooms_can_be_found_by_url_and_code() {
        let rooms = manager().await;
        let mut spec = spec("room/abc123", "XYZ1");
        spec.members = vec!["owner".to_string()];
        spec.roles = BTreeMap::from([("owner".to_string(), RoomRole::Admin)]);
        spec.queue = vec!["v1".to_string()];

        let created = rooms.create_room(spec.clone()).await.unwrap();
        assert_eq!(created.url, "room/abc123");

        let found = rooms.room_by_url("room/abc123").await.unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(found.name, spec.name);
        assert_eq!(found.owner, spec.owner);
        assert_eq!(found.code, "XYZ1");
        assert_eq!(found.members, spec.members);
        assert_eq!(found.roles, spec.roles);
        assert_eq!(found.queue, spec.queue);

        let by_code = rooms.room_by_code("XYZ1").await.unwrap().unwrap();
        assert_eq!(by_code.id, created.id);
    }

    #[tokio::test]
    async fn missing_rooms_are_absent_rather_than_errors() {
        let rooms = manager().await;

        assert_eq!(rooms.room_by_url("room/nope").await.unwrap(), None);
        assert_eq!(rooms.room_by_code("NOPE").await.unwrap(), None);
        assert_eq!(rooms.room_by_id(42).await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_specs_are_rejected() {
        let rooms = manager().await;

        let err = rooms
            .create_room(RoomSpec::new("", "owner"))
            .await
            .unwrap_err();
        assert!(matches!(err, CollabError::Validation { field: "name", .. }));

        let err = rooms
            .create_room(spec("room with spaces", "XYZ1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CollabError::Validation { field: "url", .. }));

        let err = rooms
            .create_room(RoomSpec::new("Movie night", "stranger"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn supplied_urls_that_collide_are_not_regenerated() {
        let rooms = manager().await;
        rooms.create_room(spec("room/abc123", "XYZ1")).await.unwrap();

        let err = rooms
            .create_room(spec("room/abc123", "XYZ2"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CollabError::UniquenessViolation { field: "url", .. }
        ));
    }

    #[tokio::test]
    async fn issued_codes_are_retried_on_collision() {
        let tokens = SequenceTokens(Mutex::new(vec!["TAKEN1", "FREE22"]));
        let issuer = CodeIssuer::with_source(&Config::default(), tokens);
        let context = context_with(Config::default(), Some(issuer));
        seed_user(&context, "owner").await;
        let rooms = RoomManager::new(&context);

        rooms.create_room(spec("room/first", "TAKEN1")).await.unwrap();

        let room = rooms
            .create_room(RoomSpec {
                url: Some("room/second".to_string()),
                ..RoomSpec::new("Second", "owner")
            })
            .await
            .unwrap();

        assert_eq!(room.code, "FREE22");
    }

    #[tokio::test]
    async fn issuing_gives_up_after_the_configured_attempts() {
        let config = Config {
            max_issue_attempts: 2,
            ..Default::default()
        };
        let tokens = SequenceTokens(Mutex::new(vec!["TAKEN1", "TAKEN1", "FREE22"]));
        let issuer = CodeIssuer::with_source(&config, tokens);
        let context = context_with(config, Some(issuer));
        seed_user(&context, "owner").await;
        let rooms = RoomManager::new(&context);

        rooms.create_room(spec("room/first", "TAKEN1")).await.unwrap();

        let err = rooms
            .create_room(RoomSpec {
                url: Some("room/second".to_string()),
                ..RoomSpec::new("Second", "owner")
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CollabError::UniquenessViolation { field: "code", .. }
        ));
    }

    #[tokio::test]
    async fn members_are_appended_without_dedup_and_removed_entirely() {
        let rooms = manager().await;
        rooms.create_room(spec("room/abc123", "XYZ1")).await.unwrap();

        for user in ["a", "b", "a"] {
            rooms.add_member("room/abc123", user).await.unwrap();
        }

        let room = rooms.room_by_url("room/abc123").await.unwrap().unwrap();
        assert_eq!(room.members, vec!["a", "b", "a"]);

        let room = rooms.remove_member("room/abc123", "a").await.unwrap();
        assert_eq!(room.members, vec!["b"]);
    }

    #[tokio::test]
    async fn adding_and_removing_a_member_restores_an_empty_roster() {
        let rooms = manager().await;
        rooms.create_room(spec("room/abc123", "XYZ1")).await.unwrap();

        let room = rooms.add_member("room/abc123", "u1").await.unwrap();
        assert_eq!(room.members, vec!["u1"]);

        let room = rooms.remove_member("room/abc123", "u1").await.unwrap();
        assert!(room.members.is_empty());
    }

    #[tokio::test]
    async fn mutating_a_missing_room_is_not_found() {
        let rooms = manager().await;

        assert!(rooms
            .add_member("room/missing", "u1")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(rooms
            .remove_member("room/missing", "u1")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(rooms
            .enqueue_video("room/missing", "v1")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn videos_are_queued_in_order() {
        let rooms = manager().await;
        rooms.create_room(spec("room/abc123", "XYZ1")).await.unwrap();

        for video in ["v1", "v2", "v3", "v1"] {
            rooms.enqueue_video("room/abc123", video).await.unwrap();
        }

        let room = rooms.room_by_url("room/abc123").await.unwrap().unwrap();
        assert_eq!(room.queue, vec!["v1", "v2", "v3", "v1"]);
    }

    #[tokio::test]
    async fn concurrent_joins_are_not_lost() {
        let rooms = Arc::new(manager().await);
        rooms.create_room(spec("room/abc123", "XYZ1")).await.unwrap();

        let joins = (0..50).map(|i| {
            let rooms = rooms.clone();
            tokio::spawn(async move {
                rooms
                    .add_member("room/abc123", &format!("user-{}", i))
                    .await
                    .unwrap();
            })
        });

        for result in join_all(joins).await {
            result.unwrap();
        }

        let room = rooms.room_by_url("room/abc123").await.unwrap().unwrap();
        assert_eq!(room.members.len(), 50);
    }

    #[tokio::test]
    async fn ending_a_room_twice_is_harmless() {
        let rooms = manager().await;
        rooms.create_room(spec("room/abc123", "XYZ1")).await.unwrap();

        assert_eq!(rooms.end_room("room/abc123").await.unwrap(), 1);
        assert_eq!(rooms.end_room("room/abc123").await.unwrap(), 0);
        assert_eq!(rooms.room_by_url("room/abc123").await.unwrap(), None);
    }

    #[tokio::test]
    async fn member_roles_are_set_and_dropped_on_leave() {
        let rooms = manager().await;
        rooms.create_room(spec("room/abc123", "XYZ1")).await.unwrap();
        rooms.add_member("room/abc123", "u1").await.unwrap();

        let room = rooms
            .set_member_role("room/abc123", "u1", RoomRole::Remote)
            .await
            .unwrap();
        assert_eq!(room.role_of("u1"), Some(RoomRole::Remote));

        let room = rooms.remove_member("room/abc123", "u1").await.unwrap();
        assert_eq!(room.role_of("u1"), None);
    }

    #[tokio::test]
    async fn roles_are_only_given_to_members() {
        let rooms = manager().await;
        rooms.create_room(spec("room/abc123", "XYZ1")).await.unwrap();

        let err = rooms
            .set_member_role("room/abc123", "u1", RoomRole::Admin)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CollabError::NotFound {
                resource: "member",
                ..
            }
        ));

        let room = rooms.room_by_url("room/abc123").await.unwrap().unwrap();
        assert!(room.roles.is_empty());

        let err = rooms
            .set_member_role("room/missing", "u1", RoomRole::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, CollabError::NotFound { resource: "room", .. }));
    }

    #[tokio::test]
    async fn owner_display_name_is_the_global_name() {
        let rooms = manager().await;

        assert_eq!(
            rooms.owner_display_name("owner").await.unwrap(),
            "Global owner"
        );
        assert!(rooms
            .owner_display_name("ghost")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn video_access_is_limited_to_owner_and_members() {
        let rooms = manager().await;
        rooms.create_room(spec("room/abc123", "XYZ1")).await.unwrap();
        rooms.add_member("room/abc123", "u1").await.unwrap();

        for (user, expected) in [
            ("owner", AccessDecision::Allow),
            ("u1", AccessDecision::Allow),
            ("u2", AccessDecision::Deny),
        ] {
            let decision = rooms
                .check_owner_video_access("room/abc123", user)
                .await
                .unwrap();

            assert_eq!(decision, expected, "access for {}", user);
        }

        assert_eq!(
            rooms
                .check_owner_video_access("room/missing", "owner")
                .await
                .unwrap(),
            AccessDecision::Deny
        );
    }
}
