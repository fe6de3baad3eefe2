use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::{
    postgres::PgPoolOptions, query, query_as, types::Json, Error as SqlxError, FromRow, PgPool,
    Postgres,
};

use crate::{
    ChatData, ChatEntry, Config, Database, DatabaseError, DatabaseResult, IntoDatabaseError,
    NewRoom, NewUser, NewVideo, Result, RoomData, RoomId, RoomRole, RoomUpdate, UpdatedUser,
    UserData, VideoData,
};

/// A postgres database implementation for watchroom
pub struct PgDatabase {
    pool: PgPool,
}

#[derive(FromRow)]
struct UserRow {
    user_id: String,
    discord_id: String,
    email: String,
    name: String,
    global_name: String,
    avatar: Option<String>,
    refresh_token: String,
    session_token: Option<String>,
    role: String,
}

#[derive(FromRow)]
struct VideoRow {
    video_id: String,
    owner: String,
    name: String,
    duration: Option<i32>,
    url: String,
}

#[derive(FromRow)]
struct RoomRow {
    id: i32,
    url: String,
    name: String,
    owner: String,
    code: String,
    members: Vec<String>,
    roles: Json<BTreeMap<String, RoomRole>>,
    queue: Vec<String>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ChatEntryRow {
    user_id: String,
    message: String,
    display_name: String,
    sent_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserData {
    type Error = DatabaseError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(UserData {
            role: row
                .role
                .parse()
                .map_err(|e| DatabaseError::Internal(Box::new(e)))?,
            user_id: row.user_id,
            discord_id: row.discord_id,
            email: row.email,
            name: row.name,
            global_name: row.global_name,
            avatar: row.avatar,
            refresh_token: row.refresh_token,
            session_token: row.session_token,
        })
    }
}

impl From<VideoRow> for VideoData {
    fn from(row: VideoRow) -> Self {
        VideoData {
            video_id: row.video_id,
            owner: row.owner,
            name: row.name,
            duration: row.duration.and_then(|d| u32::try_from(d).ok()),
            url: row.url,
        }
    }
}

impl From<RoomRow> for RoomData {
    fn from(row: RoomRow) -> Self {
        RoomData {
            id: row.id,
            url: row.url,
            name: row.name,
            owner: row.owner,
            code: row.code,
            members: row.members,
            roles: row.roles.0,
            queue: row.queue,
            created_at: row.created_at,
        }
    }
}

impl From<ChatEntryRow> for ChatEntry {
    fn from(row: ChatEntryRow) -> Self {
        ChatEntry {
            user_id: row.user_id,
            message: row.message,
            display_name: row.display_name,
            sent_at: row.sent_at,
        }
    }
}

impl PgDatabase {
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| e.any())?;

        Ok(Self { pool })
    }

    /// Applies pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        info!("Database migrations are up to date");
        Ok(())
    }

    /// Checks that the database can be reached
    pub async fn ping(&self) -> Result<()> {
        query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    pub async fn close(&self) {
        self.pool.close().await
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: &str) -> Result<UserData> {
        query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "user_id"))?
            .try_into()
    }

    async fn user_by_discord_id(&self, discord_id: &str) -> Result<UserData> {
        query_as::<_, UserRow>("SELECT * FROM users WHERE discord_id = $1")
            .bind(discord_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "discord_id"))?
            .try_into()
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_discord_id(&new_user.discord_id)
            .await
            .conflict_or_ok("user", "discord_id", &new_user.discord_id)?;

        query_as::<_, UserRow>(
            "
            INSERT INTO users (
                user_id, discord_id, email, name, global_name,
                avatar, refresh_token, session_token, role
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *",
        )
        .bind(&new_user.user_id)
        .bind(&new_user.discord_id)
        .bind(&new_user.email)
        .bind(&new_user.name)
        .bind(&new_user.global_name)
        .bind(&new_user.avatar)
        .bind(&new_user.refresh_token)
        .bind(&new_user.session_token)
        .bind(new_user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            e.conflict_or(
                "user",
                &[
                    ("user_id", new_user.user_id.as_str()),
                    ("discord_id", new_user.discord_id.as_str()),
                    ("email", new_user.email.as_str()),
                ],
            )
        })?
        .try_into()
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        let email = updated_user.email.clone().unwrap_or_default();

        query_as::<_, UserRow>(
            "
            UPDATE users SET
                email = COALESCE($2, email),
                name = COALESCE($3, name),
                global_name = COALESCE($4, global_name),
                avatar = COALESCE($5, avatar),
                refresh_token = COALESCE($6, refresh_token),
                session_token = COALESCE($7, session_token),
                role = COALESCE($8, role)
            WHERE user_id = $1
            RETURNING *",
        )
        .bind(&updated_user.user_id)
        .bind(updated_user.email)
        .bind(updated_user.name)
        .bind(updated_user.global_name)
        .bind(updated_user.avatar)
        .bind(updated_user.refresh_token)
        .bind(updated_user.session_token)
        .bind(updated_user.role.map(|r| r.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.conflict_or("user", &[("email", email.as_str())]))?
        .ok_or(DatabaseError::NotFound {
            resource: "user",
            identifier: "user_id",
        })?
        .try_into()
    }

    async fn video_by_id(&self, video_id: &str) -> Result<VideoData> {
        query_as::<_, VideoRow>("SELECT * FROM videos WHERE video_id = $1")
            .bind(video_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("video", "video_id"))
    }

    async fn list_videos_by_owner(&self, owner: &str) -> Result<Vec<VideoData>> {
        query_as::<_, VideoRow>("SELECT * FROM videos WHERE owner = $1 ORDER BY created_at")
            .bind(owner)
            .fetch_all(&self.pool)
            .await
            .map(|rows| rows.into_iter().map(Into::into).collect())
            .map_err(|e| e.any())
    }

    async fn create_video(&self, new_video: NewVideo) -> Result<VideoData> {
        let duration = new_video
            .duration
            .map(i32::try_from)
            .transpose()
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        query_as::<_, VideoRow>(
            "
            INSERT INTO videos (video_id, owner, name, duration, url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING video_id, owner, name, duration, url",
        )
        .bind(&new_video.video_id)
        .bind(&new_video.owner)
        .bind(&new_video.name)
        .bind(duration)
        .bind(&new_video.url)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.conflict_or("video", &[("video_id", new_video.video_id.as_str())]))
    }

    async fn room_by_id(&self, room_id: RoomId) -> Result<RoomData> {
        query_as::<_, RoomRow>("SELECT * FROM rooms WHERE id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("room", "id"))
    }

    async fn room_by_url(&self, url: &str) -> Result<RoomData> {
        query_as::<_, RoomRow>("SELECT * FROM rooms WHERE url = $1")
            .bind(url)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("room", "url"))
    }

    async fn room_by_code(&self, code: &str) -> Result<RoomData> {
        query_as::<_, RoomRow>("SELECT * FROM rooms WHERE code = $1")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("room", "code"))
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        self.room_by_url(&new_room.url)
            .await
            .conflict_or_ok("room", "url", &new_room.url)?;

        self.room_by_code(&new_room.code)
            .await
            .conflict_or_ok("room", "code", &new_room.code)?;

        // The unique indexes still catch rooms inserted between the checks and the insert
        query_as::<_, RoomRow>(
            "
            INSERT INTO rooms (url, name, owner, code, members, roles, queue)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *",
        )
        .bind(&new_room.url)
        .bind(&new_room.name)
        .bind(&new_room.owner)
        .bind(&new_room.code)
        .bind(&new_room.members)
        .bind(Json(&new_room.roles))
        .bind(&new_room.queue)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| {
            e.conflict_or(
                "room",
                &[("url", new_room.url.as_str()), ("code", new_room.code.as_str())],
            )
        })
    }

    async fn update_room(&self, url: &str, update: RoomUpdate) -> Result<RoomData> {
        let statement = match &update {
            RoomUpdate::PushMember(user_id) => query_as::<Postgres, RoomRow>(
                "UPDATE rooms SET members = array_append(members, $2) WHERE url = $1 RETURNING *",
            )
            .bind(url)
            .bind(user_id),
            RoomUpdate::PullMember(user_id) => query_as::<Postgres, RoomRow>(
                "
                UPDATE rooms SET
                    members = array_remove(members, $2),
                    roles = roles - $2
                WHERE url = $1
                RETURNING *",
            )
            .bind(url)
            .bind(user_id),
            RoomUpdate::SetRole(user_id, role) => query_as::<Postgres, RoomRow>(
                "
                UPDATE rooms SET roles = roles || jsonb_build_object($2::text, $3::text)
                WHERE url = $1 AND $2 = ANY(members)
                RETURNING *",
            )
            .bind(url)
            .bind(user_id)
            .bind(role.as_str()),
            RoomUpdate::PushVideo(video_id) => query_as::<Postgres, RoomRow>(
                "UPDATE rooms SET queue = array_append(queue, $2) WHERE url = $1 RETURNING *",
            )
            .bind(url)
            .bind(video_id),
        };

        let row = statement
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if let Some(row) = row {
            return Ok(row.into());
        }

        // Roles are only set for members, so the room may exist without the user in it
        if let RoomUpdate::SetRole(..) = update {
            self.room_by_url(url).await?;

            return Err(DatabaseError::NotFound {
                resource: "member",
                identifier: "user_id",
            });
        }

        Err(DatabaseError::NotFound {
            resource: "room",
            identifier: "url",
        })
    }

    async fn delete_room_by_url(&self, url: &str) -> Result<u64> {
        query("DELETE FROM rooms WHERE url = $1")
            .bind(url)
            .execute(&self.pool)
            .await
            .map(|r| r.rows_affected())
            .map_err(|e| e.any())
    }

    async fn chat_by_room_id(&self, room_id: RoomId) -> Result<ChatData> {
        query("SELECT room_id FROM chats WHERE room_id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("chat", "room_id"))?;

        let entries = query_as::<_, ChatEntryRow>(
            "
            SELECT user_id, message, display_name, sent_at
            FROM chat_entries
            WHERE room_id = $1
            ORDER BY id",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(Into::into)
        .collect();

        Ok(ChatData { room_id, entries })
    }

    async fn create_chat(&self, room_id: RoomId, welcome: ChatEntry) -> Result<ChatData> {
        let mut transaction = self.pool.begin().await.map_err(|e| e.any())?;

        let created = query("INSERT INTO chats (room_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(room_id)
            .execute(&mut *transaction)
            .await
            .map_err(|e| e.any())?
            .rows_affected();

        if created == 0 {
            return Err(DatabaseError::Conflict {
                resource: "chat",
                field: "room_id",
                value: room_id.to_string(),
            });
        }

        insert_chat_entry(&mut *transaction, room_id, &welcome).await?;
        transaction.commit().await.map_err(|e| e.any())?;

        Ok(ChatData {
            room_id,
            entries: vec![welcome],
        })
    }

    async fn append_chat_entry(&self, room_id: RoomId, entry: ChatEntry) -> Result<ChatEntry> {
        insert_chat_entry(&self.pool, room_id, &entry).await?;

        Ok(entry)
    }
}

async fn insert_chat_entry<'e, E>(executor: E, room_id: RoomId, entry: &ChatEntry) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    query(
        "
        INSERT INTO chat_entries (room_id, user_id, message, display_name, sent_at)
        VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(room_id)
    .bind(&entry.user_id)
    .bind(&entry.message)
    .bind(&entry.display_name)
    .bind(entry.sent_at)
    .execute(executor)
    .await
    .map_err(|e| match e {
        // Entries reference their chat, so a missing chat shows up as a foreign key violation
        SqlxError::Database(ref db) if db.is_foreign_key_violation() => DatabaseError::NotFound {
            resource: "chat",
            identifier: "room_id",
        },
        e => e.any(),
    })
    .map(|_| ())
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        match self {
            SqlxError::Io(_)
            | SqlxError::Tls(_)
            | SqlxError::PoolTimedOut
            | SqlxError::PoolClosed
            | SqlxError::WorkerCrashed => DatabaseError::Unavailable(self.to_string()),
            e => DatabaseError::Internal(Box::new(e)),
        }
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }

    fn conflict_or(self, resource: &'static str, fields: &[(&'static str, &str)]) -> DatabaseError {
        let SqlxError::Database(ref db) = self else {
            return self.any();
        };

        if !db.is_unique_violation() {
            return self.any();
        }

        // Constraints are named `<table>_<column>_key`
        let constraint = db.constraint().unwrap_or_default();
        let (field, value) = fields
            .iter()
            .find(|(field, _)| constraint.contains(field))
            .or(fields.first())
            .copied()
            .unwrap_or(("id", ""));

        DatabaseError::Conflict {
            resource,
            field,
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use sqlx::Error as SqlxError;

    use crate::{CollabError, DatabaseError, IntoDatabaseError};

    #[test]
    fn connection_failures_make_the_store_unavailable() {
        let failures = [
            SqlxError::PoolTimedOut,
            SqlxError::PoolClosed,
            SqlxError::WorkerCrashed,
            SqlxError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")),
        ];

        for failure in failures {
            let error = failure.any();
            assert!(matches!(error, DatabaseError::Unavailable(_)));
            assert!(matches!(
                CollabError::from(error),
                CollabError::StoreUnavailable(_)
            ));
        }
    }

    #[test]
    fn missing_rows_are_not_found() {
        let error = SqlxError::RowNotFound.not_found_or("room", "url");

        assert!(matches!(
            error,
            DatabaseError::NotFound {
                resource: "room",
                identifier: "url"
            }
        ));
        assert!(CollabError::from(error).is_not_found());
    }

    #[test]
    fn unavailability_is_kept_on_lookups() {
        let error = SqlxError::PoolTimedOut.not_found_or("room", "url");

        assert!(matches!(error, DatabaseError::Unavailable(_)));
    }

    #[test]
    fn other_failures_are_internal() {
        let error = SqlxError::ColumnNotFound("code".to_string()).any();
        assert!(matches!(error, DatabaseError::Internal(_)));

        let error = SqlxError::Protocol("bad message".to_string())
            .conflict_or("room", &[("url", "room/abc123")]);
        assert!(matches!(CollabError::from(error), CollabError::Internal(_)));
    }
}
