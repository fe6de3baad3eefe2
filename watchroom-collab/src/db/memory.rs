use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::{
    ChatData, ChatEntry, Database, DatabaseError, NewRoom, NewUser, NewVideo, Result, RoomData,
    RoomId, RoomUpdate, UpdatedUser, UserData, VideoData,
};

/// An in-process database, keeping every record in memory.
///
/// Each operation runs under a single lock, so updates are atomic the same way
/// the statements of [crate::PgDatabase] are.
#[derive(Default)]
pub struct MemoryDatabase {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    last_room_id: RoomId,
    users: HashMap<String, UserData>,
    /// Kept in insertion order
    videos: Vec<VideoData>,
    rooms: BTreeMap<RoomId, RoomData>,
    chats: HashMap<RoomId, ChatData>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn room_by_url_mut(&mut self, url: &str) -> Result<&mut RoomData> {
        self.rooms
            .values_mut()
            .find(|r| r.url == url)
            .ok_or(DatabaseError::NotFound {
                resource: "room",
                identifier: "url",
            })
    }

    fn ensure_unique_user(&self, discord_id: &str, email: &str) -> Result<()> {
        for user in self.users.values() {
            let conflict = if user.discord_id == discord_id {
                Some(("discord_id", discord_id))
            } else if user.email == email {
                Some(("email", email))
            } else {
                None
            };

            if let Some((field, value)) = conflict {
                return Err(DatabaseError::Conflict {
                    resource: "user",
                    field,
                    value: value.to_string(),
                });
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: &str) -> Result<UserData> {
        self.tables
            .lock()
            .users
            .get(user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "user_id",
            })
    }

    async fn user_by_discord_id(&self, discord_id: &str) -> Result<UserData> {
        self.tables
            .lock()
            .users
            .values()
            .find(|u| u.discord_id == discord_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "discord_id",
            })
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let mut tables = self.tables.lock();

        if tables.users.contains_key(&new_user.user_id) {
            return Err(DatabaseError::Conflict {
                resource: "user",
                field: "user_id",
                value: new_user.user_id,
            });
        }

        tables.ensure_unique_user(&new_user.discord_id, &new_user.email)?;

        let user = UserData {
            user_id: new_user.user_id,
            discord_id: new_user.discord_id,
            email: new_user.email,
            name: new_user.name,
            global_name: new_user.global_name,
            avatar: new_user.avatar,
            refresh_token: new_user.refresh_token,
            session_token: new_user.session_token,
            role: new_user.role,
        };

        tables.users.insert(user.user_id.clone(), user.clone());

        Ok(user)
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        let mut tables = self.tables.lock();

        if let Some(email) = &updated_user.email {
            let taken = tables
                .users
                .values()
                .any(|u| &u.email == email && u.user_id != updated_user.user_id);

            if taken {
                return Err(DatabaseError::Conflict {
                    resource: "user",
                    field: "email",
                    value: email.clone(),
                });
            }
        }

        let user = tables
            .users
            .get_mut(&updated_user.user_id)
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "user_id",
            })?;

        let UpdatedUser {
            user_id: _,
            email,
            name,
            global_name,
            avatar,
            refresh_token,
            session_token,
            role,
        } = updated_user;

        if let Some(email) = email {
            user.email = email;
        }
        if let Some(name) = name {
            user.name = name;
        }
        if let Some(global_name) = global_name {
            user.global_name = global_name;
        }
        if let Some(refresh_token) = refresh_token {
            user.refresh_token = refresh_token;
        }
        if avatar.is_some() {
            user.avatar = avatar;
        }
        if session_token.is_some() {
            user.session_token = session_token;
        }
        if let Some(role) = role {
            user.role = role;
        }

        Ok(user.clone())
    }

    async fn video_by_id(&self, video_id: &str) -> Result<VideoData> {
        self.tables
            .lock()
            .videos
            .iter()
            .find(|v| v.video_id == video_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "video",
                identifier: "video_id",
            })
    }

    async fn list_videos_by_owner(&self, owner: &str) -> Result<Vec<VideoData>> {
        Ok(self
            .tables
            .lock()
            .videos
            .iter()
            .filter(|v| v.owner == owner)
            .cloned()
            .collect())
    }

    async fn create_video(&self, new_video: NewVideo) -> Result<VideoData> {
        let mut tables = self.tables.lock();

        if tables.videos.iter().any(|v| v.video_id == new_video.video_id) {
            return Err(DatabaseError::Conflict {
                resource: "video",
                field: "video_id",
                value: new_video.video_id,
            });
        }

        let video = VideoData {
            video_id: new_video.video_id,
            owner: new_video.owner,
            name: new_video.name,
            duration: new_video.duration,
            url: new_video.url,
        };

        tables.videos.push(video.clone());

        Ok(video)
    }

    async fn room_by_id(&self, room_id: RoomId) -> Result<RoomData> {
        self.tables
            .lock()
            .rooms
            .get(&room_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "room",
                identifier: "id",
            })
    }

    async fn room_by_url(&self, url: &str) -> Result<RoomData> {
        self.tables
            .lock()
            .room_by_url_mut(url)
            .map(|r| r.clone())
    }

    async fn room_by_code(&self, code: &str) -> Result<RoomData> {
        self.tables
            .lock()
            .rooms
            .values()
            .find(|r| r.code == code)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "room",
                identifier: "code",
            })
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        let mut tables = self.tables.lock();

        for room in tables.rooms.values() {
            let conflict = if room.url == new_room.url {
                Some(("url", &new_room.url))
            } else if room.code == new_room.code {
                Some(("code", &new_room.code))
            } else {
                None
            };

            if let Some((field, value)) = conflict {
                return Err(DatabaseError::Conflict {
                    resource: "room",
                    field,
                    value: value.clone(),
                });
            }
        }

        tables.last_room_id += 1;

        let room = RoomData {
            id: tables.last_room_id,
            url: new_room.url,
            name: new_room.name,
            owner: new_room.owner,
            code: new_room.code,
            members: new_room.members,
            roles: new_room.roles,
            queue: new_room.queue,
            created_at: Utc::now(),
        };

        tables.rooms.insert(room.id, room.clone());

        Ok(room)
    }

    async fn update_room(&self, url: &str, update: RoomUpdate) -> Result<RoomData> {
        let mut tables = self.tables.lock();
        let room = tables.room_by_url_mut(url)?;

        if let RoomUpdate::SetRole(user_id, _) = &update {
            if !room.is_member(user_id) {
                return Err(DatabaseError::NotFound {
                    resource: "member",
                    identifier: "user_id",
                });
            }
        }

        room.apply(&update);

        Ok(room.clone())
    }

    async fn delete_room_by_url(&self, url: &str) -> Result<u64> {
        let mut tables = self.tables.lock();
        let before = tables.rooms.len();

        tables.rooms.retain(|_, r| r.url != url);

        Ok((before - tables.rooms.len()) as u64)
    }

    async fn chat_by_room_id(&self, room_id: RoomId) -> Result<ChatData> {
        self.tables
            .lock()
            .chats
            .get(&room_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "chat",
                identifier: "room_id",
            })
    }

    async fn create_chat(&self, room_id: RoomId, welcome: ChatEntry) -> Result<ChatData> {
        let mut tables = self.tables.lock();

        if tables.chats.contains_key(&room_id) {
            return Err(DatabaseError::Conflict {
                resource: "chat",
                field: "room_id",
                value: room_id.to_string(),
            });
        }

        let chat = ChatData {
            room_id,
            entries: vec![welcome],
        };

        tables.chats.insert(room_id, chat.clone());

        Ok(chat)
    }

    async fn append_chat_entry(&self, room_id: RoomId, entry: ChatEntry) -> Result<ChatEntry> {
        let mut tables = self.tables.lock();
        let chat = tables
            .chats
            .get_mut(&room_id)
            .ok_or(DatabaseError::NotFound {
                resource: "chat",
                identifier: "room_id",
            })?;

        chat.entries.push(entry.clone());

        Ok(entry)
    }
}
