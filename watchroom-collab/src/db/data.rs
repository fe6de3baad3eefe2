use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The type used for store-assigned primary keys.
pub type PrimaryKey = i32;
/// The id of a room, assigned by the store on creation.
pub type RoomId = PrimaryKey;
/// The internal, site-specific id of a user.
pub type UserId = String;
pub type VideoId = String;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{value:?} is not a valid {kind}")]
pub struct RoleParseError {
    pub kind: &'static str,
    pub value: String,
}

/// A user's global permission tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteRole {
    Admin,
    #[default]
    Basic,
    Tester,
    Privileged,
}

impl SiteRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Basic => "basic",
            Self::Tester => "tester",
            Self::Privileged => "privileged",
        }
    }
}

impl FromStr for SiteRole {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "basic" => Ok(Self::Basic),
            "tester" => Ok(Self::Tester),
            "privileged" => Ok(Self::Privileged),
            other => Err(RoleParseError {
                kind: "site role",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SiteRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The role a user holds inside a single room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomRole {
    /// Full control over the room
    Admin,
    Viewer,
    /// Allowed to drive playback for everyone else
    Remote,
}

impl RoomRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Viewer => "viewer",
            Self::Remote => "remote",
        }
    }
}

impl FromStr for RoomRole {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "viewer" => Ok(Self::Viewer),
            "remote" => Ok(Self::Remote),
            other => Err(RoleParseError {
                kind: "room role",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for RoomRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A watchroom account, created on the first login through the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub user_id: UserId,
    /// The id of the account at the external identity provider
    pub discord_id: String,
    pub email: String,
    pub name: String,
    pub global_name: String,
    pub avatar: Option<String>,
    pub refresh_token: String,
    pub session_token: Option<String>,
    pub role: SiteRole,
}

/// A video registered by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoData {
    pub video_id: VideoId,
    /// The user that registered the video
    pub owner: UserId,
    pub name: String,
    /// Length of the video in seconds, if known
    pub duration: Option<u32>,
    pub url: String,
}

/// A watch room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomData {
    pub id: RoomId,
    /// The unique shareable locator of the room
    pub url: String,
    pub name: String,
    pub owner: UserId,
    /// Short code used to join the room
    pub code: String,
    /// Members in join order. A user may appear more than once.
    pub members: Vec<UserId>,
    pub roles: BTreeMap<UserId, RoomRole>,
    /// Queued videos, played front to back
    pub queue: Vec<VideoId>,
    pub created_at: DateTime<Utc>,
}

impl RoomData {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }

    pub fn role_of(&self, user_id: &str) -> Option<RoomRole> {
        self.roles.get(user_id).copied()
    }

    /// Applies an update to this copy of the room.
    pub fn apply(&mut self, update: &RoomUpdate) {
        match update {
            RoomUpdate::PushMember(user_id) => self.members.push(user_id.clone()),
            RoomUpdate::PullMember(user_id) => {
                self.members.retain(|m| m != user_id);
                self.roles.remove(user_id);
            }
            RoomUpdate::SetRole(user_id, role) => {
                self.roles.insert(user_id.clone(), *role);
            }
            RoomUpdate::PushVideo(video_id) => self.queue.push(video_id.clone()),
        }
    }
}

/// A single mutation of a room. Every variant is applied by the store as one atomic update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomUpdate {
    /// Appends a user to the member list
    PushMember(UserId),
    /// Removes every occurrence of a user from the member list, along with their role
    PullMember(UserId),
    SetRole(UserId, RoomRole),
    /// Appends a video to the tail of the queue
    PushVideo(VideoId),
}

/// A message in a chat log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub user_id: UserId,
    pub message: String,
    /// The name of the sender at the time the message was sent
    pub display_name: String,
    pub sent_at: DateTime<Utc>,
}

/// The chat log of a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatData {
    pub room_id: RoomId,
    pub entries: Vec<ChatEntry>,
}
