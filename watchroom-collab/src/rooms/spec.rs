use std::collections::BTreeMap;

use crate::{
    util::{ROOM_CODE_REGEX, ROOM_URL_REGEX},
    CollabError, CollabResult, RoomRole, UserId, VideoId,
};

/// The longest accepted room url
pub const MAX_URL_LENGTH: usize = 128;

/// Everything needed to create a room. The url and code are issued when left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSpec {
    pub name: String,
    /// The user that owns the new room
    pub owner: UserId,
    pub url: Option<String>,
    pub code: Option<String>,
    pub members: Vec<UserId>,
    pub roles: BTreeMap<UserId, RoomRole>,
    pub queue: Vec<VideoId>,
}

/// Whether a user may access what is played in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny,
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl RoomSpec {
    pub fn new(name: impl Into<String>, owner: impl Into<UserId>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            url: None,
            code: None,
            members: vec![],
            roles: BTreeMap::new(),
            queue: vec![],
        }
    }

    pub fn validate(&self) -> CollabResult<()> {
        if self.name.trim().is_empty() {
            return Err(CollabError::validation("name", "must not be empty"));
        }

        if self.owner.trim().is_empty() {
            return Err(CollabError::validation("owner", "must not be empty"));
        }

        if let Some(url) = &self.url {
            if url.len() > MAX_URL_LENGTH || !ROOM_URL_REGEX.is_match(url) {
                return Err(CollabError::validation(
                    "url",
                    format!("{:?} is not a valid room url", url),
                ));
            }
        }

        if let Some(code) = &self.code {
            if !ROOM_CODE_REGEX.is_match(code) {
                return Err(CollabError::validation(
                    "code",
                    format!("{:?} must be 1 to 16 letters or digits", code),
                ));
            }
        }

        if self.members.iter().any(|m| m.trim().is_empty()) {
            return Err(CollabError::validation("members", "must not contain empty ids"));
        }

        if let Some(user_id) = self.roles.keys().find(|u| !self.members.contains(u)) {
            return Err(CollabError::validation(
                "roles",
                format!("{} is not a member of the room", user_id),
            ));
        }

        Ok(())
    }

    /// Returns true if the value of `field` is issued rather than supplied by the caller
    pub(super) fn is_issued(&self, field: &str) -> bool {
        match field {
            "url" => self.url.is_none(),
            "code" => self.code.is_none(),
            _ => false,
        }
    }
}
