use log::info;
use url::Url;

use crate::{
    util::random_string, CollabContext, CollabError, CollabResult, Database, DatabaseResult,
    NewVideo, UserId, VideoData, VideoId,
};

/// Length of issued video ids
pub const VIDEO_ID_LENGTH: usize = 16;
/// Longest duration in seconds a video can be registered with, bounded by the `INTEGER` column
pub const MAX_DURATION_SECS: u32 = i32::MAX as u32;

/// A video a user wants to register
#[derive(Debug, Clone)]
pub struct VideoSpec {
    /// Issued when left out
    pub video_id: Option<VideoId>,
    pub owner: UserId,
    pub name: String,
    pub duration: Option<u32>,
    pub url: String,
}

/// Registers and looks up the videos users bring to rooms
pub struct VideoLibrary<Db> {
    context: CollabContext<Db>,
}

impl<Db> VideoLibrary<Db>
where
    Db: Database,
{
    pub fn new(context: &CollabContext<Db>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn register_video(&self, spec: VideoSpec) -> CollabResult<VideoData> {
        if spec.name.trim().is_empty() {
            return Err(CollabError::validation("name", "must not be empty"));
        }

        Url::parse(&spec.url).map_err(|e| CollabError::validation("url", e.to_string()))?;

        if spec.duration.is_some_and(|d| d > MAX_DURATION_SECS) {
            return Err(CollabError::validation(
                "duration",
                format!("must be at most {} seconds", MAX_DURATION_SECS),
            ));
        }

        // Ensure the owner exists
        self.context.database.user_by_id(&spec.owner).await?;

        let video = self
            .context
            .database
            .create_video(NewVideo {
                video_id: spec
                    .video_id
                    .unwrap_or_else(|| random_string(VIDEO_ID_LENGTH)),
                owner: spec.owner,
                name: spec.name,
                duration: spec.duration,
                url: spec.url,
            })
            .await?;

        info!("Video {} registered by {}", video.name, video.owner);
        Ok(video)
    }

    pub async fn video(&self, video_id: &str) -> CollabResult<Option<VideoData>> {
        Ok(self
            .context
            .database
            .video_by_id(video_id)
            .await
            .optional()?)
    }

    pub async fn videos_by_owner(&self, owner: &str) -> CollabResult<Vec<VideoData>> {
        Ok(self.context.database.list_videos_by_owner(owner).await?)
    }
}
