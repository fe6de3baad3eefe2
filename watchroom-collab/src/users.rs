use log::info;

use crate::{
    util::random_string, CollabContext, CollabError, CollabResult, Database, DatabaseResult,
    NewUser, SiteRole, UpdatedUser, UserData,
};

/// Length of issued user ids
pub const USER_ID_LENGTH: usize = 24;

/// What the identity provider tells us about a user when they log in
#[derive(Debug, Clone)]
pub struct Login {
    pub discord_id: String,
    pub email: String,
    pub name: String,
    pub global_name: String,
    pub avatar: Option<String>,
    pub refresh_token: String,
    pub session_token: Option<String>,
}

pub struct UserRegistry<Db> {
    context: CollabContext<Db>,
}

impl<Db> UserRegistry<Db>
where
    Db: Database,
{
    pub fn new(context: &CollabContext<Db>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates the user on their first login, and refreshes their details on every later one
    pub async fn register_login(&self, login: Login) -> CollabResult<UserData> {
        login.validate()?;

        let database = &self.context.database;
        let existing = database
            .user_by_discord_id(&login.discord_id)
            .await
            .optional()?;

        let user = match existing {
            Some(user) => {
                database
                    .update_user(UpdatedUser {
                        user_id: user.user_id,
                        email: Some(login.email),
                        name: Some(login.name),
                        global_name: Some(login.global_name),
                        avatar: login.avatar,
                        refresh_token: Some(login.refresh_token),
                        session_token: login.session_token,
                        role: None,
                    })
                    .await?
            }
            None => {
                let user = database
                    .create_user(NewUser {
                        user_id: random_string(USER_ID_LENGTH),
                        discord_id: login.discord_id,
                        email: login.email,
                        name: login.name,
                        global_name: login.global_name,
                        avatar: login.avatar,
                        refresh_token: login.refresh_token,
                        session_token: login.session_token,
                        role: SiteRole::default(),
                    })
                    .await?;

                info!("User {} registered as {}", user.global_name, user.user_id);
                user
            }
        };

        Ok(user)
    }

    /// Returns a user if it exists
    pub async fn user(&self, user_id: &str) -> CollabResult<Option<UserData>> {
        Ok(self.context.database.user_by_id(user_id).await.optional()?)
    }

    pub async fn set_site_role(&self, user_id: &str, role: SiteRole) -> CollabResult<UserData> {
        let user = self
            .context
            .database
            .update_user(UpdatedUser {
                user_id: user_id.to_string(),
                role: Some(role),
                ..Default::default()
            })
            .await?;

        info!("User {} is now {}", user.user_id, role);
        Ok(user)
    }
}

impl Login {
    fn validate(&self) -> CollabResult<()> {
        if self.discord_id.trim().is_empty() {
            return Err(CollabError::validation("discord_id", "must not be empty"));
        }

        if !self.email.contains('@') {
            return Err(CollabError::validation("email", "must be an e-mail address"));
        }

        if self.refresh_token.is_empty() {
            return Err(CollabError::validation("refresh_token", "must not be empty"));
        }

        Ok(())
    }
}
