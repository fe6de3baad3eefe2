use crate::{util::random_string_from, Config};

/// Characters used in join codes. Leaves out 0/O and 1/I, which are easy to mix up when read aloud.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const URL_TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
pub const URL_TOKEN_LENGTH: usize = 12;

/// Produces the random part of issued identifiers
pub trait TokenSource: Send + Sync {
    fn token(&self, alphabet: &'static [u8], length: usize) -> String;
}

/// Draws tokens from the thread-local rng
pub struct RandomTokens;

impl TokenSource for RandomTokens {
    fn token(&self, alphabet: &'static [u8], length: usize) -> String {
        random_string_from(alphabet, length)
    }
}

/// Issues shareable urls and join codes for new rooms.
///
/// Room ids are left to the store. Issued values are only candidates: the room manager
/// inserts them and asks for new ones if the store reports a collision, at most
/// [CodeIssuer::max_attempts] times.
pub struct CodeIssuer {
    source: Box<dyn TokenSource>,
    url_prefix: String,
    code_length: usize,
    max_attempts: usize,
}

impl CodeIssuer {
    pub fn new(config: &Config) -> Self {
        Self::with_source(config, RandomTokens)
    }

    pub fn with_source<S>(config: &Config, source: S) -> Self
    where
        S: TokenSource + 'static,
    {
        Self {
            source: Box::new(source),
            url_prefix: config.room_url_prefix.clone(),
            code_length: config.code_length,
            max_attempts: config.max_issue_attempts,
        }
    }

    pub fn issue_url(&self) -> String {
        let token = self.source.token(URL_TOKEN_ALPHABET, URL_TOKEN_LENGTH);

        format!("{}{}", self.url_prefix, token)
    }

    pub fn issue_code(&self) -> String {
        self.source.token(CODE_ALPHABET, self.code_length)
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }
}
