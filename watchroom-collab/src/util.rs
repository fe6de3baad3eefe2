use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, seq::SliceRandom, thread_rng, Rng};
use regex::Regex;

lazy_static! {
    /// Path-like room locators, such as `room/abc123`
    pub static ref ROOM_URL_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9_-]+(/[a-zA-Z0-9_-]+)*$").unwrap();
    pub static ref ROOM_CODE_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9]{1,16}$").unwrap();
}

pub fn random_string(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect()
}

/// Returns a random string made of characters from `alphabet`
pub fn random_string_from(alphabet: &[u8], length: usize) -> String {
    let mut rng = thread_rng();

    (0..length)
        .filter_map(|_| alphabet.choose(&mut rng))
        .map(|&c| c as char)
        .collect()
}

#[cfg(test)]
mod test {
    use super::{random_string, random_string_from, ROOM_CODE_REGEX, ROOM_URL_REGEX};

    #[test]
    fn random_strings_use_only_the_given_alphabet() {
        let value = random_string_from(b"ab", 64);

        assert_eq!(value.len(), 64);
        assert!(value.chars().all(|c| c == 'a' || c == 'b'));
        assert_eq!(random_string(24).len(), 24);
    }

    #[test]
    fn room_locators_are_path_like() {
        assert!(ROOM_URL_REGEX.is_match("room/abc123"));
        assert!(ROOM_URL_REGEX.is_match("movie-night"));
        assert!(!ROOM_URL_REGEX.is_match("room//abc"));
        assert!(!ROOM_URL_REGEX.is_match("/room"));
        assert!(!ROOM_URL_REGEX.is_match("room/a b"));

        assert!(ROOM_CODE_REGEX.is_match("XYZ1"));
        assert!(!ROOM_CODE_REGEX.is_match("XY Z1"));
        assert!(!ROOM_CODE_REGEX.is_match(""));
    }
}
