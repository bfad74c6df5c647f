use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 3;
pub const MAX_CAPTION_LENGTH: usize = 5000;
pub const MAX_COMMENT_LENGTH: usize = 1000;
pub const MAX_BIO_LENGTH: usize = 500;
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
pub const POSTS_PER_PAGE: usize = 20;

pub const USERS_LIST_KEY: &str = "users_list";
pub const FEED_KEY: &str = "feed";
pub const UPLOADS_PREFIX: &str = "/uploads/";

pub fn token_expiration_hours() -> i64 {
    env::var("CHORUS_TOKEN_EXPIRATION_HOURS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(24)
}

pub fn user_key(user_id: &str) -> String {
    format!("user:{}", user_id)
}

pub fn email_key(email: &str) -> String {
    format!("email:{}", email.to_lowercase())
}

pub fn username_key(username: &str) -> String {
    format!("username:{}", username.to_lowercase())
}

pub fn post_key(post_id: &str) -> String {
    format!("post:{}", post_id)
}

pub fn likes_key(post_id: &str) -> String {
    format!("likes:{}", post_id)
}

pub fn post_comments_key(post_id: &str) -> String {
    format!("post_comments:{}", post_id)
}

pub fn comment_key(comment_id: &str) -> String {
    format!("comment:{}", comment_id)
}

pub fn following_key(user_id: &str) -> String {
    format!("following:{}", user_id)
}

pub fn followers_key(user_id: &str) -> String {
    format!("followers:{}", user_id)
}

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

pub fn upload_key(name: &str) -> String {
    format!("upload:{}", name)
}

/// Settings for the native development server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub seed_demo: bool,
}

impl ServerConfig {
    pub fn load() -> Self {
        Self {
            host: try_load("CHORUS_HOST", "0.0.0.0"),
            port: try_load("CHORUS_PORT", "3000"),
            seed_demo: try_load("CHORUS_SEED_DEMO", "false"),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    match raw.parse() {
        Ok(value) => value,
        Err(e) => {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            match default.parse() {
                Ok(value) => value,
                Err(e) => panic!("default for {key} does not parse: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(user_key("abc"), "user:abc");
        assert_eq!(post_comments_key("p1"), "post_comments:p1");
        assert_eq!(email_key("Alice@X.com"), "email:alice@x.com");
        assert_eq!(username_key("Bob"), "username:bob");
    }

    #[test]
    fn try_load_falls_back_on_garbage() {
        env::set_var("CHORUS_TEST_PORT_GARBAGE", "not-a-port");
        let port: u16 = try_load("CHORUS_TEST_PORT_GARBAGE", "3000");
        assert_eq!(port, 3000);
    }
}
