use sha2::{Digest, Sha256};

pub const GRAVATAR_BASE_URL: &str = "https://www.gravatar.com/avatar";

/// Resolves a person's avatar image from their e-mail address.
pub trait AvatarSource: Send + Sync {
    fn avatar_url(&self, email: &str) -> Option<String>;
}

pub struct NoAvatars;

impl AvatarSource for NoAvatars {
    fn avatar_url(&self, _email: &str) -> Option<String> {
        None
    }
}

pub struct Gravatar {
    pub base_url: String,
    pub size: u32,
}

impl Default for Gravatar {
    fn default() -> Self {
        Gravatar {
            base_url: GRAVATAR_BASE_URL.into(),
            size: 48,
        }
    }
}

impl AvatarSource for Gravatar {
    fn avatar_url(&self, email: &str) -> Option<String> {
        let normalized = email.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        let hash = hex::encode(Sha256::digest(normalized.as_bytes()));
        Some(format!("{}/{}?s={}&d=mm", self.base_url, hash, self.size))
    }
}
