//! Gravatar and Libravatar, addressed by SHA-256 of the email.

use sha2::{Digest, Sha256};

use super::Provider;

/// Hex SHA-256 of the trimmed, lowercased address.
#[must_use]
pub fn email_hash(email: &str) -> String {
    hex::encode(Sha256::digest(email.trim().to_lowercase().as_bytes()))
}

pub(super) fn url(provider: Provider, email: &str) -> Option<String> {
    let hash = email_hash(email);
    match provider {
        Provider::Gravatar => Some(format!("https://www.gravatar.com/avatar/{hash}?d=404")),
        Provider::Libravatar => Some(format!(
            "https://seccdn.libravatar.org/avatar/{hash}?d=404"
        )),
        _ => None,
    }
}
