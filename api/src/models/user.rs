//! User models

use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

/// Deployment owner
#[derive(Debug)]
pub struct User {
    pub id: Uuid,

    pub email: String,

    /// Source-control access token handed to the workers for cloning
    pub token: Option<SecretString>,
}

impl User {
    pub fn new(email: impl Into<String>, token: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            token: token.map(SecretString::from),
        }
    }
}

impl Clone for User {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            email: self.email.clone(),
            token: self
                .token
                .as_ref()
                .map(|token| SecretString::from(token.expose_secret().to_owned())),
        }
    }
}
