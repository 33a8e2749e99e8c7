use anyhow::Result;

use crate::security;
use crate::storage::{SharedStore, User};

/// A username+password pair submitted to the local login/registration forms.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// The single-use code handed back by the identity provider's callback.
#[derive(Debug, Clone)]
pub struct AuthorizationCode(pub String);

/// Pluggable authentication strategy: each variant resolves its own request
/// shape to a stored user, or fails.
#[allow(async_fn_in_trait)]
pub trait Authenticator: Send + Sync {
    type Request;

    async fn authenticate(&self, req: &Self::Request) -> Result<User>;
}

/// Username+password strategy backed by the credential verifier.
pub struct LocalAuthenticator {
    store: SharedStore,
}

impl LocalAuthenticator {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

impl Authenticator for LocalAuthenticator {
    type Request = Credentials;

    async fn authenticate(&self, req: &Credentials) -> Result<User> {
        security::verify(&self.store, &req.username, &req.password)
    }
}
