//! Central identity and session management for unified login across Confide.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod provider;
mod session;

pub mod google;

pub use google::{GoogleAuthenticator, GoogleOAuth, GoogleProfile};
pub use principal::{Attrs, Principal};
pub use provider::{Authenticator, AuthorizationCode, Credentials, LocalAuthenticator};
pub use session::{gen_token, Session, SessionManager, SessionToken};
