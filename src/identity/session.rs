use std::collections::HashMap;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::RwLock;
use tracing::info;

use super::principal::Principal;

pub type SessionToken = String;

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub token: SessionToken,
    pub principal: Principal,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

#[derive(Debug)]
struct SessionEntry {
    session: Session,
}

/// 256-bit random token, base64url without padding. Used for session handles
/// and the OAuth anti-forgery state parameter.
pub fn gen_token() -> String {
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// Server-side session table. Tokens map to principals with a sliding idle
/// expiry: every successful resolve pushes the deadline forward by `ttl`.
/// The manager owns its map and is injected through shared application state.
pub struct SessionManager {
    ttl: Duration,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(60 * 60))
    }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, sessions: RwLock::new(HashMap::new()) }
    }

    pub fn issue(&self, principal: Principal) -> Session {
        let now = Instant::now();
        let sid = gen_token();
        let token = gen_token();
        let sess = Session {
            session_id: sid.clone(),
            token: token.clone(),
            principal: principal.clone(),
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.write().insert(token, SessionEntry { session: sess.clone() });
        info!(
            target: "confide::session",
            "session.issue user={} sid={} ttl_secs={}",
            principal.user_id, sid, self.ttl.as_secs()
        );
        sess
    }

    /// Resolve a token to its principal. Expired, destroyed and never-issued
    /// tokens all yield `None`, never an error; expired entries are evicted
    /// lazily here.
    pub fn resolve(&self, token: &str) -> Option<Principal> {
        let now = Instant::now();
        let mut map = self.sessions.write();
        match map.get_mut(token) {
            Some(ent) if ent.session.expires_at > now => {
                ent.session.expires_at = now + self.ttl;
                Some(ent.session.principal.clone())
            }
            Some(_) => {
                map.remove(token);
                None
            }
            None => None,
        }
    }

    /// Remove a session. Idempotent; returns whether anything was removed.
    pub fn destroy(&self, token: &str) -> bool {
        let removed = self.sessions.write().remove(token);
        if let Some(ent) = &removed {
            info!(
                target: "confide::session",
                "session.destroy user={} sid={}",
                ent.session.principal.user_id, ent.session.session_id
            );
        }
        removed.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_long_and_unique() {
        let a = gen_token();
        let b = gen_token();
        assert_ne!(a, b);
        // 32 bytes -> 43 chars of base64url without padding
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn test_issue_then_resolve() {
        let sm = SessionManager::default();
        let sess = sm.issue(Principal::new("u-1"));
        let principal = sm.resolve(&sess.token).expect("live session");
        assert_eq!(principal.user_id, "u-1");
    }

    #[test]
    fn test_unknown_and_destroyed_tokens_resolve_to_none() {
        let sm = SessionManager::default();
        assert!(sm.resolve("never-issued").is_none());

        let sess = sm.issue(Principal::new("u-1"));
        assert!(sm.destroy(&sess.token));
        assert!(sm.resolve(&sess.token).is_none());
        // destroy is idempotent
        assert!(!sm.destroy(&sess.token));
    }

    #[test]
    fn test_idle_expiry() {
        let sm = SessionManager::new(Duration::from_millis(80));
        let sess = sm.issue(Principal::new("u-1"));
        std::thread::sleep(Duration::from_millis(120));
        assert!(sm.resolve(&sess.token).is_none());
    }

    #[test]
    fn test_resolve_slides_expiry() {
        let sm = SessionManager::new(Duration::from_millis(150));
        let sess = sm.issue(Principal::new("u-1"));
        // Keep touching the session at intervals shorter than the ttl; the
        // cumulative elapsed time exceeds the ttl but each touch renews it.
        for _ in 0..3 {
            std::thread::sleep(Duration::from_millis(80));
            assert!(sm.resolve(&sess.token).is_some());
        }
        std::thread::sleep(Duration::from_millis(250));
        assert!(sm.resolve(&sess.token).is_none());
    }
}
