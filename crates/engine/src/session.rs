use std::sync::{Arc, PoisonError, RwLock};

use api_types::auth::{AuthSession, UserId};

/// Authentication state as seen by the client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Session {
    #[default]
    Anonymous,
    Authenticated(AuthSession),
}

impl Session {
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(auth) => Some(&auth.user.id),
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(auth) => Some(auth.access_token.as_str()),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

impl From<Option<AuthSession>> for Session {
    fn from(value: Option<AuthSession>) -> Self {
        value.map_or(Self::Anonymous, Self::Authenticated)
    }
}

/// Shared handle on the current [`Session`].
///
/// The sync layer reads it at the start of every operation; the presentation
/// replaces it on sign in and sign out.
#[derive(Clone, Debug, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Session>>,
}

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(RwLock::new(session)),
        }
    }

    /// Returns a copy of the current session.
    pub fn current(&self) -> Session {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, session: Session) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    pub fn sign_in(&self, auth: AuthSession) {
        tracing::debug!(user = %auth.user.id, "session established");
        self.set(Session::Authenticated(auth));
    }

    pub fn sign_out(&self) {
        tracing::debug!("session cleared");
        self.set(Session::Anonymous);
    }
}

#[cfg(test)]
mod tests {
    use api_types::auth::User;

    use super::*;

    fn auth(user: &str) -> AuthSession {
        AuthSession {
            access_token: format!("token-{user}"),
            refresh_token: None,
            expires_at: None,
            user: User {
                id: UserId::from(user),
                email: None,
            },
        }
    }

    #[test]
    fn clones_share_the_same_session() {
        let ctx = SessionContext::default();
        let other = ctx.clone();
        assert_eq!(ctx.current(), Session::Anonymous);

        other.sign_in(auth("alice"));
        assert_eq!(ctx.current().user_id(), Some(&UserId::from("alice")));
        assert_eq!(ctx.current().access_token(), Some("token-alice"));

        ctx.sign_out();
        assert!(!other.current().is_authenticated());
    }
}
