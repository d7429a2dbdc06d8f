use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::renewal::Session;
use crate::secret::XsrfToken;

/// Where the current anti-forgery token lives.
///
/// The client reads the token before each request and writes it whenever a
/// response or login issues a new one. Plug in a custom accessor to persist
/// the token (for example in a platform keychain).
pub trait TokenAccessor: Send + Sync + 'static {
    fn get_token(&self) -> Option<XsrfToken>;
    fn set_token(&self, token: Option<XsrfToken>);
}

/// Process-local token storage.
#[derive(Default)]
pub struct InMemoryTokens {
    token: RwLock<Option<XsrfToken>>,
}

impl InMemoryTokens {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenAccessor for InMemoryTokens {
    fn get_token(&self) -> Option<XsrfToken> {
        self.token.read().clone()
    }

    fn set_token(&self, token: Option<XsrfToken>) {
        *self.token.write() = token;
    }
}

/// Adapts a getter/setter closure pair into a [`TokenAccessor`].
pub struct FnTokenAccessor<G, S> {
    get: G,
    set: S,
}

impl<G, S> FnTokenAccessor<G, S>
where
    G: Fn() -> Option<XsrfToken> + Send + Sync + 'static,
    S: Fn(Option<XsrfToken>) + Send + Sync + 'static,
{
    pub fn new(get: G, set: S) -> Self {
        Self { get, set }
    }
}

impl<G, S> TokenAccessor for FnTokenAccessor<G, S>
where
    G: Fn() -> Option<XsrfToken> + Send + Sync + 'static,
    S: Fn(Option<XsrfToken>) + Send + Sync + 'static,
{
    fn get_token(&self) -> Option<XsrfToken> {
        (self.get)()
    }

    fn set_token(&self, token: Option<XsrfToken>) {
        (self.set)(token);
    }
}

/// Authentication state shared by every request of one signed-in user:
/// the XSRF token, the per-installation diagnostic id and the current
/// [`Session`].
///
/// Replaces a process-wide "current user": build one store per session and
/// hand it to the client explicitly.
pub struct AuthTokenStore {
    accessor: Arc<dyn TokenAccessor>,
    diagnostic_id: RwLock<Option<String>>,
    session: RwLock<Option<Session>>,
}

impl AuthTokenStore {
    pub fn new(accessor: impl TokenAccessor) -> Self {
        Self {
            accessor: Arc::new(accessor),
            diagnostic_id: RwLock::new(None),
            session: RwLock::new(None),
        }
    }

    /// Store backed by [`InMemoryTokens`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(InMemoryTokens::new())
    }

    #[must_use]
    pub fn with_diagnostic_id(self, id: impl Into<String>) -> Self {
        *self.diagnostic_id.write() = Some(id.into());
        self
    }

    #[must_use]
    pub fn token(&self) -> Option<XsrfToken> {
        self.accessor.get_token()
    }

    pub fn set_token(&self, token: Option<XsrfToken>) {
        self.accessor.set_token(token);
    }

    #[must_use]
    pub fn diagnostic_id(&self) -> Option<String> {
        self.diagnostic_id.read().clone()
    }

    pub fn set_diagnostic_id(&self, id: Option<String>) {
        *self.diagnostic_id.write() = id;
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    /// Install a freshly established session. Its token, when present,
    /// replaces the stored one.
    pub fn set_session(&self, session: Session) {
        if let Some(token) = &session.token {
            self.accessor.set_token(Some(token.clone()));
        }
        *self.session.write() = Some(session);
    }

    /// Forget the session and its token. The diagnostic id survives, it
    /// identifies the installation rather than the user.
    pub fn sign_out(&self) {
        *self.session.write() = None;
        self.accessor.set_token(None);
    }
}

impl Default for AuthTokenStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl fmt::Debug for AuthTokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokenStore")
            .field("has_token", &self.token().is_some())
            .field("diagnostic_id", &*self.diagnostic_id.read())
            .field("session", &*self.session.read())
            .finish()
    }
}
