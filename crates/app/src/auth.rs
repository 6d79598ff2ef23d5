use marketwire_realtime::TokenSource;
use tokio::sync::watch;

/// What the auth layer currently knows about the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub authenticated: bool,
    /// Registration finished and the account is verified.
    pub verified: bool,
    pub user_id: Option<String>,
    pub token: Option<String>,
}

impl AuthSnapshot {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: Option<String>, token: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            verified: true,
            user_id,
            token: Some(token.into()),
        }
    }

    /// Feature handlers run only for authenticated, verified users.
    pub fn is_active(&self) -> bool {
        self.authenticated && self.verified
    }
}

/// Observable auth state shared by the session.
#[derive(Debug)]
pub struct AuthState {
    snapshot: watch::Sender<AuthSnapshot>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new(AuthSnapshot::signed_out())
    }
}

impl AuthState {
    pub fn new(initial: AuthSnapshot) -> Self {
        let (snapshot, _) = watch::channel(initial);
        Self { snapshot }
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn set(&self, snapshot: AuthSnapshot) {
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.snapshot.subscribe()
    }
}

impl TokenSource for AuthState {
    fn token(&self) -> Option<String> {
        let snapshot = self.snapshot.borrow();
        if !snapshot.authenticated {
            return None;
        }
        snapshot.token.clone()
    }
}
