//! Authentication: a provider seam over the hosted password-auth service and a
//! session holder that tracks the signed-in user and notifies subscribers.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{info, warn};

pub mod remote;

pub use remote::RemoteAuth;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid login credentials: {0}")]
    InvalidCredentials(String),
    #[error("Missing or invalid access token")]
    InvalidToken,
    #[error("Not signed in")]
    NotSignedIn,
    #[error("Auth service returned {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("Auth request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Snapshot handed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub user: Option<User>,
    pub loading: bool,
}

impl AuthState {
    fn loading() -> Self {
        Self {
            is_authenticated: false,
            user: None,
            loading: true,
        }
    }

    fn signed_out() -> Self {
        Self {
            is_authenticated: false,
            user: None,
            loading: false,
        }
    }

    fn signed_in(user: User) -> Self {
        Self {
            is_authenticated: true,
            user: Some(user),
            loading: false,
        }
    }
}

/// Hosted password auth.
pub trait AuthProvider: Send + Sync + 'static {
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Session, AuthError>> + Send;

    fn sign_out(&self, access_token: &str) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Resolves the user behind an access token; `InvalidToken` when it is not valid.
    fn user_for_token(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<User, AuthError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&AuthState) + Send + Sync>;

struct SessionSlot {
    state: AuthState,
    session: Option<Session>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_id: u64,
}

/// Holds the current session for one client and fans state changes out to
/// subscribers. Starts in the loading state until [`AuthService::restore`]
/// or a sign-in settles it.
pub struct AuthService<P> {
    provider: P,
    slot: Mutex<SessionSlot>,
}

impl<P: AuthProvider> AuthService<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            slot: Mutex::new(SessionSlot {
                state: AuthState::loading(),
                session: None,
                listeners: Vec::new(),
                next_id: 0,
            }),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn lock(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> AuthState {
        self.lock().state.clone()
    }

    pub fn session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().session.as_ref().map(|s| s.access_token.clone())
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        let mut slot = self.lock();
        let id = SubscriptionId(slot.next_id);
        slot.next_id += 1;
        slot.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Returns false when the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut slot = self.lock();
        let before = slot.listeners.len();
        slot.listeners.retain(|(sid, _)| *sid != id);
        slot.listeners.len() != before
    }

    fn set(&self, state: AuthState, session: Option<Session>) {
        let listeners: Vec<Listener> = {
            let mut slot = self.lock();
            slot.state = state.clone();
            slot.session = session;
            slot.listeners.iter().map(|(_, l)| l.clone()).collect()
        };
        // Called outside the lock so listeners may query the service
        for listener in listeners {
            listener(&state);
        }
    }

    /// Re-validates a stored session. An invalid or missing session leaves
    /// the service signed out.
    pub async fn restore(&self, session: Option<Session>) -> AuthState {
        let Some(session) = session else {
            self.set(AuthState::signed_out(), None);
            return self.state();
        };

        match self.provider.user_for_token(&session.access_token).await {
            Ok(user) => {
                let session = Session {
                    user: user.clone(),
                    ..session
                };
                self.set(AuthState::signed_in(user), Some(session));
            }
            Err(e) => {
                warn!("Discarding stored session: {}", e);
                self.set(AuthState::signed_out(), None);
            }
        }
        self.state()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let session = self.provider.sign_in(email, password).await?;
        info!(user_id = %session.user.id, "Signed in");
        self.set(AuthState::signed_in(session.user.clone()), Some(session.clone()));
        Ok(session)
    }

    /// Signing out without a session is a no-op that still settles the state.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(token) = self.access_token() {
            self.provider.sign_out(&token).await?;
            info!("Signed out");
        }
        self.set(AuthState::signed_out(), None);
        Ok(())
    }
}
