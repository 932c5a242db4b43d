//! Headless view controllers.
//!
//! Each controller owns the state of one screen, fetches through the feature services
//! and exposes plain data for a front end to render. State sits behind a lock that is
//! never held across an await point, so it can be read while a request is outstanding.

use parking_lot::RwLock;

use crate::api::{BookId, SwapRequestId};
use crate::gateway::GatewayError;
use crate::session::SessionStorageError;

pub mod dashboard;
pub mod explore;
pub mod login;
pub mod navbar;
pub mod profile;

#[derive(Debug, Clone, PartialEq)]
pub enum Loadable<T> {
    Idle,
    Loading,
    Ready(T),
    Failed(String),
    /// The server rejected the session, the user has to log in again
    SignedOut,
}

impl<T> Default for Loadable<T> {
    fn default() -> Self {
        Loadable::Idle
    }
}

impl<T> Loadable<T> {
    /// Turns a finished fetch into view state.
    /// `fallback` is shown when the server gave no message of its own.
    pub fn from_fetch(result: Result<T, GatewayError>, fallback: &str) -> Self {
        match result {
            Ok(data) => Loadable::Ready(data),
            Err(err) if err.is_unauthorized() => Loadable::SignedOut,
            Err(err) => {
                tracing::warn!("Fetch failed: {}", err);
                Loadable::Failed(err.user_message(fallback))
            }
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Loadable::Ready(data) => Some(data),
            _ => None,
        }
    }

    pub fn ready_mut(&mut self) -> Option<&mut T> {
        match self {
            Loadable::Ready(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Loadable::Loading)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Loadable::Failed(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Reconciliation {
    /// Show the expected outcome at once, the next fetch brings the server truth
    Optimistic,
    /// Report success only after the affected data was fetched again
    Pessimistic,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Mutation {
    RequestSwap,
    RespondToRequest,
    SaveBook,
    DeleteBook,
    MarkNotificationRead,
    MarkAllNotificationsRead,
}

impl Mutation {
    pub fn reconciliation(&self) -> Reconciliation {
        match self {
            Mutation::RequestSwap => Reconciliation::Optimistic,
            Mutation::RespondToRequest
            | Mutation::SaveBook
            | Mutation::DeleteBook
            | Mutation::MarkNotificationRead
            | Mutation::MarkAllNotificationsRead => Reconciliation::Pessimistic,
        }
    }
}

#[derive(thiserror::Error, Debug)]
/// Failure of a user action, meant to be shown as a blocking alert
pub enum ViewError {
    #[error("{message}")]
    Failed { mutation: Mutation, message: String },

    #[error("Your session has expired, please log in again")]
    SessionInvalidated,

    #[error("A swap was already requested for book {0}")]
    AlreadyRequested(BookId),

    #[error("Swap request {0} is no longer pending")]
    NotPending(SwapRequestId),

    #[error("Swap request {0} was not found")]
    UnknownRequest(SwapRequestId),

    #[error("A swap request can only be accepted or declined")]
    InvalidTransition,

    #[error("{0}")]
    Authentication(String),

    #[error("Failed to store session: {0}")]
    SessionStorage(#[from] SessionStorageError),
}

impl ViewError {
    pub(crate) fn from_mutation(mutation: Mutation, err: GatewayError, fallback: &str) -> Self {
        if err.is_unauthorized() {
            return ViewError::SessionInvalidated;
        }
        tracing::warn!(?mutation, "Mutation failed: {}", err);
        ViewError::Failed {
            mutation,
            message: err.user_message(fallback),
        }
    }
}

/// Converts a failed mutation, moving the owning view to `SignedOut` when the session was rejected
pub(crate) fn mutation_failed<T>(
    state: &RwLock<Loadable<T>>,
    mutation: Mutation,
    err: GatewayError,
    fallback: &str,
) -> ViewError {
    let err = ViewError::from_mutation(mutation, err, fallback);
    if matches!(err, ViewError::SessionInvalidated) {
        *state.write() = Loadable::SignedOut;
    }
    err
}
