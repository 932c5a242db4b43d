use std::sync::Arc;

use parking_lot::RwLock;

use crate::api::UserProfile;
use crate::services::ProfileService;
use crate::session::SessionStore;
use crate::views::{Loadable, ViewError};

const LOAD_FAILED: &str = "Failed to fetch profile data. You may need to log in again.";

pub struct ProfileController {
    profile: Arc<dyn ProfileService>,
    session: SessionStore,
    state: RwLock<Loadable<UserProfile>>,
}

impl ProfileController {
    pub fn new(profile: Arc<dyn ProfileService>, session: SessionStore) -> Self {
        Self {
            profile,
            session,
            state: RwLock::new(Loadable::Idle),
        }
    }

    pub fn state(&self) -> Loadable<UserProfile> {
        self.state.read().clone()
    }

    #[tracing::instrument(skip(self))]
    pub async fn load(&self) {
        *self.state.write() = Loadable::Loading;
        let result = self.profile.profile().await;
        *self.state.write() = Loadable::from_fetch(result, LOAD_FAILED);
    }

    pub fn logout(&self) -> Result<(), ViewError> {
        *self.state.write() = Loadable::SignedOut;
        self.session.clear_session()?;
        Ok(())
    }
}
