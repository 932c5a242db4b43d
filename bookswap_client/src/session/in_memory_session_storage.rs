use parking_lot::RwLock;

use crate::session::{Session, SessionStorage, SessionStorageError};

#[derive(Default)]
pub struct InMemorySessionStorage {
    session: RwLock<Option<Session>>,
}

impl InMemorySessionStorage {
    pub fn with_session(session: Session) -> Self {
        Self {
            session: RwLock::new(Some(session)),
        }
    }
}

impl SessionStorage for InMemorySessionStorage {
    fn load(&self) -> Result<Option<Session>, SessionStorageError> {
        Ok(self.session.read().clone())
    }

    fn save(&self, session: &Session) -> Result<(), SessionStorageError> {
        *self.session.write() = Some(session.clone());
        Ok(())
    }

    fn remove(&self) -> Result<(), SessionStorageError> {
        self.session.write().take();
        Ok(())
    }
}
