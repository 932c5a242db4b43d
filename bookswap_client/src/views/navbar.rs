use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::api::{Notification, NotificationId};
use crate::poller::PollingTask;
use crate::services::NotificationsService;
use crate::session::SessionStore;
use crate::views::{mutation_failed, Loadable, Mutation, ViewError};

const LIST_FAILED: &str = "Could not load notifications.";
const MARK_FAILED: &str = "Could not update notifications.";

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NavbarMenu {
    /// Login and sign up links
    Guest,
    Member { first_name: String },
}

#[derive(Debug, Clone)]
/// Unread count as fetched with one particular session token
struct UnreadBadge {
    token: String,
    count: u64,
}

/// Top bar: account menu and the notification bell
pub struct NavbarController {
    session: SessionStore,
    notifications: Arc<dyn NotificationsService>,
    poll_interval: Duration,
    unread_count: Arc<RwLock<Option<UnreadBadge>>>,
    list: RwLock<Loadable<Vec<Notification>>>,
    poller: Mutex<Option<PollingTask>>,
}

impl NavbarController {
    pub fn new(
        session: SessionStore,
        notifications: Arc<dyn NotificationsService>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            session,
            notifications,
            poll_interval,
            unread_count: Default::default(),
            list: RwLock::new(Loadable::Idle),
            poller: Mutex::new(None),
        }
    }

    pub fn menu(&self) -> NavbarMenu {
        match self.session.session() {
            Some(session) => NavbarMenu::Member {
                first_name: session.first_name().to_string(),
            },
            None => NavbarMenu::Guest,
        }
    }

    /// Last polled number of unread notifications of the current session.
    /// 0 when signed out or before the first poll of a new session answered.
    pub fn unread_count(&self) -> u64 {
        let Some(token) = self.session.token() else {
            return 0;
        };
        self.unread_count
            .read()
            .as_ref()
            .filter(|badge| badge.token == token)
            .map_or(0, |badge| badge.count)
    }

    pub fn notifications(&self) -> Loadable<Vec<Notification>> {
        self.list.read().clone()
    }

    /// Starts polling the unread count, for this and every later session, until unmounted.
    /// Does nothing while a poller is still running.
    pub fn mount(&self) {
        let mut poller = self.poller.lock();
        if poller.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let notifications = self.notifications.clone();
        let session = self.session.clone();
        let unread_count = self.unread_count.clone();
        *poller = Some(PollingTask::spawn(
            "unread_notifications",
            self.poll_interval,
            &self.session,
            move || {
                refresh_unread_count(
                    notifications.clone(),
                    session.clone(),
                    unread_count.clone(),
                )
            },
        ));
    }

    /// Stops polling, a poll still in flight is dropped without updating the count
    pub fn unmount(&self) {
        if let Some(task) = self.poller.lock().take() {
            task.cancel();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Fetches the full list when the dropdown is opened
    #[tracing::instrument(skip(self))]
    pub async fn open_notifications(&self) {
        *self.list.write() = Loadable::Loading;
        let result = self.notifications.notifications().await;
        *self.list.write() = Loadable::from_fetch(result, LIST_FAILED);
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_as_read(&self, notification_id: NotificationId) -> Result<(), ViewError> {
        self.notifications
            .mark_as_read(notification_id)
            .await
            .map_err(|err| {
                mutation_failed(&self.list, Mutation::MarkNotificationRead, err, MARK_FAILED)
            })?;
        self.refresh().await;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_all_as_read(&self) -> Result<(), ViewError> {
        self.notifications.mark_all_as_read().await.map_err(|err| {
            mutation_failed(&self.list, Mutation::MarkAllNotificationsRead, err, MARK_FAILED)
        })?;
        self.refresh().await;
        Ok(())
    }

    /// Fetches list and count again right away instead of waiting for the next poll
    async fn refresh(&self) {
        let (list, _) = tokio::join!(
            self.notifications.notifications(),
            refresh_unread_count(
                self.notifications.clone(),
                self.session.clone(),
                self.unread_count.clone()
            )
        );
        *self.list.write() = Loadable::from_fetch(list, LIST_FAILED);
    }
}

impl Drop for NavbarController {
    fn drop(&mut self) {
        self.unmount();
    }
}

async fn refresh_unread_count(
    notifications: Arc<dyn NotificationsService>,
    session: SessionStore,
    unread_count: Arc<RwLock<Option<UnreadBadge>>>,
) {
    let Some(token) = session.token() else {
        *unread_count.write() = None;
        return;
    };
    match notifications.unread_count().await {
        Ok(count) => *unread_count.write() = Some(UnreadBadge { token, count }),
        Err(err) => tracing::warn!("Failed to fetch unread notifications count: {}", err),
    }
}
