use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use reqwest::StatusCode;

use crate::api::{
    AuthResponse, Book, BookId, BookRequest, BookStatus, FileUpload, Notification,
    NotificationId, PhotoReference, SignUpRequest, SwapRequest, SwapRequestId,
    SwapRequestStatus, UserId, UserProfile,
};
use crate::gateway::GatewayError;
use crate::services::{
    AuthService, BooksService, NotificationsService, ProfileService, ServiceResult,
    SwapRequestsService,
};

struct Account {
    name: String,
    email: String,
    password: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Default)]
struct BackendState {
    accounts: BTreeMap<UserId, Account>,
    current_user: Option<UserId>,
    books: BTreeMap<BookId, Book>,
    requests: BTreeMap<SwapRequestId, SwapRequest>,
    notifications: BTreeMap<NotificationId, (UserId, Notification)>,
}

/// Whole BookSwap backend kept in memory, acting for one user at a time.
///
/// Follows the business rules of the real server closely enough for the view
/// controllers to be exercised without a network. Single operations can be made
/// to fail and every call can be slowed down.
#[derive(Default)]
pub struct InMemoryBookSwap {
    id_sequence: AtomicI64,
    state: parking_lot::RwLock<BackendState>,
    failures: parking_lot::Mutex<HashMap<&'static str, (StatusCode, Option<String>)>>,
    calls: parking_lot::Mutex<Vec<&'static str>>,
    latency: parking_lot::Mutex<Option<Duration>>,
    delays: parking_lot::Mutex<HashMap<&'static str, Duration>>,
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn rejected(status: StatusCode, message: &str) -> GatewayError {
    GatewayError::Rejected {
        status,
        message: Some(message.to_string()),
    }
}

fn forbidden(message: &str) -> GatewayError {
    GatewayError::Unauthorized {
        status: StatusCode::FORBIDDEN,
        message: Some(message.to_string()),
    }
}

impl InMemoryBookSwap {
    fn next_id(&self) -> i64 {
        self.id_sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn register_user(&self, name: &str, email: &str, password: &str) -> UserId {
        let id = self.next_id();
        self.state.write().accounts.insert(
            id,
            Account {
                name: name.to_string(),
                email: email.to_string(),
                password: password.to_string(),
                latitude: None,
                longitude: None,
            },
        );
        id
    }

    /// Makes following calls run on behalf of `user_id`, as if its token was sent
    pub fn act_as(&self, user_id: UserId) {
        self.state.write().current_user = Some(user_id);
    }

    /// Drops the acting user, following calls are rejected with 401
    pub fn expire_session(&self) {
        self.state.write().current_user = None;
    }

    /// Stores a book of `owner_id` directly, bypassing the acting user
    pub fn insert_book(&self, owner_id: UserId, request: BookRequest) -> Book {
        let id = self.next_id();
        let mut state = self.state.write();
        let owner_name = state.accounts.get(&owner_id).map(|owner| owner.name.clone());
        let book = book_from_request(id, owner_id, owner_name, request);
        state.books.insert(id, book.clone());
        book
    }

    /// Makes `operation` (a service method name) fail until `recover` is called
    pub fn fail(&self, operation: &'static str, status: u16, message: Option<&str>) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.failures
            .lock()
            .insert(operation, (status, message.map(str::to_string)));
    }

    pub fn recover(&self, operation: &'static str) {
        self.failures.lock().remove(operation);
    }

    /// Every following call waits this long before it is served
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Calls of `operation` wait `delay` instead of the common latency
    pub fn delay(&self, operation: &'static str, delay: Duration) {
        self.delays.lock().insert(operation, delay);
    }

    /// How many times `operation` was called so far
    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|called| **called == operation)
            .count()
    }

    pub fn book(&self, book_id: BookId) -> Option<Book> {
        self.state.read().books.get(&book_id).cloned()
    }

    async fn enter(&self, operation: &'static str) -> ServiceResult<()> {
        self.calls.lock().push(operation);
        let common = *self.latency.lock();
        let delay = self.delays.lock().get(operation).copied().or(common);
        if let Some(latency) = delay {
            tokio::time::sleep(latency).await;
        }

        let failure = self.failures.lock().get(operation).cloned();
        match failure {
            Some((status, message)) if matches!(status.as_u16(), 401 | 403) => {
                Err(GatewayError::Unauthorized { status, message })
            }
            Some((status, message)) if status.is_server_error() => {
                Err(GatewayError::Server { status, message })
            }
            Some((status, message)) => Err(GatewayError::Rejected { status, message }),
            None => Ok(()),
        }
    }

    fn current_user(&self) -> ServiceResult<UserId> {
        self.state
            .read()
            .current_user
            .ok_or(GatewayError::Unauthorized {
                status: StatusCode::UNAUTHORIZED,
                message: None,
            })
    }

    fn notify(
        &self,
        state: &mut BackendState,
        user_id: UserId,
        kind: &str,
        message: String,
        request: &SwapRequest,
    ) {
        let id = self.next_id();
        state.notifications.insert(
            id,
            (
                user_id,
                Notification {
                    id,
                    kind: kind.to_string(),
                    message,
                    related_swap_request_id: Some(request.id),
                    related_book_id: Some(request.book.id),
                    is_read: false,
                    created_at: Some(now()),
                    read_at: None,
                },
            ),
        );
    }

    fn sign_in(&self, user_id: UserId, name: String) -> AuthResponse {
        self.act_as(user_id);
        AuthResponse {
            token: format!("in-memory-token-{user_id}"),
            name,
        }
    }
}

fn book_from_request(
    id: BookId,
    owner_id: UserId,
    owner_name: Option<String>,
    request: BookRequest,
) -> Book {
    Book {
        id,
        title: request.title,
        author: request.author,
        genre: request.genre,
        language: request.language,
        condition: request.condition,
        description: request.description,
        exchange_preference: request.exchange_preference,
        status: request.status,
        latitude: request.latitude,
        longitude: request.longitude,
        location_name: None,
        photo_url: request
            .photo_filename
            .map(|filename| format!("/uploads/{filename}")),
        owner_id,
        owner_name,
        created_at: Some(now()),
        distance_km: None,
    }
}

#[async_trait::async_trait]
impl AuthService for InMemoryBookSwap {
    async fn login(&self, email: &str, password: &str) -> ServiceResult<AuthResponse> {
        self.enter("login").await?;
        let account = self
            .state
            .read()
            .accounts
            .iter()
            .find(|(_, account)| account.email == email && account.password == password)
            .map(|(&id, account)| (id, account.name.clone()));

        match account {
            Some((id, name)) => Ok(self.sign_in(id, name)),
            None => Err(GatewayError::Unauthorized {
                status: StatusCode::UNAUTHORIZED,
                message: Some("Invalid credentials".to_string()),
            }),
        }
    }

    async fn signup(
        &self,
        request: SignUpRequest,
        _profile_picture: Option<FileUpload>,
    ) -> ServiceResult<AuthResponse> {
        self.enter("signup").await?;
        let taken = self
            .state
            .read()
            .accounts
            .values()
            .any(|account| account.email == request.email);
        if taken {
            return Err(rejected(StatusCode::BAD_REQUEST, "Email is already registered."));
        }

        let id = self.register_user(&request.name, &request.email, &request.password);
        if let Some(account) = self.state.write().accounts.get_mut(&id) {
            account.latitude = request.latitude;
            account.longitude = request.longitude;
        }
        Ok(self.sign_in(id, request.name))
    }
}

#[async_trait::async_trait]
impl BooksService for InMemoryBookSwap {
    async fn my_books(&self) -> ServiceResult<Vec<Book>> {
        self.enter("my_books").await?;
        let user_id = self.current_user()?;
        Ok(self
            .state
            .read()
            .books
            .values()
            .filter(|book| book.owner_id == user_id)
            .cloned()
            .collect())
    }

    async fn explore_books(&self) -> ServiceResult<Vec<Book>> {
        self.enter("explore_books").await?;
        let user_id = self.current_user()?;
        Ok(self
            .state
            .read()
            .books
            .values()
            .filter(|book| book.owner_id != user_id)
            .cloned()
            .collect())
    }

    async fn add_book(&self, request: BookRequest) -> ServiceResult<Book> {
        self.enter("add_book").await?;
        let user_id = self.current_user()?;
        Ok(self.insert_book(user_id, request))
    }

    async fn update_book(&self, book_id: BookId, request: BookRequest) -> ServiceResult<Book> {
        self.enter("update_book").await?;
        let user_id = self.current_user()?;
        let mut state = self.state.write();
        let book = state
            .books
            .get_mut(&book_id)
            .ok_or_else(|| rejected(StatusCode::NOT_FOUND, "Book not found."))?;
        if book.owner_id != user_id {
            return Err(forbidden("You are not authorized to edit this book."));
        }

        let photo_url = match request.photo_filename.clone() {
            Some(filename) => Some(format!("/uploads/{filename}")),
            None => book.photo_url.clone(),
        };
        *book = Book {
            photo_url,
            created_at: book.created_at,
            ..book_from_request(book_id, user_id, book.owner_name.clone(), request)
        };
        Ok(book.clone())
    }

    async fn delete_book(&self, book_id: BookId) -> ServiceResult<()> {
        self.enter("delete_book").await?;
        let user_id = self.current_user()?;
        let mut state = self.state.write();
        match state.books.get(&book_id) {
            None => return Err(rejected(StatusCode::NOT_FOUND, "Book not found.")),
            Some(book) if book.owner_id != user_id => {
                return Err(forbidden("You are not authorized to delete this book."))
            }
            Some(_) => {}
        }
        state.books.remove(&book_id);
        state.requests.retain(|_, request| request.book.id != book_id);
        Ok(())
    }

    async fn upload_book_photo(&self, photo: FileUpload) -> ServiceResult<PhotoReference> {
        self.enter("upload_book_photo").await?;
        self.current_user()?;
        Ok(PhotoReference {
            filename: format!("{}_{}", self.next_id(), photo.file_name),
        })
    }
}

#[async_trait::async_trait]
impl SwapRequestsService for InMemoryBookSwap {
    async fn create_request(&self, book_id: BookId) -> ServiceResult<SwapRequest> {
        self.enter("create_request").await?;
        let user_id = self.current_user()?;
        let id = self.next_id();
        let mut state = self.state.write();

        let book = state
            .books
            .get(&book_id)
            .cloned()
            .ok_or_else(|| rejected(StatusCode::NOT_FOUND, "Book not found."))?;
        if book.owner_id == user_id {
            return Err(rejected(StatusCode::BAD_REQUEST, "You cannot request your own book."));
        }
        if book.status != BookStatus::Available {
            return Err(rejected(
                StatusCode::BAD_REQUEST,
                "This book is not available for swapping.",
            ));
        }
        let already_pending = state.requests.values().any(|request| {
            request.book.id == book_id
                && request.requester_id == user_id
                && request.status == SwapRequestStatus::Pending
        });
        if already_pending {
            return Err(rejected(
                StatusCode::BAD_REQUEST,
                "You already have a pending request for this book.",
            ));
        }

        let requester_name = state.accounts.get(&user_id).map(|account| account.name.clone());
        let request = SwapRequest {
            id,
            requester_id: user_id,
            requester_name: requester_name.clone(),
            owner_id: book.owner_id,
            owner_name: book.owner_name.clone(),
            status: SwapRequestStatus::Pending,
            created_at: Some(now()),
            updated_at: None,
            book,
        };
        let message = format!(
            "{} requested your book '{}'",
            requester_name.as_deref().unwrap_or("Someone"),
            request.book.title
        );
        self.notify(&mut state, request.owner_id, "NEW_REQUEST", message, &request);
        state.requests.insert(id, request.clone());
        Ok(request)
    }

    async fn outgoing_requests(&self) -> ServiceResult<Vec<SwapRequest>> {
        self.enter("outgoing_requests").await?;
        let user_id = self.current_user()?;
        Ok(self
            .state
            .read()
            .requests
            .values()
            .filter(|request| request.requester_id == user_id)
            .cloned()
            .collect())
    }

    async fn incoming_requests(&self) -> ServiceResult<Vec<SwapRequest>> {
        self.enter("incoming_requests").await?;
        let user_id = self.current_user()?;
        Ok(self
            .state
            .read()
            .requests
            .values()
            .filter(|request| request.owner_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_request_status(
        &self,
        request_id: SwapRequestId,
        status: SwapRequestStatus,
    ) -> ServiceResult<SwapRequest> {
        self.enter("update_request_status").await?;
        let user_id = self.current_user()?;
        let mut state = self.state.write();

        let mut request = state
            .requests
            .get(&request_id)
            .cloned()
            .ok_or_else(|| rejected(StatusCode::NOT_FOUND, "Swap Request not found."))?;
        if request.owner_id != user_id {
            return Err(forbidden("You are not authorized to update this request."));
        }

        if status == SwapRequestStatus::Accepted {
            if let Some(book) = state.books.get_mut(&request.book.id) {
                book.status = BookStatus::LentOut;
                request.book = book.clone();
            }
        }
        request.status = status;
        request.updated_at = Some(now());
        state.requests.insert(request_id, request.clone());

        let (kind, verb) = match status {
            SwapRequestStatus::Accepted => ("REQUEST_ACCEPTED", "accepted"),
            _ => ("REQUEST_DECLINED", "declined"),
        };
        let message = format!("Your request for '{}' was {verb}", request.book.title);
        self.notify(&mut state, request.requester_id, kind, message, &request);
        Ok(request)
    }
}

#[async_trait::async_trait]
impl NotificationsService for InMemoryBookSwap {
    async fn notifications(&self) -> ServiceResult<Vec<Notification>> {
        self.enter("notifications").await?;
        let user_id = self.current_user()?;
        // Newest first
        Ok(self
            .state
            .read()
            .notifications
            .values()
            .rev()
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, notification)| notification.clone())
            .collect())
    }

    async fn unread_count(&self) -> ServiceResult<u64> {
        self.enter("unread_count").await?;
        let user_id = self.current_user()?;
        Ok(self
            .state
            .read()
            .notifications
            .values()
            .filter(|(owner, notification)| *owner == user_id && !notification.is_read)
            .count() as u64)
    }

    async fn mark_as_read(&self, notification_id: NotificationId) -> ServiceResult<Notification> {
        self.enter("mark_as_read").await?;
        let user_id = self.current_user()?;
        let mut state = self.state.write();
        let (owner, notification) = state
            .notifications
            .get_mut(&notification_id)
            .ok_or_else(|| rejected(StatusCode::NOT_FOUND, "Notification not found."))?;
        if *owner != user_id {
            return Err(forbidden(
                "You are not authorized to update this notification.",
            ));
        }
        notification.is_read = true;
        notification.read_at = Some(now());
        Ok(notification.clone())
    }

    async fn mark_all_as_read(&self) -> ServiceResult<()> {
        self.enter("mark_all_as_read").await?;
        let user_id = self.current_user()?;
        let read_at = now();
        self.state
            .write()
            .notifications
            .values_mut()
            .filter(|(owner, notification)| *owner == user_id && !notification.is_read)
            .for_each(|(_, notification)| {
                notification.is_read = true;
                notification.read_at = Some(read_at);
            });
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProfileService for InMemoryBookSwap {
    async fn profile(&self) -> ServiceResult<UserProfile> {
        self.enter("profile").await?;
        let user_id = self.current_user()?;
        let state = self.state.read();
        let account = state
            .accounts
            .get(&user_id)
            .ok_or_else(|| rejected(StatusCode::NOT_FOUND, "User not found."))?;
        Ok(UserProfile {
            name: account.name.clone(),
            email: account.email.clone(),
            latitude: account.latitude,
            longitude: account.longitude,
            location_name: None,
            profile_picture_url: None,
        })
    }
}

#[cfg(test)]
pub(crate) mod in_memory_book_swap_tests {
    use crate::api::{BookCondition, BookRequest, BookStatus, SwapRequestStatus, UserId};
    use crate::services::{
        AuthService, BooksService, InMemoryBookSwap, NotificationsService, SwapRequestsService,
    };

    pub(crate) fn book_request(title: &str, genre: &str) -> BookRequest {
        BookRequest {
            title: title.to_string(),
            author: format!("Author of {title}"),
            genre: genre.to_string(),
            language: "English".to_string(),
            condition: BookCondition::Good,
            description: None,
            exchange_preference: None,
            latitude: Some(6.9271),
            longitude: Some(79.8612),
            status: BookStatus::Available,
            photo_filename: None,
        }
    }

    /// Owner with two books and a reader acting as the current user
    pub(crate) fn two_users() -> (InMemoryBookSwap, UserId, UserId) {
        let backend = InMemoryBookSwap::default();
        let owner = backend.register_user("Ann Perera", "ann@example.com", "secret");
        let reader = backend.register_user("Nimal Silva", "reader@example.com", "secret");
        backend.insert_book(owner, book_request("Dune", "Science Fiction"));
        backend.insert_book(owner, book_request("Emma", "Romance"));
        backend.act_as(reader);
        (backend, owner, reader)
    }

    #[tokio::test]
    /// Login succeeds only with matching credentials
    async fn test_login() {
        let (backend, _, _) = two_users();
        let response = backend
            .login("ann@example.com", "secret")
            .await
            .expect("Failed to login");
        assert_eq!(response.name, "Ann Perera");

        let err = backend
            .login("ann@example.com", "wrong")
            .await
            .expect_err("Login with wrong password succeeded");
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    /// Second pending request for the same book is refused like the real server does
    async fn test_duplicate_pending_request_is_rejected() {
        let (backend, _, _) = two_users();
        let book_id = backend.explore_books().await.expect("Failed to explore")[0].id;

        backend
            .create_request(book_id)
            .await
            .expect("Failed to create request");
        let err = backend
            .create_request(book_id)
            .await
            .expect_err("Duplicate request was accepted");
        assert_eq!(
            err.server_message(),
            Some("You already have a pending request for this book.")
        );
    }

    #[tokio::test]
    /// Accepting lends the book out and notifies the requester
    async fn test_accepting_request_lends_book_out() {
        let (backend, owner, reader) = two_users();
        let book_id = backend.explore_books().await.expect("Failed to explore")[0].id;
        let request = backend
            .create_request(book_id)
            .await
            .expect("Failed to create request");

        backend.act_as(owner);
        assert_eq!(backend.unread_count().await.expect("Failed to count"), 1);
        backend
            .update_request_status(request.id, SwapRequestStatus::Accepted)
            .await
            .expect("Failed to accept");
        assert_eq!(
            backend.book(book_id).map(|book| book.status),
            Some(BookStatus::LentOut)
        );

        backend.act_as(reader);
        let notifications = backend.notifications().await.expect("Failed to list");
        assert_eq!(notifications[0].kind, "REQUEST_ACCEPTED");
    }

    #[tokio::test]
    /// Injected failures are typed by status
    async fn test_injected_failures() {
        let (backend, _, _) = two_users();
        backend.fail("my_books", 500, None);
        assert!(backend.my_books().await.is_err());
        backend.recover("my_books");
        assert!(backend.my_books().await.is_ok());

        backend.expire_session();
        let err = backend.my_books().await.expect_err("Call without session succeeded");
        assert!(err.is_unauthorized());
        assert_eq!(backend.calls("my_books"), 3);
    }
}
