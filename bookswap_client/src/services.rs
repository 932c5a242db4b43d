use crate::api::{
    AuthResponse, Book, BookId, BookRequest, FileUpload, Notification, NotificationId,
    PhotoReference, SignUpRequest, SwapRequest, SwapRequestId, SwapRequestStatus, UserProfile,
};
use crate::gateway::GatewayError;

#[cfg(test)]
pub(crate) use in_memory_book_swap::InMemoryBookSwap;

#[cfg(test)]
pub(crate) mod in_memory_book_swap;

pub type ServiceResult<T> = Result<T, GatewayError>;

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Exchanges credentials for a bearer token
    async fn login(&self, email: &str, password: &str) -> ServiceResult<AuthResponse>;
    /// Creates an account, the response already carries a token for it
    async fn signup(
        &self,
        request: SignUpRequest,
        profile_picture: Option<FileUpload>,
    ) -> ServiceResult<AuthResponse>;
}

#[async_trait::async_trait]
pub trait BooksService: Send + Sync {
    /// Books owned by the current user
    async fn my_books(&self) -> ServiceResult<Vec<Book>>;
    /// Books of other users, sorted by distance on the server
    async fn explore_books(&self) -> ServiceResult<Vec<Book>>;
    async fn add_book(&self, request: BookRequest) -> ServiceResult<Book>;
    async fn update_book(&self, book_id: BookId, request: BookRequest) -> ServiceResult<Book>;
    async fn delete_book(&self, book_id: BookId) -> ServiceResult<()>;
    /// First phase of a book write, the returned reference goes into `BookRequest::photo_filename`
    async fn upload_book_photo(&self, photo: FileUpload) -> ServiceResult<PhotoReference>;
}

#[async_trait::async_trait]
pub trait SwapRequestsService: Send + Sync {
    async fn create_request(&self, book_id: BookId) -> ServiceResult<SwapRequest>;
    /// Requests sent by the current user
    async fn outgoing_requests(&self) -> ServiceResult<Vec<SwapRequest>>;
    /// Requests for books owned by the current user
    async fn incoming_requests(&self) -> ServiceResult<Vec<SwapRequest>>;
    async fn update_request_status(
        &self,
        request_id: SwapRequestId,
        status: SwapRequestStatus,
    ) -> ServiceResult<SwapRequest>;
}

#[async_trait::async_trait]
pub trait NotificationsService: Send + Sync {
    async fn notifications(&self) -> ServiceResult<Vec<Notification>>;
    async fn unread_count(&self) -> ServiceResult<u64>;
    async fn mark_as_read(&self, notification_id: NotificationId) -> ServiceResult<Notification>;
    async fn mark_all_as_read(&self) -> ServiceResult<()>;
}

#[async_trait::async_trait]
pub trait ProfileService: Send + Sync {
    async fn profile(&self) -> ServiceResult<UserProfile>;
}
