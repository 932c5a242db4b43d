use std::time::Duration;

use crate::api::{
    AuthResponse, Book, BookId, BookRequest, FileUpload, LoginRequest, Notification,
    NotificationId, PhotoReference, SignUpRequest, SwapRequest, SwapRequestId, SwapRequestStatus,
    SwapRequestStatusUpdate, UnreadCount, UserProfile,
};
use crate::gateway::{Gateway, MultipartField, RequestDescriptor};
use crate::services::{
    AuthService, BooksService, NotificationsService, ProfileService, ServiceResult,
    SwapRequestsService,
};
use crate::session::SessionStore;

#[derive(Clone)]
/// REST client of the BookSwap backend, every call goes through the gateway
pub struct BookSwapClient {
    gateway: Gateway,
}

impl BookSwapClient {
    pub fn new(url: &str, timeout: Duration, session: SessionStore) -> anyhow::Result<Self> {
        Ok(Self {
            gateway: Gateway::new(url, timeout, session)?,
        })
    }

    pub fn session(&self) -> &SessionStore {
        self.gateway.session()
    }
}

#[async_trait::async_trait]
impl AuthService for BookSwapClient {
    /// Calls POST /api/auth/login endpoint
    async fn login(&self, email: &str, password: &str) -> ServiceResult<AuthResponse> {
        let request = RequestDescriptor::post("/api/auth/login").json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        self.gateway.send_json(request).await
    }

    /// Calls POST /api/auth/signup endpoint with a multipart body:
    /// `signUpRequest` JSON part and optional `profilePicture` file part
    async fn signup(
        &self,
        request: SignUpRequest,
        profile_picture: Option<FileUpload>,
    ) -> ServiceResult<AuthResponse> {
        let mut fields = vec![MultipartField::json("signUpRequest", &request)?];
        if let Some(file) = profile_picture {
            fields.push(MultipartField::File {
                name: "profilePicture".to_string(),
                file,
            });
        }
        self.gateway
            .send_json(RequestDescriptor::post("/api/auth/signup").multipart(fields))
            .await
    }
}

#[async_trait::async_trait]
impl BooksService for BookSwapClient {
    /// Calls GET /api/books/my-books endpoint
    async fn my_books(&self) -> ServiceResult<Vec<Book>> {
        self.gateway
            .send_json(RequestDescriptor::get("/api/books/my-books"))
            .await
    }

    /// Calls GET /api/books/explore endpoint
    async fn explore_books(&self) -> ServiceResult<Vec<Book>> {
        self.gateway
            .send_json(RequestDescriptor::get("/api/books/explore"))
            .await
    }

    /// Calls POST /api/books endpoint
    async fn add_book(&self, request: BookRequest) -> ServiceResult<Book> {
        self.gateway
            .send_json(RequestDescriptor::post("/api/books").json(&request)?)
            .await
    }

    /// Calls PUT /api/books/{book_id} endpoint with a multipart body holding the
    /// `bookRequest` JSON part. A photo uploaded beforehand travels in `photoFilename`.
    async fn update_book(&self, book_id: BookId, request: BookRequest) -> ServiceResult<Book> {
        let fields = vec![MultipartField::json("bookRequest", &request)?];
        self.gateway
            .send_json(RequestDescriptor::put(format!("/api/books/{}", book_id)).multipart(fields))
            .await
    }

    /// Calls DELETE /api/books/{book_id} endpoint
    async fn delete_book(&self, book_id: BookId) -> ServiceResult<()> {
        self.gateway
            .send_empty(RequestDescriptor::delete(format!("/api/books/{}", book_id)))
            .await
    }

    /// Calls POST /api/files/upload/book-photo endpoint
    async fn upload_book_photo(&self, photo: FileUpload) -> ServiceResult<PhotoReference> {
        let fields = vec![MultipartField::File {
            name: "photo".to_string(),
            file: photo,
        }];
        self.gateway
            .send_json(RequestDescriptor::post("/api/files/upload/book-photo").multipart(fields))
            .await
    }
}

#[async_trait::async_trait]
impl SwapRequestsService for BookSwapClient {
    /// Calls POST /api/swap-requests/book/{book_id} endpoint
    async fn create_request(&self, book_id: BookId) -> ServiceResult<SwapRequest> {
        self.gateway
            .send_json(RequestDescriptor::post(format!(
                "/api/swap-requests/book/{}",
                book_id
            )))
            .await
    }

    /// Calls GET /api/swap-requests/outgoing endpoint
    async fn outgoing_requests(&self) -> ServiceResult<Vec<SwapRequest>> {
        self.gateway
            .send_json(RequestDescriptor::get("/api/swap-requests/outgoing"))
            .await
    }

    /// Calls GET /api/swap-requests/incoming endpoint
    async fn incoming_requests(&self) -> ServiceResult<Vec<SwapRequest>> {
        self.gateway
            .send_json(RequestDescriptor::get("/api/swap-requests/incoming"))
            .await
    }

    /// Calls PUT /api/swap-requests/{request_id} endpoint
    async fn update_request_status(
        &self,
        request_id: SwapRequestId,
        status: SwapRequestStatus,
    ) -> ServiceResult<SwapRequest> {
        let request = RequestDescriptor::put(format!("/api/swap-requests/{}", request_id))
            .json(&SwapRequestStatusUpdate { status })?;
        self.gateway.send_json(request).await
    }
}

#[async_trait::async_trait]
impl NotificationsService for BookSwapClient {
    /// Calls GET /api/notifications endpoint
    async fn notifications(&self) -> ServiceResult<Vec<Notification>> {
        self.gateway
            .send_json(RequestDescriptor::get("/api/notifications"))
            .await
    }

    /// Calls GET /api/notifications/unread-count endpoint
    async fn unread_count(&self) -> ServiceResult<u64> {
        let unread: UnreadCount = self
            .gateway
            .send_json(RequestDescriptor::get("/api/notifications/unread-count"))
            .await?;
        Ok(unread.count)
    }

    /// Calls PUT /api/notifications/{notification_id}/read endpoint
    async fn mark_as_read(&self, notification_id: NotificationId) -> ServiceResult<Notification> {
        self.gateway
            .send_json(RequestDescriptor::put(format!(
                "/api/notifications/{}/read",
                notification_id
            )))
            .await
    }

    /// Calls PUT /api/notifications/mark-all-read endpoint
    async fn mark_all_as_read(&self) -> ServiceResult<()> {
        self.gateway
            .send_empty(RequestDescriptor::put("/api/notifications/mark-all-read"))
            .await
    }
}

#[async_trait::async_trait]
impl ProfileService for BookSwapClient {
    /// Calls GET /api/users/profile endpoint
    async fn profile(&self) -> ServiceResult<UserProfile> {
        self.gateway
            .send_json(RequestDescriptor::get("/api/users/profile"))
            .await
    }
}
