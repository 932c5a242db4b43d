use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures_util::future::try_join3;
use parking_lot::RwLock;

use crate::api::{
    Book, BookId, BookRequest, FileUpload, SwapRequest, SwapRequestId, SwapRequestStatus,
};
use crate::services::{BooksService, SwapRequestsService};
use crate::views::{mutation_failed, Loadable, Mutation, ViewError};

const LOAD_FAILED: &str = "Failed to fetch your books.";
const SAVE_FAILED: &str = "Could not save the book.";
const DELETE_FAILED: &str = "Could not delete the book.";
const RESPOND_FAILED: &str = "Could not update the swap request.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardData {
    pub my_books: Vec<Book>,
    pub outgoing_requests: Vec<SwapRequest>,
    pub incoming_requests: Vec<SwapRequest>,
}

impl DashboardData {
    /// Incoming requests still waiting for an answer, grouped by the requested book.
    /// Requests for books that are not in `my_books` are left out.
    pub fn pending_requests_by_book(&self) -> BTreeMap<BookId, Vec<SwapRequest>> {
        let my_book_ids: HashSet<BookId> = self.my_books.iter().map(|book| book.id).collect();
        let mut grouped: BTreeMap<BookId, Vec<SwapRequest>> = BTreeMap::new();
        for request in &self.incoming_requests {
            if request.status == SwapRequestStatus::Pending && my_book_ids.contains(&request.book.id)
            {
                grouped
                    .entry(request.book.id)
                    .or_default()
                    .push(request.clone());
            }
        }
        grouped
    }
}

/// Owner's screen: own books, sent requests and requests to answer
pub struct DashboardController {
    books: Arc<dyn BooksService>,
    swap_requests: Arc<dyn SwapRequestsService>,
    state: RwLock<Loadable<DashboardData>>,
}

impl DashboardController {
    pub fn new(books: Arc<dyn BooksService>, swap_requests: Arc<dyn SwapRequestsService>) -> Self {
        Self {
            books,
            swap_requests,
            state: RwLock::new(Loadable::Idle),
        }
    }

    pub fn state(&self) -> Loadable<DashboardData> {
        self.state.read().clone()
    }

    pub fn pending_requests_by_book(&self) -> BTreeMap<BookId, Vec<SwapRequest>> {
        self.state
            .read()
            .ready()
            .map(DashboardData::pending_requests_by_book)
            .unwrap_or_default()
    }

    /// Fetches books and both request lists together, any failure fails the whole view
    #[tracing::instrument(skip(self))]
    pub async fn load(&self) {
        *self.state.write() = Loadable::Loading;

        let result = try_join3(
            self.books.my_books(),
            self.swap_requests.outgoing_requests(),
            self.swap_requests.incoming_requests(),
        )
        .await
        .map(|(my_books, outgoing_requests, incoming_requests)| DashboardData {
            my_books,
            outgoing_requests,
            incoming_requests,
        });

        *self.state.write() = Loadable::from_fetch(result, LOAD_FAILED);
    }

    /// Accepts or declines a pending incoming request.
    /// Returns the confirmation to show once the dashboard was fetched again.
    #[tracing::instrument(skip(self))]
    pub async fn respond_to_request(
        &self,
        request_id: SwapRequestId,
        status: SwapRequestStatus,
    ) -> Result<&'static str, ViewError> {
        let confirmation = match status {
            SwapRequestStatus::Accepted => "Request accepted!",
            SwapRequestStatus::Declined => "Request declined.",
            SwapRequestStatus::Pending => return Err(ViewError::InvalidTransition),
        };

        let current_status = self.state.read().ready().and_then(|data| {
            data.incoming_requests
                .iter()
                .find(|request| request.id == request_id)
                .map(|request| request.status)
        });
        match current_status {
            None => return Err(ViewError::UnknownRequest(request_id)),
            Some(current) if current.is_terminal() => return Err(ViewError::NotPending(request_id)),
            Some(_) => {}
        }

        self.swap_requests
            .update_request_status(request_id, status)
            .await
            .map_err(|err| mutation_failed(&self.state, Mutation::RespondToRequest, err, RESPOND_FAILED))?;
        self.load().await;
        Ok(confirmation)
    }

    /// Creates a book, or updates `book_id` when given.
    /// A photo is uploaded first and its file name attached to the book.
    #[tracing::instrument(skip(self, request, photo), fields(title = %request.title))]
    pub async fn save_book(
        &self,
        book_id: Option<BookId>,
        mut request: BookRequest,
        photo: Option<FileUpload>,
    ) -> Result<Book, ViewError> {
        let failed = |err| mutation_failed(&self.state, Mutation::SaveBook, err, SAVE_FAILED);

        if let Some(photo) = photo {
            let reference = self.books.upload_book_photo(photo).await.map_err(failed)?;
            request.photo_filename = Some(reference.filename);
        }

        let book = match book_id {
            Some(book_id) => self.books.update_book(book_id, request).await,
            None => self.books.add_book(request).await,
        }
        .map_err(failed)?;

        tracing::info!(book_id = book.id, "Book saved");
        self.load().await;
        Ok(book)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_book(&self, book_id: BookId) -> Result<(), ViewError> {
        self.books
            .delete_book(book_id)
            .await
            .map_err(|err| mutation_failed(&self.state, Mutation::DeleteBook, err, DELETE_FAILED))?;
        self.load().await;
        Ok(())
    }
}
