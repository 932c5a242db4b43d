use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use futures_util::future::try_join;
use parking_lot::RwLock;

use crate::api::{Book, BookId, SwapRequestStatus};
use crate::services::{BooksService, SwapRequestsService};
use crate::views::{mutation_failed, Loadable, Mutation, ViewError};

const LOAD_FAILED: &str = "Could not fetch books. Please try again later.";
const REQUEST_FAILED: &str = "Could not send swap request.";
const REQUEST_SENT: &str = "Swap request sent successfully!";

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct BookFilter {
    /// Case-insensitive part of the title or author
    pub search: Option<String>,
    pub genre: Option<String>,
}

impl BookFilter {
    pub fn matches(&self, book: &Book) -> bool {
        let search_matches = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(search) => {
                let search = search.to_lowercase();
                book.title.to_lowercase().contains(&search)
                    || book.author.to_lowercase().contains(&search)
            }
        };
        let genre_matches = self
            .genre
            .as_deref()
            .map_or(true, |genre| book.genre.eq_ignore_ascii_case(genre));
        search_matches && genre_matches
    }
}

#[derive(Debug, Clone, PartialEq)]
/// What a renderer needs to draw one explore card
pub struct BookCard {
    pub book: Book,
    pub requested: bool,
    pub distance: Option<String>,
    pub map_link: Option<String>,
}

impl BookCard {
    pub fn action_label(&self) -> &'static str {
        if self.requested {
            "Requested"
        } else {
            "Request Swap"
        }
    }
}

#[derive(Debug, Default)]
struct RequestedBooks {
    /// Books with a PENDING outgoing request as of the last fetch or confirmed since
    confirmed: HashSet<BookId>,
    /// Marked before the server answered
    in_flight: HashSet<BookId>,
    /// Confirmations numbered by `sequence`, kept while a fetch is running
    confirmations: Vec<(u64, BookId)>,
    sequence: u64,
    fetches_running: usize,
}

impl RequestedBooks {
    fn contains(&self, book_id: BookId) -> bool {
        self.confirmed.contains(&book_id) || self.in_flight.contains(&book_id)
    }

    fn confirm(&mut self, book_id: BookId) {
        self.sequence += 1;
        self.confirmed.insert(book_id);
        if self.fetches_running > 0 {
            self.confirmations.push((self.sequence, book_id));
        }
    }

    /// Returns the sequence number the fetch starts at
    fn fetch_started(&mut self) -> u64 {
        self.fetches_running += 1;
        self.sequence
    }

    /// Replaces the confirmed marks with a fetched snapshot.
    /// Confirmations made after `started` are newer than the snapshot and are kept.
    fn fetch_finished(&mut self, started: u64, fetched: Option<HashSet<BookId>>) {
        if let Some(fetched) = fetched {
            self.confirmed = fetched;
            self.confirmed.extend(
                self.confirmations
                    .iter()
                    .filter(|(sequence, _)| *sequence > started)
                    .map(|(_, book_id)| *book_id),
            );
        }
        self.fetches_running = self.fetches_running.saturating_sub(1);
        if self.fetches_running == 0 {
            self.confirmations.clear();
        }
    }
}

/// Books of other users that can be requested
pub struct ExploreController {
    books: Arc<dyn BooksService>,
    swap_requests: Arc<dyn SwapRequestsService>,
    state: RwLock<Loadable<Vec<Book>>>,
    requested: RwLock<RequestedBooks>,
    filter: RwLock<BookFilter>,
}

impl ExploreController {
    pub fn new(books: Arc<dyn BooksService>, swap_requests: Arc<dyn SwapRequestsService>) -> Self {
        Self {
            books,
            swap_requests,
            state: RwLock::new(Loadable::Idle),
            requested: RwLock::new(RequestedBooks::default()),
            filter: RwLock::new(BookFilter::default()),
        }
    }

    pub fn state(&self) -> Loadable<Vec<Book>> {
        self.state.read().clone()
    }

    /// Fetches explorable books together with the user's outgoing requests.
    /// The requested marks are rebuilt from the server answer every time.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self) {
        *self.state.write() = Loadable::Loading;
        let started = self.requested.write().fetch_started();

        let result = try_join(
            self.books.explore_books(),
            self.swap_requests.outgoing_requests(),
        )
        .await;

        let fetched = result.as_ref().ok().map(|(_, outgoing)| {
            outgoing
                .iter()
                .filter(|request| request.status == SwapRequestStatus::Pending)
                .map(|request| request.book.id)
                .collect()
        });
        self.requested.write().fetch_finished(started, fetched);
        let result = result.map(|(books, _)| books);
        *self.state.write() = Loadable::from_fetch(result, LOAD_FAILED);
    }

    pub fn is_requested(&self, book_id: BookId) -> bool {
        self.requested.read().contains(book_id)
    }

    pub fn requested_book_ids(&self) -> HashSet<BookId> {
        let requested = self.requested.read();
        requested
            .confirmed
            .union(&requested.in_flight)
            .copied()
            .collect()
    }

    /// Sends a swap request for `book_id`.
    ///
    /// The book shows as requested as soon as this is called. If the server refuses,
    /// the mark is taken back and the refusal returned.
    #[tracing::instrument(skip(self))]
    pub async fn request_swap(&self, book_id: BookId) -> Result<&'static str, ViewError> {
        {
            let mut requested = self.requested.write();
            if requested.contains(book_id) {
                return Err(ViewError::AlreadyRequested(book_id));
            }
            requested.in_flight.insert(book_id);
        }

        let result = self.swap_requests.create_request(book_id).await;

        let mut requested = self.requested.write();
        requested.in_flight.remove(&book_id);
        match result {
            Ok(request) => {
                tracing::info!(request_id = request.id, "Swap request sent");
                requested.confirm(book_id);
                Ok(REQUEST_SENT)
            }
            Err(err) => {
                drop(requested);
                Err(mutation_failed(
                    &self.state,
                    Mutation::RequestSwap,
                    err,
                    REQUEST_FAILED,
                ))
            }
        }
    }

    pub fn filter(&self) -> BookFilter {
        self.filter.read().clone()
    }

    pub fn set_search(&self, search: Option<String>) {
        self.filter.write().search = search;
    }

    pub fn set_genre(&self, genre: Option<String>) {
        self.filter.write().genre = genre;
    }

    /// Distinct genres of the fetched books, for the genre filter
    pub fn genres(&self) -> Vec<String> {
        self.state
            .read()
            .ready()
            .map(|books| {
                books
                    .iter()
                    .map(|book| book.genre.clone())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Cards of the fetched books passing the current filter, in server order
    pub fn visible_books(&self) -> Vec<BookCard> {
        let filter = self.filter();
        let requested = self.requested.read();
        self.state
            .read()
            .ready()
            .map(|books| {
                books
                    .iter()
                    .filter(|book| filter.matches(book))
                    .map(|book| BookCard {
                        requested: requested.contains(book.id),
                        distance: book.distance_label(),
                        map_link: book.map_link(),
                        book: book.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
