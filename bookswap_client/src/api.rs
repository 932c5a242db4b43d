use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub type BookId = i64;
pub type UserId = i64;
pub type SwapRequestId = i64;
pub type NotificationId = i64;

const MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/?api=1&query=";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookStatus {
    Available,
    LentOut,
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookCondition {
    New,
    LikeNew,
    #[default]
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwapRequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl SwapRequestStatus {
    /// Accepted and declined requests never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SwapRequestStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Book as returned by the books endpoints
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub language: String,
    #[serde(rename = "bookCondition")]
    pub condition: BookCondition,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub exchange_preference: Option<String>,
    pub status: BookStatus,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub owner_id: UserId,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    /// Only filled in for explore results
    #[serde(default)]
    pub distance_km: Option<f64>,
}

impl Book {
    pub fn map_link(&self) -> Option<String> {
        map_link(self.latitude, self.longitude)
    }

    pub fn distance_label(&self) -> Option<String> {
        self.distance_km.map(format_distance)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Payload of book create and update calls.
/// The photo is uploaded first and referenced here by the returned file name.
pub struct BookRequest {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub language: String,
    #[serde(rename = "bookCondition")]
    pub condition: BookCondition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_preference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub status: BookStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_filename: Option<String>,
}

impl From<&Book> for BookRequest {
    fn from(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            genre: book.genre.clone(),
            language: book.language.clone(),
            condition: book.condition,
            description: book.description.clone(),
            exchange_preference: book.exchange_preference.clone(),
            latitude: book.latitude,
            longitude: book.longitude,
            status: book.status,
            photo_filename: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
/// Server side reference to an uploaded photo
pub struct PhotoReference {
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq)]
/// Raw file to be sent as a multipart part
pub struct FileUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub id: SwapRequestId,
    pub book: Book,
    pub requester_id: UserId,
    #[serde(default)]
    pub requester_name: Option<String>,
    pub owner_id: UserId,
    #[serde(default)]
    pub owner_name: Option<String>,
    pub status: SwapRequestStatus,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SwapRequestStatusUpdate {
    pub status: SwapRequestStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    /// NEW_REQUEST, REQUEST_ACCEPTED or REQUEST_DECLINED
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub related_swap_request_id: Option<SwapRequestId>,
    #[serde(default)]
    pub related_book_id: Option<BookId>,
    pub is_read: bool,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub read_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct UnreadCount {
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

impl UserProfile {
    pub fn map_link(&self) -> Option<String> {
        map_link(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct AuthResponse {
    pub token: String,
    pub name: String,
}

fn map_link(latitude: Option<f64>, longitude: Option<f64>) -> Option<String> {
    match (latitude, longitude) {
        (Some(lat), Some(lon)) => Some(format!("{MAPS_SEARCH_URL}{lat},{lon}")),
        _ => None,
    }
}

pub fn format_distance(distance_km: f64) -> String {
    if distance_km < 1.0 {
        "Less than 1 km".to_string()
    } else {
        format!("{:.1} km away", distance_km)
    }
}
