use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use bookswap_client::api::{
    BookCondition, BookId, BookRequest, BookStatus, FileUpload, NotificationId, SignUpRequest,
    SwapRequestId, SwapRequestStatus,
};
use bookswap_client::app_config::AppConfig;
use bookswap_client::client::BookSwapClient;
use bookswap_client::route_guard::{post_login_destination, Navigation, RouteGuard};
use bookswap_client::session::{FileSessionStorage, SessionStore};
use bookswap_client::telemetry::{init_telemetry, shutdown_telemetry};
use bookswap_client::views::dashboard::DashboardController;
use bookswap_client::views::explore::ExploreController;
use bookswap_client::views::login::LoginController;
use bookswap_client::views::navbar::{NavbarController, NavbarMenu};
use bookswap_client::views::profile::ProfileController;
use bookswap_client::views::Loadable;

const APP_NAME: &str = "bookswap";

/// Command line client of the BookSwap book exchange
#[derive(Parser)]
#[command(name = "bookswap", version, about, long_about = None)]
struct Cli {
    /// TOML configuration file, BOOKSWAP_* environment variables take precedence
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and remember the session
    Login {
        email: String,
        #[arg(short, long)]
        password: String,
        /// Protected path to continue to after login
        #[arg(long)]
        from: Option<String>,
    },

    /// Create an account and log in with it
    Signup {
        name: String,
        email: String,
        #[arg(short, long)]
        password: String,
        #[arg(long, requires = "longitude")]
        latitude: Option<f64>,
        #[arg(long, requires = "latitude")]
        longitude: Option<f64>,
        /// Profile picture to upload
        #[arg(long)]
        picture: Option<PathBuf>,
    },

    Logout,

    /// Show who is logged in
    Whoami,

    /// Check whether a path may be opened with the current session
    Open { path: String },

    Profile,

    /// Own books and swap requests
    Dashboard,

    /// Accept or decline an incoming swap request
    Respond {
        request_id: SwapRequestId,
        #[arg(value_enum)]
        decision: Decision,
    },

    /// Add a book, or update one with --book-id
    AddBook {
        title: String,
        author: String,
        genre: String,
        #[arg(long, default_value = "English")]
        language: String,
        #[arg(long, value_enum, default_value_t = ConditionArg::Good)]
        condition: ConditionArg,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        exchange_preference: Option<String>,
        #[arg(long, requires = "longitude")]
        latitude: Option<f64>,
        #[arg(long, requires = "latitude")]
        longitude: Option<f64>,
        /// Mark the book as lent out
        #[arg(long)]
        lent_out: bool,
        #[arg(long)]
        photo: Option<PathBuf>,
        #[arg(long)]
        book_id: Option<BookId>,
    },

    DeleteBook { book_id: BookId },

    /// Books of other readers
    Explore {
        /// Part of the title or author
        #[arg(short, long)]
        search: Option<String>,
        #[arg(short, long)]
        genre: Option<String>,
    },

    /// Ask the owner of a book for a swap
    Request { book_id: BookId },

    Notifications {
        /// Mark one notification as read
        #[arg(long, conflicts_with = "read_all")]
        read: Option<NotificationId>,
        #[arg(long)]
        read_all: bool,
    },

    /// Keep polling the unread notifications count until Ctrl-C
    Watch,
}

#[derive(Clone, Copy, ValueEnum)]
enum Decision {
    Accept,
    Decline,
}

#[derive(Clone, Copy, ValueEnum)]
enum ConditionArg {
    New,
    LikeNew,
    Good,
    Fair,
    Poor,
}

impl From<ConditionArg> for BookCondition {
    fn from(condition: ConditionArg) -> Self {
        match condition {
            ConditionArg::New => BookCondition::New,
            ConditionArg::LikeNew => BookCondition::LikeNew,
            ConditionArg::Good => BookCondition::Good,
            ConditionArg::Fair => BookCondition::Fair,
            ConditionArg::Poor => BookCondition::Poor,
        }
    }
}

struct App {
    config: AppConfig,
    session: SessionStore,
    client: Arc<BookSwapClient>,
    guard: RouteGuard,
}

impl App {
    fn new(config: AppConfig) -> anyhow::Result<Self> {
        let storage = FileSessionStorage::new(config.session_file.clone());
        let session = SessionStore::hydrate(Arc::new(storage));
        let client = BookSwapClient::new(&config.api_url, config.request_timeout(), session.clone())
            .context("Failed to create BookSwap client")?;
        Ok(Self {
            guard: RouteGuard::new(session.clone()),
            client: Arc::new(client),
            session,
            config,
        })
    }

    /// Runs the route guard for `path`, failing when a login is needed first
    fn enter(&self, path: &str) -> anyhow::Result<()> {
        match self.guard.navigate(path) {
            Navigation::Render(_) => Ok(()),
            Navigation::Redirect { from, .. } => anyhow::bail!(
                "Please log in first: bookswap login <email> --password <password> --from {from}"
            ),
        }
    }

    fn dashboard(&self) -> DashboardController {
        DashboardController::new(self.client.clone(), self.client.clone())
    }

    fn explore(&self) -> ExploreController {
        ExploreController::new(self.client.clone(), self.client.clone())
    }

    fn navbar(&self) -> NavbarController {
        NavbarController::new(
            self.session.clone(),
            self.client.clone(),
            self.config.poll_interval(),
        )
    }
}

fn ready<T>(state: Loadable<T>) -> anyhow::Result<T> {
    match state {
        Loadable::Ready(data) => Ok(data),
        Loadable::Failed(message) => anyhow::bail!(message),
        Loadable::SignedOut => anyhow::bail!("Your session has expired, please log in again"),
        Loadable::Idle | Loadable::Loading => anyhow::bail!("Nothing was loaded"),
    }
}

fn read_upload(path: &Path) -> anyhow::Result<FileUpload> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());
    let extension = path
        .extension()
        .map(|extension| extension.to_string_lossy().to_lowercase());
    let mime_type = match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    };
    Ok(FileUpload::new(file_name, mime_type, bytes))
}

async fn run(app: App, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Login {
            email,
            password,
            from,
        } => {
            let login = LoginController::new(app.client.clone(), app.session.clone());
            let session = login.login(&email, &password).await?;
            println!("Welcome back, {}!", session.first_name());
            println!("Continue at {}", post_login_destination(from.as_deref()));
        }
        Command::Signup {
            name,
            email,
            password,
            latitude,
            longitude,
            picture,
        } => {
            let picture = picture.as_deref().map(read_upload).transpose()?;
            let login = LoginController::new(app.client.clone(), app.session.clone());
            let request = SignUpRequest {
                name,
                email,
                password,
                latitude,
                longitude,
            };
            let session = login.signup(request, picture).await?;
            println!("Welcome, {}!", session.first_name());
        }
        Command::Logout => {
            app.session.clear_session()?;
            println!("Logged out");
        }
        Command::Whoami => match app.navbar().menu() {
            NavbarMenu::Guest => println!("Not logged in"),
            NavbarMenu::Member { first_name } => {
                let session = app.session.session();
                let user_id = session.as_ref().map_or("", |session| session.user_id.as_str());
                println!("{first_name} ({user_id})");
            }
        },
        Command::Open { path } => match app.guard.navigate(&path) {
            Navigation::Render(view) => println!("{view:?}"),
            Navigation::Redirect { to, from } => println!("Redirect to {to} (from {from})"),
        },
        Command::Profile => {
            app.enter("/profile")?;
            let profile = ProfileController::new(app.client.clone(), app.session.clone());
            profile.load().await;
            let profile = ready(profile.state())?;
            println!("{} <{}>", profile.name, profile.email);
            if let Some(location) = &profile.location_name {
                println!("Location: {location}");
            }
            if let Some(link) = profile.map_link() {
                println!("Map: {link}");
            }
        }
        Command::Dashboard => {
            app.enter("/dashboard")?;
            let dashboard = app.dashboard();
            dashboard.load().await;
            let data = ready(dashboard.state())?;
            let pending = data.pending_requests_by_book();

            println!("My books:");
            for book in &data.my_books {
                println!(
                    "  [{}] {} by {} ({:?})",
                    book.id, book.title, book.author, book.status
                );
                for request in pending.get(&book.id).into_iter().flatten() {
                    println!(
                        "      request {} from {}",
                        request.id,
                        request.requester_name.as_deref().unwrap_or("unknown")
                    );
                }
            }
            println!("Sent requests:");
            for request in &data.outgoing_requests {
                println!(
                    "  [{}] {} ({:?})",
                    request.id, request.book.title, request.status
                );
            }
        }
        Command::Respond {
            request_id,
            decision,
        } => {
            app.enter("/dashboard")?;
            let dashboard = app.dashboard();
            dashboard.load().await;
            let status = match decision {
                Decision::Accept => SwapRequestStatus::Accepted,
                Decision::Decline => SwapRequestStatus::Declined,
            };
            println!("{}", dashboard.respond_to_request(request_id, status).await?);
        }
        Command::AddBook {
            title,
            author,
            genre,
            language,
            condition,
            description,
            exchange_preference,
            latitude,
            longitude,
            lent_out,
            photo,
            book_id,
        } => {
            app.enter("/dashboard")?;
            let photo = photo.as_deref().map(read_upload).transpose()?;
            let request = BookRequest {
                title,
                author,
                genre,
                language,
                condition: condition.into(),
                description,
                exchange_preference,
                latitude,
                longitude,
                status: if lent_out {
                    BookStatus::LentOut
                } else {
                    BookStatus::Available
                },
                photo_filename: None,
            };
            let book = app.dashboard().save_book(book_id, request, photo).await?;
            println!("Saved book {} ({})", book.id, book.title);
        }
        Command::DeleteBook { book_id } => {
            app.enter("/dashboard")?;
            app.dashboard().delete_book(book_id).await?;
            println!("Deleted book {book_id}");
        }
        Command::Explore { search, genre } => {
            app.enter("/explore")?;
            let explore = app.explore();
            explore.set_search(search);
            explore.set_genre(genre);
            explore.load().await;
            ready(explore.state())?;

            let cards = explore.visible_books();
            if cards.is_empty() {
                println!("No books are available for swapping right now. Check back later!");
            }
            for card in cards {
                println!(
                    "[{}] {} by {} - {} - {}",
                    card.book.id,
                    card.book.title,
                    card.book.author,
                    card.distance.as_deref().unwrap_or("distance unknown"),
                    card.action_label()
                );
            }
        }
        Command::Request { book_id } => {
            app.enter("/explore")?;
            let explore = app.explore();
            explore.load().await;
            println!("{}", explore.request_swap(book_id).await?);
        }
        Command::Notifications { read, read_all } => {
            anyhow::ensure!(app.session.is_authenticated(), "Please log in first");
            let navbar = app.navbar();
            if let Some(notification_id) = read {
                navbar.mark_as_read(notification_id).await?;
            } else if read_all {
                navbar.mark_all_as_read().await?;
            } else {
                navbar.open_notifications().await;
            }

            for notification in ready(navbar.notifications())? {
                let marker = if notification.is_read { " " } else { "*" };
                println!("{marker} [{}] {}", notification.id, notification.message);
            }
        }
        Command::Watch => {
            anyhow::ensure!(app.session.is_authenticated(), "Please log in first");
            watch_notifications(&app.navbar()).await;
        }
    }
    Ok(())
}

async fn watch_notifications(navbar: &NavbarController) {
    navbar.mount();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut last_count = None;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => {
                if navbar.menu() == NavbarMenu::Guest {
                    println!("Session ended");
                    break;
                }
                let count = navbar.unread_count();
                if last_count != Some(count) {
                    println!("Unread notifications: {count}");
                    last_count = Some(count);
                }
            }
        }
    }
    navbar.unmount();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    init_telemetry(APP_NAME, config.jaeger_enabled)?;
    let jaeger_enabled = config.jaeger_enabled;

    let result = run(App::new(config)?, cli.command).await;
    shutdown_telemetry(jaeger_enabled);
    result
}
