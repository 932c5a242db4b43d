use crate::session::SessionStore;

pub const LOGIN_PATH: &str = "/login";
pub const HOME_PATH: &str = "/";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum View {
    Home,
    Login,
    SignUp,
    Dashboard,
    Explore,
    Profile,
    NotFound,
}

impl View {
    pub fn from_path(path: &str) -> Self {
        // Query and fragment do not take part in routing
        let path = path.split(['?', '#']).next().unwrap_or_default();
        match path.trim_end_matches('/') {
            "" => View::Home,
            "/login" => View::Login,
            "/signup" => View::SignUp,
            "/dashboard" => View::Dashboard,
            "/explore" => View::Explore,
            "/profile" => View::Profile,
            _ => View::NotFound,
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, View::Dashboard | View::Explore | View::Profile)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Navigation {
    Render(View),
    /// Login is required, `from` is the path that was asked for
    Redirect { to: String, from: String },
}

#[derive(Clone)]
/// Decides on every navigation whether the target view may be shown.
/// Reads only the session store, never the network.
pub struct RouteGuard {
    session: SessionStore,
}

impl RouteGuard {
    pub fn new(session: SessionStore) -> Self {
        Self { session }
    }

    pub fn navigate(&self, path: &str) -> Navigation {
        let view = View::from_path(path);
        if !view.requires_auth() {
            return Navigation::Render(view);
        }

        if let Some(session) = self.session.session() {
            if !session.is_expired() {
                return Navigation::Render(view);
            }
            tracing::info!(user_id = %session.user_id, "Session expired, logging out");
            self.session.invalidate();
        }

        tracing::debug!(path, "Redirecting unauthenticated navigation to login");
        Navigation::Redirect {
            to: LOGIN_PATH.to_string(),
            from: path.to_string(),
        }
    }
}

/// Where to go after a successful login: the remembered protected path, else home
pub fn post_login_destination(from: Option<&str>) -> String {
    from.filter(|path| View::from_path(path).requires_auth())
        .unwrap_or(HOME_PATH)
        .to_string()
}
