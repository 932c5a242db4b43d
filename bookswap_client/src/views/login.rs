use std::sync::Arc;

use crate::api::{FileUpload, SignUpRequest};
use crate::gateway::GatewayError;
use crate::services::AuthService;
use crate::session::{Session, SessionStore};
use crate::views::ViewError;

const INVALID_CREDENTIALS: &str = "Invalid username or password.";

/// Login and sign up forms, the only places a session is created
pub struct LoginController {
    auth: Arc<dyn AuthService>,
    session: SessionStore,
}

impl LoginController {
    pub fn new(auth: Arc<dyn AuthService>, session: SessionStore) -> Self {
        Self { auth, session }
    }

    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ViewError> {
        let response = self
            .auth
            .login(email, password)
            .await
            .map_err(authentication_failed)?;
        let session = Session::from_auth_response(response, email);
        self.session.set_session(session.clone())?;
        Ok(session)
    }

    #[tracing::instrument(skip(self, request, profile_picture), fields(email = %request.email))]
    pub async fn signup(
        &self,
        request: SignUpRequest,
        profile_picture: Option<FileUpload>,
    ) -> Result<Session, ViewError> {
        let email = request.email.clone();
        let response = self
            .auth
            .signup(request, profile_picture)
            .await
            .map_err(authentication_failed)?;
        let session = Session::from_auth_response(response, &email);
        self.session.set_session(session.clone())?;
        Ok(session)
    }
}

fn authentication_failed(err: GatewayError) -> ViewError {
    tracing::warn!("Authentication failed: {}", err);
    if err.status().is_some_and(|status| status.as_u16() == 401) {
        return ViewError::Authentication(INVALID_CREDENTIALS.to_string());
    }
    let message = err.user_message(&err.to_string());
    ViewError::Authentication(message)
}
