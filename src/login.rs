use crate::error::CredentialError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
#[cfg(feature = "web")]
use std::sync::{Arc, PoisonError, RwLock};

#[cfg(feature = "web")]
use crate::app::{AppState, Flash, render};
#[cfg(feature = "web")]
use crate::error::AppError;
#[cfg(feature = "web")]
use axum::{
    Form,
    extract::{FromRequestParts, State},
    http::request::Parts,
    response::{Html, IntoResponse, Redirect, Response},
};
#[cfg(feature = "web")]
use axum_extra::extract::cookie::{Cookie, SignedCookieJar};
#[cfg(feature = "web")]
use serde::Deserialize;
#[cfg(feature = "web")]
use uuid::Uuid;

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "session";

/// Flash text shown when a login attempt fails
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid credentials, please try again.";

/// Username/password pairs loaded once at startup
///
/// Passwords are kept in plaintext exactly as they appear in the credential file.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    users: HashMap<String, String>,
}

impl CredentialStore {
    /// Read and parse a credential file
    ///
    /// # Errors
    /// * The file cannot be read
    /// * Any line is not exactly `username,password`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| CredentialError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse `username,password` lines
    ///
    /// Each line is trimmed before splitting. A blank line, a line without a comma or
    /// a line with more than one comma rejects the whole file. Later lines win over
    /// earlier ones for the same username.
    pub fn parse(contents: &str) -> Result<Self, CredentialError> {
        let mut users = HashMap::new();

        for (index, line) in contents.lines().enumerate() {
            let fields: Vec<&str> = line.trim().split(',').collect();
            match fields.as_slice() {
                [username, password] => {
                    users.insert(username.to_string(), password.to_string());
                }
                _ => return Err(CredentialError::MalformedLine { line: index + 1 }),
            }
        }

        Ok(Self { users })
    }

    /// Stored password for `username`, if any.
    pub fn lookup(&self, username: &str) -> Option<&str> {
        self.users.get(username).map(String::as_str)
    }

    /// Check a login attempt against the stored pairs
    ///
    /// # Arguments
    /// * `username` - Username typed into the login form
    /// * `password` - Password typed into the login form
    ///
    /// # Returns
    /// * `bool` - True only when the username exists and its password matches exactly
    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.lookup(username) == Some(password)
    }

    /// Number of distinct usernames
    ///
    /// # Returns
    /// * `usize` - Count of stored credential pairs after duplicates collapse
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the store holds no credentials at all
    ///
    /// # Returns
    /// * `bool` - True when the credential file had no lines
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Server-side session data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    /// Username of the logged-in user
    pub username: Option<String>,

    /// Most recently uploaded file
    pub file_path: Option<PathBuf>,
}

/// In-memory session map keyed by the id stored in the session cookie
#[cfg(feature = "web")]
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

#[cfg(feature = "web")]
impl SessionStore {
    /// Look up a session by id
    ///
    /// # Arguments
    /// * `id` - Session id taken from the verified cookie
    ///
    /// # Returns
    /// * `Option<Session>` - A copy of the stored session, or None for an unknown id
    pub fn get(&self, id: &str) -> Option<Session> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(id).cloned()
    }

    /// Store `session` under `id`, replacing any previous entry.
    pub fn insert(&self, id: &str, session: Session) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(id.to_string(), session);
    }

    /// Forget a session; unknown ids are ignored.
    pub fn remove(&self, id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(id);
    }

    /// Persist a request's session record, allocating an id if it has none.
    ///
    /// Returns the id the record is stored under.
    pub fn save(&self, record: &SessionRecord) -> String {
        let id = record
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.insert(&id, record.session.clone());
        id
    }
}

/// The session belonging to the current request
///
/// Extracted from the signed session cookie. `id` is `None` when the browser has no
/// session yet or presents an id the server does not know.
#[cfg(feature = "web")]
#[derive(Debug, Clone, Default)]
pub struct SessionRecord {
    pub id: Option<String>,
    pub session: Session,
}

#[cfg(feature = "web")]
#[axum::async_trait]
impl FromRequestParts<AppState> for SessionRecord {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = SignedCookieJar::from_headers(&parts.headers, state.key.clone());
        let record = jar
            .get(SESSION_COOKIE)
            .and_then(|cookie| {
                let id = cookie.value().to_string();
                state.sessions.get(&id).map(|session| SessionRecord {
                    id: Some(id),
                    session,
                })
            })
            .unwrap_or_default();
        Ok(record)
    }
}

/// Why a guarded route refused the request
#[cfg(feature = "web")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unauthorized {
    /// No logged-in user; send them to the login form
    NotLoggedIn,

    /// No uploaded file yet; send them to the upload form
    NoUpload,
}

#[cfg(feature = "web")]
impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        match self {
            Unauthorized::NotLoggedIn => Redirect::to("/").into_response(),
            Unauthorized::NoUpload => Redirect::to("/dashboard").into_response(),
        }
    }
}

/// Guard for routes that need a logged-in user
#[cfg(feature = "web")]
#[derive(Debug, Clone)]
pub struct LoggedIn {
    pub record: SessionRecord,
    pub username: String,
}

#[cfg(feature = "web")]
#[axum::async_trait]
impl FromRequestParts<AppState> for LoggedIn {
    type Rejection = Unauthorized;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let record = match SessionRecord::from_request_parts(parts, state).await {
            Ok(record) => record,
            Err(never) => match never {},
        };
        let username = record
            .session
            .username
            .clone()
            .ok_or(Unauthorized::NotLoggedIn)?;
        Ok(LoggedIn { record, username })
    }
}

/// Guard for routes that work on the uploaded file
///
/// The file check comes first so a logged-out browser is bounced to the dashboard,
/// which in turn bounces it to the login form.
#[cfg(feature = "web")]
#[derive(Debug, Clone)]
pub struct WithUpload {
    pub record: SessionRecord,
    pub username: String,
    pub file_path: PathBuf,
}

#[cfg(feature = "web")]
#[axum::async_trait]
impl FromRequestParts<AppState> for WithUpload {
    type Rejection = Unauthorized;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let record = match SessionRecord::from_request_parts(parts, state).await {
            Ok(record) => record,
            Err(never) => match never {},
        };
        let file_path = record
            .session
            .file_path
            .clone()
            .ok_or(Unauthorized::NoUpload)?;
        let username = record
            .session
            .username
            .clone()
            .ok_or(Unauthorized::NotLoggedIn)?;
        Ok(WithUpload {
            record,
            username,
            file_path,
        })
    }
}

/// Login form fields
#[cfg(feature = "web")]
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Serve the login form
#[cfg(feature = "web")]
pub async fn serve_login_page(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    render(&state, "login", None)
}

/// Handle a login attempt
///
/// On success the username is stored in the session and the browser is sent to the
/// dashboard; otherwise the login form is shown again with a flash message.
#[cfg(feature = "web")]
pub async fn handle_login(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    mut record: SessionRecord,
    Form(credentials): Form<LoginForm>,
) -> Result<Response, AppError> {
    if !state
        .credentials
        .verify(&credentials.username, &credentials.password)
    {
        log::warn!("failed login attempt for user {}", credentials.username);
        let page = render(&state, "login", Some(Flash::danger(INVALID_CREDENTIALS_MESSAGE)))?;
        return Ok(page.into_response());
    }

    log::info!("user {} logged in", credentials.username);
    record.session.username = Some(credentials.username);
    let id = state.sessions.save(&record);
    let cookie = Cookie::build((SESSION_COOKIE, id)).path("/").http_only(true);

    Ok((jar.add(cookie), Redirect::to("/dashboard")).into_response())
}

/// Handle logout
///
/// Clears the username and uploaded file unconditionally and drops the cookie.
#[cfg(feature = "web")]
pub async fn handle_logout(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    record: SessionRecord,
) -> (SignedCookieJar, Redirect) {
    if let Some(id) = &record.id {
        if let Some(username) = &record.session.username {
            log::info!("user {} logged out", username);
        }
        state.sessions.remove(id);
    }

    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Redirect::to("/"),
    )
}
