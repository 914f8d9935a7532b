use axum::{
    Form, Router,
    body::Body,
    extract::{DefaultBodyLimit, FromRef, Multipart, State},
    http::Request,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::Key;
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::graph::{PlotKind, generate_plot};
use crate::loader::load_table;
use crate::login::{
    CredentialStore, LoggedIn, SessionStore, WithUpload, handle_login, handle_logout,
    serve_login_page,
};
use crate::preview::preview;
use crate::upload::{INVALID_FILE_MESSAGE, save_upload, upload_target};

/// Shared application state
///
/// Built once at startup and cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub credentials: Arc<CredentialStore>,
    pub sessions: SessionStore,
    pub templates: Arc<Handlebars<'static>>,
    pub key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

impl AppState {
    /// Load credentials, register templates and derive the cookie key
    ///
    /// # Errors
    /// * The credential file is missing or malformed
    /// * The session secret is shorter than 64 bytes
    /// * A template fails to compile
    pub fn new(config: AppConfig) -> Result<Self, AppError> {
        let credentials = CredentialStore::load(&config.users_file)?;
        log::info!(
            "loaded {} credentials from {}",
            credentials.len(),
            config.users_file.display()
        );

        if config.session_secret.len() < 64 {
            return Err(AppError::Config(
                "session secret must be at least 64 bytes".to_string(),
            ));
        }
        let key = Key::from(config.session_secret.as_bytes());

        Ok(Self {
            config: Arc::new(config),
            credentials: Arc::new(credentials),
            sessions: SessionStore::default(),
            templates: Arc::new(templates()?),
            key,
        })
    }
}

fn templates() -> Result<Handlebars<'static>, AppError> {
    let mut hb = Handlebars::new();
    hb.register_partial("flash", include_str!("../templates/flash.hbs"))?;
    hb.register_template_string("login", include_str!("../templates/login.hbs"))?;
    hb.register_template_string("dashboard", include_str!("../templates/dashboard.hbs"))?;
    hb.register_template_string("overview", include_str!("../templates/overview.hbs"))?;
    hb.register_template_string("visualize", include_str!("../templates/visualize.hbs"))?;
    Ok(hb)
}

/// A one-off message shown above a form
#[derive(Debug, Clone, Serialize)]
pub struct Flash {
    pub category: &'static str,
    pub message: String,
}

impl Flash {
    pub fn danger(message: &str) -> Self {
        Self {
            category: "danger",
            message: message.to_string(),
        }
    }
}

/// Render a page whose only dynamic content is an optional flash message.
pub fn render(state: &AppState, name: &str, flash: Option<Flash>) -> Result<Html<String>, AppError> {
    render_with(state, name, &json!({ "flash": flash }))
}

pub fn render_with(
    state: &AppState,
    name: &str,
    context: &serde_json::Value,
) -> Result<Html<String>, AppError> {
    Ok(Html(state.templates.render(name, context)?))
}

/// Build the router
///
/// `/` and `/logout` are open; every other page sits behind a session guard.
pub fn router(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();

    Router::new()
        .route("/", get(serve_login_page).post(handle_login))
        .route("/dashboard", get(serve_dashboard).post(handle_upload))
        .route("/overview", get(serve_overview))
        .route("/visualize", get(serve_visualize).post(handle_visualize))
        .route("/logout", get(handle_logout))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::disable())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path()
                )
            }),
        )
        .with_state(state)
}

/// Start the web application
///
/// Creates the static and upload directories, loads credentials and serves until the
/// process is stopped.
pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.ensure_layout()?;
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config)?;
    let app = router(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    log::info!("Listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_dashboard(
    State(state): State<AppState>,
    _user: LoggedIn,
) -> Result<Html<String>, AppError> {
    render(&state, "dashboard", None)
}

/// Accept a file upload from the dashboard form
///
/// Disallowed names re-render the dashboard with a flash message; accepted files are
/// written to the upload directory and recorded in the session.
async fn handle_upload(
    State(state): State<AppState>,
    LoggedIn {
        mut record,
        username,
    }: LoggedIn,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let contents = field.bytes().await?.to_vec();
            upload = Some((filename, contents));
        }
    }

    let (filename, contents) = upload.ok_or(AppError::MissingField("file"))?;

    let Some(target) = upload_target(&filename, &state.config) else {
        log::info!("rejected upload {:?} from {}", filename, username);
        let page = render(&state, "dashboard", Some(Flash::danger(INVALID_FILE_MESSAGE)))?;
        return Ok(page.into_response());
    };

    save_upload(&target, &contents).await?;
    log::info!(
        "saved upload {} ({} bytes) for {}",
        target.display(),
        contents.len(),
        username
    );

    record.session.file_path = Some(target);
    state.sessions.save(&record);

    Ok(Redirect::to("/overview").into_response())
}

async fn serve_overview(
    State(state): State<AppState>,
    upload: WithUpload,
) -> Result<Html<String>, AppError> {
    let table = load_table(&upload.file_path)?;
    let data_preview = preview(&table);

    render_with(
        &state,
        "overview",
        &json!({
            "username": upload.username,
            "data_preview": data_preview,
        }),
    )
}

/// Plot request from the visualize form
#[derive(Debug, Deserialize)]
pub struct PlotForm {
    pub variable1: String,
    pub variable2: String,
    pub plot_type: String,
}

async fn serve_visualize(
    State(state): State<AppState>,
    upload: WithUpload,
) -> Result<Html<String>, AppError> {
    let table = load_table(&upload.file_path)?;

    render_with(
        &state,
        "visualize",
        &json!({
            "username": upload.username,
            "columns": table.columns(),
        }),
    )
}

/// Generate a plot from two columns and show it under the form
async fn handle_visualize(
    State(state): State<AppState>,
    upload: WithUpload,
    Form(form): Form<PlotForm>,
) -> Result<Html<String>, AppError> {
    let table = load_table(&upload.file_path)?;
    let kind = PlotKind::parse(&form.plot_type);

    let plot_path = generate_plot(
        &table,
        &form.variable1,
        &form.variable2,
        kind,
        &state.config.plot_file,
        state.config.plot_size,
    )?;
    log::info!(
        "generated {:?} plot of {} vs {} at {}",
        kind,
        form.variable1,
        form.variable2,
        plot_path.display()
    );

    render_with(
        &state,
        "visualize",
        &json!({
            "username": upload.username,
            "columns": table.columns(),
            "plot_url": state.config.plot_url(),
        }),
    )
}
