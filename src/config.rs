use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

// Defaults
const BIND_ADDR: &str = "0.0.0.0:8080";
const USERS_FILE: &str = "users.txt";
const STATIC_DIR: &str = "static";
const UPLOAD_DIR: &str = "static/uploads";
const PLOT_FILE: &str = "static/plot.png";
const ALLOWED_EXTENSIONS: [&str; 3] = ["csv", "xlsx", "parquet"];
const SESSION_SECRET: &str =
    "dataview-session-secret-change-me-0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJ";

/// Application configuration
///
/// Built once at process start and handed to the application state. Every value is
/// hardcoded in [`AppConfig::default`]; there is no environment override.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP server listens on
    pub bind_addr: String,

    /// Plaintext `username,password` file read at startup
    pub users_file: PathBuf,

    /// Directory served under `/static`
    pub static_dir: PathBuf,

    /// Directory uploaded files are written to
    pub upload_dir: PathBuf,

    /// Path of the generated plot image, overwritten on every generation
    pub plot_file: PathBuf,

    /// Lowercase file extensions accepted by the upload handler
    pub allowed_extensions: Vec<String>,

    /// Secret used to sign the session cookie (at least 64 bytes)
    pub session_secret: String,

    /// Plot image size in pixels
    pub plot_size: (u32, u32),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: BIND_ADDR.to_string(),
            users_file: PathBuf::from(USERS_FILE),
            static_dir: PathBuf::from(STATIC_DIR),
            upload_dir: PathBuf::from(UPLOAD_DIR),
            plot_file: PathBuf::from(PLOT_FILE),
            allowed_extensions: ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            session_secret: SESSION_SECRET.to_string(),
            plot_size: (800, 600),
        }
    }
}

impl AppConfig {
    /// Create the static and upload directories if they don't exist.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        create_dir_all(&self.static_dir)?;
        create_dir_all(&self.upload_dir)?;
        if let Some(parent) = self.plot_file.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Public URL of the generated plot.
    ///
    /// The plot file normally lives inside the static directory; otherwise only its
    /// file name is kept.
    pub fn plot_url(&self) -> String {
        let relative = self
            .plot_file
            .strip_prefix(&self.static_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| {
                self.plot_file
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_default()
            });
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        format!("/static/{}", parts.join("/"))
    }

    /// Whether `extension` (any case) is on the upload whitelist.
    pub fn is_allowed_extension(&self, extension: &str) -> bool {
        let extension = extension.to_lowercase();
        self.allowed_extensions.iter().any(|e| *e == extension)
    }
}
