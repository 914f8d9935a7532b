/*!
# Dataview

A small browser-based tool for taking a first look at a tabular dataset, built in Rust.

## Overview

A user signs in against a flat credential file, uploads a CSV file, previews the first
rows and draws a bar, line or scatter chart from two of its columns.

## Architecture

### Frontend Layer
- **Technologies**: HTML (handlebars templates), Bootstrap CSS
- **Pages**: login, dashboard (upload), overview (preview), visualize (chart)

### Backend Layer
- **Technologies**: Rust, axum, plotters
- **Core Components**:
  - Credential Store - `username,password` pairs loaded once at startup
  - Session Manager - signed session cookie mapped to a server-side session record
  - Upload Handler - extension whitelist, filename sanitizing, file save
  - Data Loader - CSV parsing with whole-file column type inference
  - Preview Renderer - first ten rows as an HTML table
  - Plot Generator - bar/line/scatter PNG rendered to a fixed path

### Data Persistence Layer
- `users.txt` is read once and never written
- Uploads land in `static/uploads/`, same-name uploads overwrite
- The chart is written to `static/plot.png`, overwritten by every plot

## Modules

- **config**: hardcoded application configuration
- **error**: error types and their HTTP mapping
- **login**: credentials, sessions, route guards, login/logout handlers
- **upload**: extension whitelist and filename sanitizing
- **loader**: CSV loading into a [`loader::Table`]
- **preview**: HTML preview of a table
- **graph**: chart generation
- **app**: application state, routing and page handlers

## Routes

- `/` - login form and credential check
- `/dashboard` - upload form and file upload
- `/overview` - preview of the uploaded file
- `/visualize` - column pickers and chart
- `/logout` - end the session
- `/static/...` - stylesheet, uploads and the generated chart
*/

pub mod config;
pub mod error;
pub mod loader;
pub mod login;
pub mod upload;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod graph;
#[cfg(feature = "web")]
pub mod preview;

pub use config::AppConfig;
pub use error::{AppError, CredentialError};
pub use loader::{ColumnKind, Table, Value, load_table};
pub use login::{CredentialStore, Session};
