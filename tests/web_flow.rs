#![cfg(feature = "web")]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use dataview::app::{AppState, router};
use dataview::login::INVALID_CREDENTIALS_MESSAGE;
use dataview::upload::INVALID_FILE_MESSAGE;
use dataview::{AppConfig, AppError};
use std::fs;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "dataview-test-boundary";

struct TestApp {
    app: Router,
    config: AppConfig,
    _dir: TempDir,
}

fn setup() -> TestApp {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let users_file = dir.path().join("users.txt");
    fs::write(&users_file, "alice,wonderland\nbob,builder\n").expect("failed to write users");

    let config = AppConfig {
        users_file,
        static_dir: dir.path().join("static"),
        upload_dir: dir.path().join("static/uploads"),
        plot_file: dir.path().join("static/plot.png"),
        ..AppConfig::default()
    };
    config.ensure_layout().expect("failed to create layout");

    let state = AppState::new(config.clone()).expect("failed to build state");
    TestApp {
        app: router(state),
        config,
        _dir: dir,
    }
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.expect("request failed")
}

async fn get(app: &Router, uri: &str, cookie: Option<&str>) -> Response {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    send(app, builder.body(Body::empty()).expect("failed to build request")).await
}

async fn post_form(app: &Router, uri: &str, cookie: Option<&str>, body: &str) -> Response {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    send(
        app,
        builder
            .body(Body::from(body.to_string()))
            .expect("failed to build request"),
    )
    .await
}

async fn upload(app: &Router, cookie: &str, filename: &str, contents: &str) -> Response {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n{c}\r\n--{b}--\r\n",
        b = BOUNDARY,
        f = filename,
        c = contents
    );
    let request = Request::builder()
        .method("POST")
        .uri("/dashboard")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::COOKIE, cookie)
        .body(Body::from(body))
        .expect("failed to build request");
    send(app, request).await
}

async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    String::from_utf8(bytes.to_vec()).expect("body was not utf-8")
}

fn location(response: &Response) -> &str {
    assert!(
        response.status().is_redirection(),
        "expected a redirect, got {}",
        response.status()
    );
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("redirect without location")
}

fn session_cookie(response: &Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("no session cookie set");
    set_cookie
        .split(';')
        .next()
        .expect("empty set-cookie header")
        .to_string()
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let response = post_form(
        app,
        "/",
        None,
        &format!("username={}&password={}", username, password),
    )
    .await;
    assert_eq!(location(&response), "/dashboard");
    session_cookie(&response)
}

fn assert_only_red_ink(path: &std::path::Path) {
    let image = image::open(path).expect("plot is not a readable image").to_rgb8();
    let mut inked = 0;
    for pixel in image.pixels() {
        let [r, g, b] = pixel.0;
        if (r, g, b) == (255, 255, 255) {
            continue;
        }
        inked += 1;
        assert!(r >= g && r >= b, "non-red pixel {:?}", pixel.0);
        assert!(g.abs_diff(b) <= 8, "non-red pixel {:?}", pixel.0);
    }
    assert!(inked > 0, "plot is blank");
}

#[tokio::test]
async fn every_credential_pair_logs_in() {
    let test = setup();

    for (username, password) in [("alice", "wonderland"), ("bob", "builder")] {
        let cookie = login(&test.app, username, password).await;
        let response = get(&test.app, "/dashboard", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("enctype=\"multipart/form-data\""));
    }
}

#[tokio::test]
async fn wrong_credentials_redisplay_the_login_form() {
    let test = setup();

    for body in [
        "username=alice&password=builder",
        "username=carol&password=wonderland",
        "username=alice&password=",
    ] {
        let response = post_form(&test.app, "/", None, body).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        let page = body_string(response).await;
        assert!(page.contains(INVALID_CREDENTIALS_MESSAGE));
        assert!(page.contains("alert-danger"));
        assert!(page.contains("<form method=\"post\" action=\"/\">"));
    }
}

#[tokio::test]
async fn guarded_routes_redirect_backwards_without_a_session() {
    let test = setup();

    assert_eq!(location(&get(&test.app, "/dashboard", None).await), "/");
    assert_eq!(location(&get(&test.app, "/overview", None).await), "/dashboard");
    assert_eq!(location(&get(&test.app, "/visualize", None).await), "/dashboard");

    let cookie = login(&test.app, "alice", "wonderland").await;
    assert_eq!(
        location(&get(&test.app, "/overview", Some(&cookie)).await),
        "/dashboard"
    );
    assert_eq!(
        location(&get(&test.app, "/visualize", Some(&cookie)).await),
        "/dashboard"
    );
}

#[tokio::test]
async fn tampered_cookie_is_treated_as_logged_out() {
    let test = setup();
    let cookie = login(&test.app, "alice", "wonderland").await;
    let tampered = format!("{}x", cookie);

    assert_eq!(location(&get(&test.app, "/dashboard", Some(&tampered)).await), "/");
}

#[tokio::test]
async fn csv_upload_unlocks_the_overview() {
    let test = setup();
    let cookie = login(&test.app, "alice", "wonderland").await;

    let response = upload(&test.app, &cookie, "data.csv", "a,b\n1,2\n3,4\n").await;
    assert_eq!(location(&response), "/overview");
    assert!(test.config.upload_dir.join("data.csv").exists());

    let response = get(&test.app, "/overview", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_string(response).await;

    assert!(page.contains("table table-striped table-hover"));
    assert!(page.contains("<th>a</th>\n      <th>b</th>"));
    assert_eq!(page.matches("<th>").count(), 2);
    assert_eq!(page.matches("<tr>").count(), 2);
    assert!(page.contains("<td>1</td>\n      <td>2</td>"));
    assert!(page.contains("<td>3</td>\n      <td>4</td>"));
}

#[tokio::test]
async fn disallowed_extension_is_rejected() {
    let test = setup();
    let cookie = login(&test.app, "alice", "wonderland").await;

    let response = upload(&test.app, &cookie, "data.exe", "MZ").await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_string(response).await;
    assert!(page.contains(INVALID_FILE_MESSAGE));
    assert!(page.contains("action=\"/dashboard\""));

    assert!(!test.config.upload_dir.join("data.exe").exists());
    assert_eq!(
        location(&get(&test.app, "/overview", Some(&cookie)).await),
        "/dashboard"
    );
}

#[tokio::test]
async fn upload_names_are_sanitized() {
    let test = setup();
    let cookie = login(&test.app, "alice", "wonderland").await;

    let response = upload(&test.app, &cookie, "../../my data.CSV", "x\n1\n").await;
    assert_eq!(location(&response), "/overview");
    assert!(test.config.upload_dir.join("my_data.CSV").exists());
}

#[tokio::test]
async fn upload_without_file_field_is_a_bad_request() {
    let test = setup();
    let cookie = login(&test.app, "alice", "wonderland").await;

    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nvalue\r\n--{b}--\r\n",
        b = BOUNDARY
    );
    let request = Request::builder()
        .method("POST")
        .uri("/dashboard")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::COOKIE, &cookie)
        .body(Body::from(body))
        .expect("failed to build request");

    let response = send(&test.app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn same_name_upload_overwrites() {
    let test = setup();
    let cookie = login(&test.app, "alice", "wonderland").await;

    upload(&test.app, &cookie, "data.csv", "a,b\nfirst,1\n").await;
    upload(&test.app, &cookie, "data.csv", "a,b\nsecond,2\n").await;

    let page = body_string(get(&test.app, "/overview", Some(&cookie)).await).await;
    assert!(page.contains("<td>second</td>"));
    assert!(!page.contains("<td>first</td>"));
    assert_eq!(
        fs::read_to_string(test.config.upload_dir.join("data.csv")).unwrap(),
        "a,b\nsecond,2\n"
    );
}

#[tokio::test]
async fn logout_clears_username_and_file() {
    let test = setup();
    let cookie = login(&test.app, "alice", "wonderland").await;
    upload(&test.app, &cookie, "data.csv", "a,b\n1,2\n").await;
    assert_eq!(
        get(&test.app, "/overview", Some(&cookie)).await.status(),
        StatusCode::OK
    );

    let response = get(&test.app, "/logout", Some(&cookie)).await;
    assert_eq!(location(&response), "/");

    let response = get(&test.app, "/overview", Some(&cookie)).await;
    assert_eq!(location(&response), "/dashboard");
    let response = get(&test.app, "/dashboard", Some(&cookie)).await;
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn visualize_lists_columns() {
    let test = setup();
    let cookie = login(&test.app, "alice", "wonderland").await;
    upload(&test.app, &cookie, "data.csv", "city,sales\nOslo,3\n").await;

    let response = get(&test.app, "/visualize", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_string(response).await;

    assert_eq!(page.matches("<option value=\"city\">city</option>").count(), 2);
    assert_eq!(page.matches("<option value=\"sales\">sales</option>").count(), 2);
    assert!(!page.contains("<img"));
}

#[tokio::test]
async fn bogus_plot_type_draws_only_red_text() {
    let test = setup();
    let cookie = login(&test.app, "alice", "wonderland").await;
    upload(&test.app, &cookie, "data.csv", "city,sales\nOslo,3\nRome,5\n").await;

    for columns in ["variable1=city&variable2=sales", "variable1=nope&variable2=city"] {
        let body = format!("{}&plot_type=bogus", columns);
        let response = post_form(&test.app, "/visualize", Some(&cookie), &body).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("src=\"/static/plot.png\""));

        assert_only_red_ink(&test.config.plot_file);
    }
}

#[tokio::test]
async fn bar_plot_is_written_and_served() {
    let test = setup();
    let cookie = login(&test.app, "alice", "wonderland").await;
    upload(
        &test.app,
        &cookie,
        "data.csv",
        "city,sales\nOslo,3\nRome,5\nOslo,7\n",
    )
    .await;

    let response = post_form(
        &test.app,
        "/visualize",
        Some(&cookie),
        "variable1=city&variable2=sales&plot_type=bar",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("<img src=\"/static/plot.png\""));
    assert!(test.config.plot_file.exists());

    let response = get(&test.app, "/static/plot.png", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );
}

#[tokio::test]
async fn line_and_scatter_plots_render_through_the_form() {
    let test = setup();
    let cookie = login(&test.app, "alice", "wonderland").await;
    upload(
        &test.app,
        &cookie,
        "data.csv",
        "day,city,sales\n1,Oslo,3\n2,Rome,5\n3,Oslo,7\n",
    )
    .await;

    for form in [
        "variable1=day&variable2=sales&plot_type=line",
        "variable1=city&variable2=sales&plot_type=line",
        "variable1=day&variable2=sales&plot_type=scatter",
        "variable1=city&variable2=sales&plot_type=scatter",
    ] {
        fs::remove_file(&test.config.plot_file).ok();

        let response = post_form(&test.app, "/visualize", Some(&cookie), form).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", form);

        let image = image::open(&test.config.plot_file)
            .expect("plot is not a readable image")
            .to_rgb8();
        assert_eq!(image.dimensions(), (800, 600));
    }
}

#[tokio::test]
async fn plotting_an_unknown_column_is_a_server_error() {
    let test = setup();
    let cookie = login(&test.app, "alice", "wonderland").await;
    upload(&test.app, &cookie, "data.csv", "a,b\n1,2\n").await;

    let response = post_form(
        &test.app,
        "/visualize",
        Some(&cookie),
        "variable1=a&variable2=missing&plot_type=line",
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn vanished_upload_is_a_server_error() {
    let test = setup();
    let cookie = login(&test.app, "alice", "wonderland").await;
    upload(&test.app, &cookie, "data.csv", "a,b\n1,2\n").await;
    fs::remove_file(test.config.upload_dir.join("data.csv")).unwrap();

    let response = get(&test.app, "/overview", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn malformed_credential_file_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let users_file = dir.path().join("users.txt");
    fs::write(&users_file, "alice,wonderland\nbob\n").unwrap();

    let config = AppConfig {
        users_file,
        ..AppConfig::default()
    };
    assert!(matches!(
        AppState::new(config),
        Err(AppError::Credentials(_))
    ));
}

#[test]
fn short_session_secret_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let users_file = dir.path().join("users.txt");
    fs::write(&users_file, "alice,wonderland\n").unwrap();

    let config = AppConfig {
        users_file,
        session_secret: "too short".to_string(),
        ..AppConfig::default()
    };
    assert!(matches!(AppState::new(config), Err(AppError::Config(_))));
}
