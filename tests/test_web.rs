use std::collections::HashMap;

use axum::{
    body::Body,
    http::{
        header::{COOKIE, LOCATION, SET_COOKIE},
        Request, Response, StatusCode,
    },
};
use carpool::{database::TestDatabase, get_app, router::NormalizedApp, AppState, Config};
use http_body_util::BodyExt;
use tower::ServiceExt;

struct Client {
    app: NormalizedApp,
    cookies: HashMap<String, String>,
}

impl Client {
    fn new(app: &NormalizedApp) -> Self {
        Self {
            app: app.clone(),
            cookies: HashMap::new(),
        }
    }

    fn request(&self, method: &str, path: &str) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(path);
        if self.cookies.is_empty() {
            return builder;
        }
        let cookies = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        builder.header(COOKIE, cookies)
    }

    fn store_cookies(&mut self, response: &Response<Body>) {
        for header in response.headers().get_all(SET_COOKIE) {
            let raw = header.to_str().unwrap();
            let pair = raw.split(';').next().unwrap();
            let (name, value) = pair.split_once('=').unwrap();
            self.cookies.insert(name.to_owned(), value.to_owned());
        }
    }

    async fn send(&mut self, request: Request<Body>) -> Response<Body> {
        let response = self.app.clone().oneshot(request).await.unwrap();
        self.store_cookies(&response);
        response
    }

    async fn get(&mut self, path: &str) -> Response<Body> {
        let request = self.request("GET", path).body(Body::empty()).unwrap();
        self.send(request).await
    }

    async fn post(&mut self, path: &str, fields: &[(&str, &str)]) -> Response<Body> {
        let csrf_token = self.cookies.get("csrf_token").cloned().unwrap_or_default();
        let mut fields = fields.to_vec();
        fields.push(("csrf_token", &csrf_token));
        self.post_raw(path, &fields).await
    }

    async fn post_raw(&mut self, path: &str, fields: &[(&str, &str)]) -> Response<Body> {
        let request = self
            .request("POST", path)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(serde_urlencoded::to_string(fields).unwrap()))
            .unwrap();
        self.send(request).await
    }

    async fn page(&mut self, path: &str) -> String {
        let response = self.get(path).await;
        assert_eq!(response.status(), StatusCode::OK, "GET {path}");
        body(response).await
    }
}

async fn body(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response.headers().get(LOCATION).unwrap().to_str().unwrap()
}

/// The database is returned so its file outlives the test body.
async fn setup() -> (TestDatabase, AppState, NormalizedApp) {
    let database = TestDatabase::setup().await;
    let state = AppState::with_database(Config::stub(), database.database().clone());
    let app = get_app(state.clone());
    (database, state, app)
}

async fn register_and_login(
    app: &NormalizedApp,
    email: &str,
    username: &str,
    role: &str,
) -> Client {
    let mut client = Client::new(app);
    client.get("/auth/register").await;
    let response = client
        .post(
            "/auth/register",
            &[
                ("email", email),
                ("username", username),
                ("role", role),
                ("password", "cat"),
                ("password2", "cat"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = client
        .post("/auth/login", &[("email", email), ("password", "cat")])
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    client
}

async fn signup(
    state: &AppState,
    app: &NormalizedApp,
    email: &str,
    username: &str,
    role: &str,
) -> Client {
    let mut client = register_and_login(app, email, username, role).await;
    let outbox = state.mailer().outbox().await;
    let mail = outbox.iter().rev().find(|mail| mail.to == email).unwrap();
    let start = mail.body.find("/auth/confirm/").unwrap();
    let link = mail.body[start..].split_whitespace().next().unwrap();

    let response = client.get(link).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let home = client.page("/").await;
    assert!(home.contains("You have confirmed your account. Thanks!"));
    client
}

async fn deliver(client: &mut Client) -> String {
    let response = client
        .post(
            "/deliver-carpool",
            &[
                ("start_time", "2030-01-01 08:00"),
                ("start_place", "Library"),
                ("end_place", "Airport"),
                ("people_amount", "2"),
                ("description", "Leaving **early**"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let target = location(&response).to_owned();
    assert!(target.starts_with("/carpool/"));
    target
}

#[tokio::test]
async fn test_anonymous_home_page() {
    let (_database, _, app) = setup().await;
    let mut client = Client::new(&app);
    let home = client.page("/").await;
    assert!(home.contains("Log in"));
    assert!(client.cookies.contains_key("session_id"));
    assert!(client.cookies.contains_key("csrf_token"));
}

#[tokio::test]
async fn test_trailing_slash_is_trimmed() {
    let (_database, _, app) = setup().await;
    let mut client = Client::new(&app);
    let response = client.get("/auth/login/").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_required_redirects_with_next() {
    let (_database, _, app) = setup().await;
    let mut client = Client::new(&app);
    let response = client.get("/carpools").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login?next=%2Fcarpools");

    let login = client.page("/auth/login?next=%2Fcarpools").await;
    assert!(login.contains("Please log in to access this page."));
}

#[tokio::test]
async fn test_form_without_csrf_token_is_forbidden() {
    let (_database, _, app) = setup().await;
    let mut client = Client::new(&app);
    client.get("/auth/login").await;
    let response = client
        .post_raw(
            "/auth/login",
            &[("email", "a@example.com"), ("password", "cat")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invalid_form_is_flashed_back() {
    let (_database, _, app) = setup().await;
    let mut client = Client::new(&app);
    client.get("/auth/register").await;
    let response = client
        .post(
            "/auth/register",
            &[
                ("email", "not an email"),
                ("username", "john"),
                ("role", "student"),
                ("password", "cat"),
                ("password2", "cat"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/register");
    let page = client.page("/auth/register").await;
    assert!(page.contains("Invalid email address."));
}

#[tokio::test]
async fn test_wrong_password_is_flashed() {
    let (_database, _, app) = setup().await;
    let mut client = Client::new(&app);
    client.get("/auth/login").await;
    let response = client
        .post(
            "/auth/login",
            &[("email", "nobody@example.com"), ("password", "cat")],
        )
        .await;
    assert_eq!(location(&response), "/auth/login");
    let login = client.page("/auth/login").await;
    assert!(login.contains("Invalid email or password."));
}

#[tokio::test]
async fn test_unconfirmed_user_is_held_back() {
    let (_database, _, app) = setup().await;
    let mut client = register_and_login(&app, "john@example.com", "john", "student").await;

    let response = client.get("/").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/unconfirmed");

    let page = client.page("/auth/unconfirmed").await;
    assert!(page.contains("john@example.com"));
}

#[tokio::test]
async fn test_unconfirmed_page_sends_everyone_else_home() {
    let (_database, state, app) = setup().await;
    let mut anonymous = Client::new(&app);
    let response = anonymous.get("/auth/unconfirmed").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let mut john = signup(&state, &app, "john@example.com", "john", "student").await;
    let response = john.get("/auth/unconfirmed").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_login_ignores_offsite_next() {
    let (_database, _, app) = setup().await;
    register_and_login(&app, "john@example.com", "john", "student").await;

    let mut client = Client::new(&app);
    client.get("/auth/login").await;
    let response = client
        .post(
            "/auth/login?next=%2F%5Cevil.com",
            &[("email", "john@example.com"), ("password", "cat")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_login_rotates_the_session() {
    let (_database, _, app) = setup().await;
    let mut client = Client::new(&app);
    client.get("/auth/register").await;
    client
        .post(
            "/auth/register",
            &[
                ("email", "john@example.com"),
                ("username", "john"),
                ("role", "student"),
                ("password", "cat"),
                ("password2", "cat"),
            ],
        )
        .await;
    let anonymous = client.cookies["session_id"].clone();

    client
        .post(
            "/auth/login",
            &[("email", "john@example.com"), ("password", "cat")],
        )
        .await;
    assert_ne!(client.cookies["session_id"], anonymous);

    let response = client.get("/auth/logout").await;
    assert_eq!(location(&response), "/");
    let home = client.page("/").await;
    assert!(home.contains("You have been logged out."));
}

#[tokio::test]
async fn test_carpool_lifecycle() {
    let (_database, state, app) = setup().await;
    let mut alice = signup(&state, &app, "alice@example.com", "alice", "student").await;
    let mut bob = signup(&state, &app, "bob@example.com", "bob", "student").await;

    let carpool_url = deliver(&mut alice).await;
    let group_pk = carpool_url.trim_start_matches("/carpool/").to_owned();
    let page = alice.page(&carpool_url).await;
    assert!(page.contains("Published! Please make sure your profile is complete."));
    assert!(page.contains("<strong>early</strong>"));
    assert!(page.contains("1 of 2 people"));

    let response = bob.get(&format!("/apply/{group_pk}")).await;
    assert_eq!(location(&response), carpool_url);
    let page = bob.page(&carpool_url).await;
    assert!(page.contains("Your application has been submitted!"));

    bob.get(&format!("/apply/{group_pk}")).await;
    let page = bob.page(&carpool_url).await;
    assert!(!page.contains("Your application has been submitted!"));

    let received = alice.page("/applies-received").await;
    assert!(received.contains("bob"));
    let application_pk: i64 = sqlx::query_scalar("SELECT pk FROM applications WHERE group_pk = $1;")
        .bind(group_pk.parse::<i64>().unwrap())
        .fetch_one(&**state.database())
        .await
        .unwrap();

    let response = bob.get(&format!("/approve/{application_pk}")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = alice.get(&format!("/approve/{application_pk}")).await;
    assert_eq!(location(&response), "/applies-received");
    let page = alice.page(&carpool_url).await;
    assert!(page.contains("2 of 2 people"));
    assert!(page.contains("Approved bob to join"));

    let raised = bob.page("/applies-raised").await;
    assert!(raised.contains("Approved"));

    bob.get(&format!("/quit/{group_pk}")).await;
    let page = bob.page(&carpool_url).await;
    assert!(page.contains("You have left the group."));
    assert!(page.contains("1 of 2 people"));
}

#[tokio::test]
async fn test_comments() {
    let (_database, state, app) = setup().await;
    let mut alice = signup(&state, &app, "alice@example.com", "alice", "student").await;
    let mut bob = signup(&state, &app, "bob@example.com", "bob", "student").await;
    let carpool_url = deliver(&mut alice).await;

    let response = bob.post(&carpool_url, &[("body", "Count me *in*")]).await;
    assert_eq!(location(&response), format!("{carpool_url}?page=-1"));
    let page = bob.page(&format!("{carpool_url}?page=-1")).await;
    assert!(page.contains("Your comment has been published."));
    assert!(page.contains("<em>in</em>"));

    let mut anonymous = Client::new(&app);
    anonymous.get(&carpool_url).await;
    let response = anonymous.post(&carpool_url, &[("body", "hi")]).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/auth/login?next="));
}

#[tokio::test]
async fn test_missing_carpool_is_not_found() {
    let (_database, _, app) = setup().await;
    let mut client = Client::new(&app);
    let response = client.get("/carpool/999").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client.get("/no/such/page").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_foreign_carpool_cannot_be_deleted() {
    let (_database, state, app) = setup().await;
    let mut alice = signup(&state, &app, "alice@example.com", "alice", "student").await;
    let mut bob = signup(&state, &app, "bob@example.com", "bob", "student").await;
    let carpool_url = deliver(&mut alice).await;
    let group_pk = carpool_url.trim_start_matches("/carpool/");

    let response = bob.get(&format!("/delete-carpool/{group_pk}")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = bob.get(&format!("/edit/{group_pk}")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = alice.get(&format!("/delete-carpool/{group_pk}")).await;
    assert_eq!(location(&response), "/");
    let response = alice.get(&carpool_url).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_pages_require_an_administrator() {
    let (_database, state, app) = setup().await;
    let mut admin = signup(&state, &app, "admin@example.com", "admin", "student").await;
    let mut bob = signup(&state, &app, "bob@example.com", "bob", "student").await;

    let admin_pk: i64 = sqlx::query_scalar("SELECT pk FROM users WHERE username = 'admin';")
        .fetch_one(&**state.database())
        .await
        .unwrap();
    let bob_pk: i64 = sqlx::query_scalar("SELECT pk FROM users WHERE username = 'bob';")
        .fetch_one(&**state.database())
        .await
        .unwrap();

    let response = bob.get(&format!("/edit-profile/{admin_pk}")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let page = admin.page(&format!("/edit-profile/{bob_pk}")).await;
    assert!(page.contains("bob@example.com"));
}

#[tokio::test]
async fn test_show_ride_cookie_switches_the_listing() {
    let (_database, _, app) = setup().await;
    let mut client = Client::new(&app);

    let response = client.get("/show-ride").await;
    assert_eq!(location(&response), "/");
    assert_eq!(client.cookies["show_ride"], "1");
    let home = client.page("/").await;
    assert!(home.contains("<strong>Rides</strong>"));

    client.get("/show-carpool").await;
    assert_eq!(client.cookies["show_ride"], "");
    let home = client.page("/").await;
    assert!(home.contains("<strong>Carpools</strong>"));
}

#[tokio::test]
async fn test_home_lists_carpools_and_huge_pages_are_empty() {
    let (_database, state, app) = setup().await;
    let mut alice = signup(&state, &app, "alice@example.com", "alice", "student").await;
    let carpool_url = deliver(&mut alice).await;

    let home = alice.page("/").await;
    assert!(home.contains("Library to Airport"));
    assert!(home.contains(&format!("href=\"{carpool_url}\"")));

    let home = alice.page("/?page=9223372036854775807").await;
    assert!(!home.contains("Library to Airport"));
    assert!(home.contains("Nothing here yet."));

    let page = alice.page(&format!("{carpool_url}?page=9223372036854775807")).await;
    assert!(page.contains("Library to Airport"));
}
