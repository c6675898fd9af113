//! Fixtures shared by the unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bookstore_authz::Role;
use bookstore_events::ChannelBroadcaster;
use bookstore_kernel::settings::Settings;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;

use crate::app::App;
use crate::context::{AppContext, SharedContext};
use crate::mail::{Email, Mailer};
use crate::modules::books::models::{Book, BookId};
use crate::modules::users::models::User;

/// Mailer that keeps every message, or refuses all of them.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("smtp relay unavailable");
        }
        self.sent.lock().push(email);
        Ok(())
    }
}

pub fn book(title: &str, price: Decimal, stock: u32) -> Book {
    let now = crate::utils::now();
    Book {
        id: BookId::generate(),
        book_id: 0,
        title: title.to_string(),
        author: "Test Author".to_string(),
        price,
        stock,
        description: format!("About {title}"),
        image: None,
        created_at: now,
        updated_at: now,
    }
}

pub struct TestApp {
    pub ctx: SharedContext,
    pub broadcaster: ChannelBroadcaster,
    pub mailer: Arc<RecordingMailer>,
    app: App,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(RecordingMailer::default())
    }

    pub fn with_failing_mailer() -> Self {
        Self::build(RecordingMailer {
            fail: true,
            ..Default::default()
        })
    }

    fn build(mailer: RecordingMailer) -> Self {
        let settings = Settings::default();
        let broadcaster = ChannelBroadcaster::new(64);
        let mailer = Arc::new(mailer);
        let ctx = AppContext::new(
            settings.clone(),
            mailer.clone(),
            Arc::new(broadcaster.clone()),
        )
        .unwrap();
        let app = App::with_context(settings, ctx.clone(), broadcaster.clone());
        Self {
            ctx,
            broadcaster,
            mailer,
            app,
        }
    }

    /// Store a user whose API token is `{username}-token`.
    pub fn seed_user(&self, username: &str, role: Role) -> User {
        let user = User::new(
            username,
            format!("{username}@example.com"),
            role,
            format!("{username}-token"),
        );
        self.ctx.users.insert(user.clone()).unwrap();
        user
    }

    pub fn seed_book(&self, title: &str, price: Decimal, stock: u32) -> Book {
        let mut book = book(title, price, stock);
        book.book_id = self.ctx.books.next_sequence().unwrap();
        self.ctx.books.insert(book.clone()).unwrap();
        book
    }

    /// Send one request through the full router and decode the JSON body
    /// (`Value::Null` when the body is empty or not JSON).
    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.app.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        self.ctx.effects.drain().await;
        (status, value)
    }
}
