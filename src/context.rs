//! Shared application state handed to every module.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts};
use bookstore_authz::{authenticate_header, require_admin, Authenticator, Principal};
use bookstore_db::{Database, DatabaseOptions, Table};
use bookstore_events::Broadcaster;
use bookstore_http::AppError;
use bookstore_kernel::settings::Settings;

use crate::effects::SideEffects;
use crate::mail::Mailer;
use crate::modules::books::models::Book;
use crate::modules::notifications::models::Notification;
use crate::modules::notifications::service::NotificationService;
use crate::modules::orders::models::Order;
use crate::modules::users::models::User;
use crate::modules::users::UserDirectory;

/// Stores and collaborators shared by the domain modules.
pub struct AppContext {
    pub settings: Settings,
    pub db: Database,
    pub books: Table<Book>,
    pub orders: Table<Order>,
    pub users: Table<User>,
    pub notifications: NotificationService,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub mailer: Arc<dyn Mailer>,
    pub effects: SideEffects,
    pub authenticator: Arc<dyn Authenticator>,
}

pub type SharedContext = Arc<AppContext>;

impl AppContext {
    /// Open the configured database and wire the collaborators around it.
    pub fn new(
        settings: Settings,
        mailer: Arc<dyn Mailer>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> anyhow::Result<SharedContext> {
        let db = Database::open(DatabaseOptions {
            path: settings.database.path.as_ref().map(PathBuf::from),
            transaction_timeout: Duration::from_millis(settings.database.transaction_timeout_ms),
        })
        .context("failed to open the bookstore database")?;
        let users = db.table::<User>()?;

        Ok(Arc::new(Self {
            books: db.table::<Book>()?,
            orders: db.table::<Order>()?,
            notifications: NotificationService::new(db.table::<Notification>()?),
            authenticator: Arc::new(UserDirectory::new(users.clone())),
            users,
            db,
            settings,
            broadcaster,
            mailer,
            effects: SideEffects::new(),
        }))
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Principal);

impl FromRequestParts<SharedContext> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &SharedContext,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let principal = authenticate_header(ctx.authenticator.as_ref(), header).await?;
        Ok(CurrentUser(principal))
    }
}

/// An authenticated caller holding the administrator role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Principal);

impl FromRequestParts<SharedContext> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &SharedContext,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(principal) = CurrentUser::from_request_parts(parts, ctx).await?;
        require_admin(&principal)?;
        Ok(AdminUser(principal))
    }
}
