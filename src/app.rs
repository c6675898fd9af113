//! Application assembly: context, modules, and the serve loop.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use bookstore_events::ChannelBroadcaster;
use bookstore_kernel::{settings::Settings, InitCtx, ModuleRegistry};

use crate::context::{AppContext, SharedContext};
use crate::mail::LogMailer;
use crate::modules;

/// A fully wired application, ready to initialize and serve.
pub struct App {
    pub settings: Settings,
    pub ctx: SharedContext,
    pub registry: ModuleRegistry,
}

impl App {
    /// Wire the production collaborators: the logging mailer and the channel
    /// broadcaster behind the SSE stream.
    pub fn build(settings: Settings) -> anyhow::Result<Self> {
        let channel = ChannelBroadcaster::new(settings.events.channel_capacity);
        let mailer = Arc::new(LogMailer::new(
            settings.mail.from_address.clone(),
            settings.mail.enabled,
        ));
        let ctx = AppContext::new(settings.clone(), mailer, Arc::new(channel.clone()))?;
        Ok(Self::with_context(settings, ctx, channel))
    }

    pub fn with_context(
        settings: Settings,
        ctx: SharedContext,
        channel: ChannelBroadcaster,
    ) -> Self {
        let mut registry = ModuleRegistry::new();
        modules::register_all(&mut registry, &ctx, &channel);
        Self {
            settings,
            ctx,
            registry,
        }
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        let init = InitCtx {
            settings: &self.settings,
        };
        self.registry
            .init_all(&init)
            .await
            .context("module initialization failed")
    }

    pub fn router(&self) -> Router {
        bookstore_http::build_router(&self.registry, &self.settings)
    }

    pub fn openapi(&self) -> serde_json::Value {
        bookstore_http::router::merged_openapi(&self.registry)
    }

    /// Initialize and start every module, serve until `shutdown` resolves,
    /// then stop the modules in reverse order.
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(
            env = ?self.settings.environment,
            modules = self.registry.len(),
            "bookstore bootstrap starting"
        );

        self.init().await?;
        let init = InitCtx {
            settings: &self.settings,
        };
        self.registry
            .start_all(&init)
            .await
            .context("module start failed")?;

        let served = bookstore_http::start_server(&self.registry, &self.settings, shutdown).await;

        let stopped = self.registry.stop_all().await;
        if let Err(err) = &stopped {
            tracing::error!(error = %format!("{err:#}"), "module shutdown failed");
        }
        served?;
        stopped?;

        tracing::info!("bookstore stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn modules_are_registered_and_documented() {
        let app = App::build(Settings::default()).unwrap();
        let names: Vec<_> = app.registry.modules().map(|m| m.name()).collect();
        assert_eq!(names, vec!["users", "books", "events", "notifications", "order"]);

        let document = app.openapi();
        assert!(document["paths"]["/api/order"]["post"].is_object());
        assert!(document["paths"]["/api/order/{order_id}/status"]["patch"].is_object());
        assert!(document["paths"]["/api/notifications/unread-count"]["get"].is_object());
        assert!(document["paths"]["/api/events/stream"]["get"].is_object());
        assert!(document["components"]["schemas"]["Order"].is_object());
    }

    #[tokio::test]
    async fn init_seeds_configured_admins() {
        let mut settings = Settings::default();
        settings.auth.default_admins = vec![bookstore_kernel::settings::AdminSeed {
            email: "root@example.com".into(),
            username: Some("root".into()),
            token: "root-token".into(),
        }];
        let app = App::build(settings).unwrap();
        app.init().await.unwrap();

        assert_eq!(app.ctx.users.count(|user| user.is_admin()).unwrap(), 1);
    }

    #[tokio::test]
    async fn stored_data_survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.database.path = Some(dir.path().join("bookstore.redb").display().to_string());
        settings.auth.default_admins = vec![bookstore_kernel::settings::AdminSeed {
            email: "root@example.com".into(),
            username: Some("root".into()),
            token: "root-token".into(),
        }];

        let book = crate::testing::book("Dune", rust_decimal::Decimal::new(1999, 2), 4);
        {
            let app = App::build(settings.clone()).unwrap();
            app.init().await.unwrap();
            app.ctx.books.insert(book.clone()).unwrap();
        }

        let app = App::build(settings).unwrap();
        app.init().await.unwrap();
        let stored = app.ctx.books.get(&book.id).unwrap().unwrap();
        assert_eq!(stored.title, "Dune");
        assert_eq!(stored.price, book.price);
        assert_eq!(stored.stock, 4);
        assert_eq!(app.ctx.users.count(|user| user.is_admin()).unwrap(), 1);
        assert_eq!(app.ctx.users.find(|user| user.api_token == "root-token").unwrap().len(), 1);
    }
}
