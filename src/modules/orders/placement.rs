//! The order-placement transaction.

use super::dispatch;
use super::error::OrderError;
use super::models::{LineItemRequest, Order};
use super::reservation::reserve_stock;
use crate::context::SharedContext;
use crate::modules::users::models::UserId;

/// Reserve stock and record the order in one transaction, then schedule the
/// post-commit effects.
///
/// Stock is read and decremented inside the store's write transaction, and
/// writers are serialized, so a second order for the same books sees the
/// first one's decrement and fails with [`OrderError::InsufficientStock`]
/// when too little is left. A commit refused as stale is replayed up to
/// `database.max_commit_retries` times.
pub fn place_order(
    ctx: &SharedContext,
    user: UserId,
    lines: &[LineItemRequest],
) -> Result<Order, OrderError> {
    let retries = ctx.settings.database.max_commit_retries;

    let order = ctx
        .db
        .run_transaction(retries, |tx| -> Result<Order, OrderError> {
            let reservation = reserve_stock(&ctx.books, tx, lines)?;
            let order = Order::new(user, reservation.items, reservation.total_price);
            tx.insert(&ctx.orders, order.clone())?;
            Ok(order)
        })
        .inspect_err(|err| tracing::info!(%user, error = %err, "order rejected"))?;

    tracing::info!(
        order_id = %order.id,
        %user,
        items = order.books.len(),
        total_price = %order.total_price,
        "order placed"
    );
    dispatch::order_placed(ctx, &order);
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::models::Book;
    use crate::modules::notifications::models::ListFilter;
    use crate::testing::TestApp;
    use bookstore_authz::Role;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn line(book: &Book, quantity: i64) -> LineItemRequest {
        LineItemRequest {
            book: book.id.to_string(),
            quantity,
        }
    }

    #[tokio::test]
    async fn successful_order_reserves_stock_and_fans_out() {
        let app = TestApp::new();
        let admin = app.seed_user("root", Role::Admin);
        let reader = app.seed_user("reader", Role::User);
        let dune = app.seed_book("Dune", Decimal::new(1250, 2), 5);
        let mut events = app.broadcaster.subscribe();

        let order = place_order(&app.ctx, reader.id, &[line(&dune, 3)]).unwrap();
        app.ctx.effects.drain().await;

        assert_eq!(order.total_price, Decimal::new(3750, 2));
        assert_eq!(order.status.as_str(), "pending");
        assert_eq!(app.ctx.books.get(&dune.id).unwrap().unwrap().stock, 2);
        assert!(app.ctx.orders.get(&order.id).unwrap().is_some());

        let event = events.recv().await.unwrap();
        assert_eq!(event.name, "newOrder");
        assert_eq!(event.payload["orderId"], order.id.to_string());
        assert_eq!(event.payload["totalPrice"], serde_json::json!(37.5));

        let sent = app.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, reader.email);

        let mine = app.ctx.notifications.list(reader.id, ListFilter::default()).unwrap();
        assert_eq!(mine.notifications.len(), 1);
        let admins = app.ctx.notifications.list(admin.id, ListFilter::default()).unwrap();
        assert_eq!(admins.notifications.len(), 1);
        assert_eq!(admins.notifications[0].title, "New order received");
    }

    #[tokio::test]
    async fn every_admin_shares_one_new_order_notification() {
        let app = TestApp::new();
        let admins = [
            app.seed_user("root", Role::Admin),
            app.seed_user("ops", Role::Admin),
            app.seed_user("auditor", Role::Admin),
        ];
        let reader = app.seed_user("reader", Role::User);
        let dune = app.seed_book("Dune", Decimal::new(1000, 2), 5);
        let before = app.ctx.notifications.table().len().unwrap();

        place_order(&app.ctx, reader.id, &[line(&dune, 1)]).unwrap();
        app.ctx.effects.drain().await;

        assert_eq!(app.ctx.notifications.table().len().unwrap(), before + 2);
        let mut shared = Vec::new();
        for admin in &admins {
            let page = app.ctx.notifications.list(admin.id, ListFilter::default()).unwrap();
            assert_eq!(page.notifications.len(), 1);
            assert_eq!(page.notifications[0].title, "New order received");
            shared.push(page.notifications[0].id);
        }
        assert!(shared.iter().all(|id| *id == shared[0]));

        let note = app.ctx.notifications.table().get(&shared[0]).unwrap().unwrap();
        let mut expected: Vec<_> = admins.iter().map(|admin| admin.id).collect();
        expected.sort();
        assert_eq!(note.recipients, expected);
        let mine = app.ctx.notifications.list(reader.id, ListFilter::default()).unwrap();
        assert_eq!(mine.notifications.len(), 1);
        assert_ne!(mine.notifications[0].id, shared[0]);
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_everything_untouched() {
        let app = TestApp::new();
        let reader = app.seed_user("reader", Role::User);
        let dune = app.seed_book("Dune", Decimal::new(1000, 2), 2);

        let err = place_order(&app.ctx, reader.id, &[line(&dune, 3)]).unwrap_err();
        app.ctx.effects.drain().await;

        assert_eq!(err.to_string(), "Sorry, only 2 copies of \"Dune\" are available.");
        assert_eq!(app.ctx.books.get(&dune.id).unwrap().unwrap().stock, 2);
        assert!(app.ctx.orders.is_empty().unwrap());
        assert!(app.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn a_failing_later_item_rolls_back_earlier_reservations() {
        let app = TestApp::new();
        let reader = app.seed_user("reader", Role::User);
        let dune = app.seed_book("Dune", Decimal::new(1000, 2), 4);
        let emma = app.seed_book("Emma", Decimal::new(800, 2), 1);
        let missing = LineItemRequest {
            book: crate::modules::books::models::BookId::generate().to_string(),
            quantity: 1,
        };

        let err = place_order(&app.ctx, reader.id, &[line(&dune, 1), missing]).unwrap_err();
        assert!(matches!(err, OrderError::BookNotFound(_)));

        let err = place_order(&app.ctx, reader.id, &[line(&dune, 2), line(&emma, 2)]).unwrap_err();
        assert!(matches!(err, OrderError::InsufficientStock { available: 1, .. }));

        assert_eq!(app.ctx.books.get(&dune.id).unwrap().unwrap().stock, 4);
        assert_eq!(app.ctx.books.get(&emma.id).unwrap().unwrap().stock, 1);
        assert!(app.ctx.orders.is_empty().unwrap());
    }

    #[tokio::test]
    async fn side_effect_failures_do_not_undo_the_order() {
        let app = TestApp::with_failing_mailer();
        let reader = app.seed_user("reader", Role::User);
        let dune = app.seed_book("Dune", Decimal::new(1000, 2), 1);

        let order = place_order(&app.ctx, reader.id, &[line(&dune, 1)]).unwrap();
        app.ctx.effects.drain().await;

        assert!(app.ctx.orders.get(&order.id).unwrap().is_some());
        assert_eq!(app.ctx.books.get(&dune.id).unwrap().unwrap().stock, 0);
        assert_eq!(app.ctx.notifications.unread_count(reader.id).unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_orders_never_oversell() {
        let app = TestApp::new();
        let dune = app.seed_book("Dune", Decimal::new(1000, 2), 5);
        let buyers: Vec<_> = (0..12)
            .map(|index| app.seed_user(&format!("reader{index}"), Role::User))
            .collect();

        let ctx = Arc::clone(&app.ctx);
        let mut handles = Vec::new();
        for buyer in buyers {
            let ctx = ctx.clone();
            let lines = vec![line(&dune, 1)];
            handles.push(tokio::task::spawn_blocking(move || {
                place_order(&ctx, buyer.id, &lines)
            }));
        }

        let mut placed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => placed += 1,
                Err(OrderError::InsufficientStock { available: 0, .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        let remaining = app.ctx.books.get(&dune.id).unwrap().unwrap().stock;
        assert_eq!(placed, 5);
        assert_eq!(remaining, 0);
        assert_eq!(app.ctx.orders.len().unwrap(), placed);
    }
}
