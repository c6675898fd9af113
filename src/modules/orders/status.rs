//! Administrative status transitions.

use bookstore_authz::Principal;

use super::dispatch;
use super::error::OrderError;
use super::models::{Order, OrderId, OrderStatus};
use crate::context::SharedContext;

/// Whether a status update changed anything.
#[derive(Debug, Clone)]
pub enum StatusChange {
    Unchanged(Order),
    Changed(Order),
}

impl StatusChange {
    pub fn into_order(self) -> Order {
        match self {
            StatusChange::Unchanged(order) | StatusChange::Changed(order) => order,
        }
    }
}

/// Move an order to `raw_status` on behalf of `actor`, who has already been
/// checked for the administrator role.
///
/// The order is read and rewritten inside one store transaction. Setting the
/// status it already has writes nothing and schedules no effects.
pub fn update_status(
    ctx: &SharedContext,
    actor: &Principal,
    raw_order_id: &str,
    raw_status: &str,
) -> Result<StatusChange, OrderError> {
    let order_id: OrderId = raw_order_id
        .parse()
        .map_err(|_| OrderError::invalid_order(raw_order_id))?;
    let next: OrderStatus = raw_status
        .parse()
        .map_err(|_| OrderError::InvalidStatus(raw_status.to_string()))?;

    let retries = ctx.settings.database.max_commit_retries;
    let mut previous = next;
    let change = ctx
        .db
        .run_transaction(retries, |tx| -> Result<StatusChange, OrderError> {
            let mut record = tx
                .get(&ctx.orders, &order_id)?
                .ok_or(OrderError::OrderNotFound)?;
            previous = record.status;
            if previous == next {
                return Ok(StatusChange::Unchanged(record.into_inner()));
            }

            record.status = next;
            record.updated_at = crate::utils::now();
            let order = record.value.clone();
            tx.update(&ctx.orders, record)?;
            Ok(StatusChange::Changed(order))
        })?;

    match &change {
        StatusChange::Unchanged(_) => {
            tracing::debug!(%order_id, actor = %actor.user_id, status = %next, "status unchanged");
        }
        StatusChange::Changed(order) => {
            tracing::info!(
                %order_id,
                actor = %actor.user_id,
                from = %previous,
                to = %next,
                "order status updated"
            );
            dispatch::status_changed(ctx, order);
        }
    }
    Ok(change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::notifications::models::ListFilter;
    use crate::modules::orders::models::LineItemRequest;
    use crate::modules::orders::placement::place_order;
    use crate::testing::TestApp;
    use bookstore_authz::Role;
    use rust_decimal::Decimal;

    fn placed(app: &TestApp, reader: &crate::modules::users::models::User) -> Order {
        let dune = app.seed_book("Dune", Decimal::new(1000, 2), 3);
        place_order(
            &app.ctx,
            reader.id,
            &[LineItemRequest { book: dune.id.to_string(), quantity: 1 }],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn completing_an_order_notifies_the_owner_once() {
        let app = TestApp::new();
        let admin = app.seed_user("root", Role::Admin).principal();
        let reader = app.seed_user("reader", Role::User);
        let order = placed(&app, &reader);
        let dune = order.books[0].book;
        app.ctx.effects.drain().await;
        let notes_before = app.ctx.notifications.unread_count(reader.id).unwrap();
        let mails_before = app.mailer.sent().len();
        let mut events = app.broadcaster.subscribe();

        let change = update_status(&app.ctx, &admin, &order.id.to_string(), "completed").unwrap();
        app.ctx.effects.drain().await;
        assert!(matches!(
            change,
            StatusChange::Changed(ref o) if o.status == OrderStatus::Completed
        ));

        let page = app.ctx.notifications.list(reader.id, ListFilter::default()).unwrap();
        assert_eq!(page.notifications.len(), notes_before + 1);
        assert!(page.notifications[0].message.contains("ready for delivery"));
        assert_eq!(app.mailer.sent().len(), mails_before + 1);
        let event = events.recv().await.unwrap();
        assert_eq!(event.name, "orderStatusUpdate");
        assert_eq!(event.payload["status"], "completed");

        let again = update_status(&app.ctx, &admin, &order.id.to_string(), "completed").unwrap();
        app.ctx.effects.drain().await;
        assert!(matches!(again, StatusChange::Unchanged(_)));
        assert_eq!(app.ctx.notifications.unread_count(reader.id).unwrap(), notes_before + 1);
        assert_eq!(app.mailer.sent().len(), mails_before + 1);
        assert_eq!(app.ctx.books.get(&dune).unwrap().unwrap().stock, 2);
    }

    #[tokio::test]
    async fn any_status_may_be_set_again_including_pending() {
        let app = TestApp::new();
        let admin = app.seed_user("root", Role::Admin).principal();
        let reader = app.seed_user("reader", Role::User);
        let order = placed(&app, &reader);
        let id = order.id.to_string();

        update_status(&app.ctx, &admin, &id, "completed").unwrap();
        app.ctx.effects.drain().await;
        let change = update_status(&app.ctx, &admin, &id, "pending").unwrap();
        app.ctx.effects.drain().await;

        let order = change.into_order();
        assert_eq!(order.status, OrderStatus::Pending);
        let stored = app.ctx.orders.get(&order.id).unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);

        let page = app.ctx.notifications.list(reader.id, ListFilter::default()).unwrap();
        assert!(page.notifications[0].message.contains("has been updated to pending"));
        let last_mail = app.mailer.sent().pop().unwrap();
        assert_eq!(last_mail.title, "Order pending");

        update_status(&app.ctx, &admin, &id, "canceled").unwrap();
        let reopened = update_status(&app.ctx, &admin, &id, "pending").unwrap();
        assert!(matches!(
            reopened,
            StatusChange::Changed(ref o) if o.status == OrderStatus::Pending
        ));
    }

    #[tokio::test]
    async fn invalid_updates_are_rejected() {
        let app = TestApp::new();
        let admin = app.seed_user("root", Role::Admin).principal();
        let reader = app.seed_user("reader", Role::User);
        let order = placed(&app, &reader);
        let dune = order.books[0].book;
        let id = order.id.to_string();

        assert!(matches!(
            update_status(&app.ctx, &admin, &id, "shipped"),
            Err(OrderError::InvalidStatus(_))
        ));
        assert!(matches!(
            update_status(&app.ctx, &admin, "garbage", "completed"),
            Err(OrderError::InvalidReference { kind: "order", .. })
        ));
        assert!(matches!(
            update_status(&app.ctx, &admin, &OrderId::generate().to_string(), "completed"),
            Err(OrderError::OrderNotFound)
        ));

        update_status(&app.ctx, &admin, &id, "canceled").unwrap();
        // Cancellation leaves stock as it was after the order.
        assert_eq!(app.ctx.books.get(&dune).unwrap().unwrap().stock, 2);
    }
}
