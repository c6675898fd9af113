//! Work that follows a committed order change: email, real-time broadcast,
//! and stored notifications. Each effect runs on its own and its failure is
//! only logged.

use bookstore_events::emit_json;
use serde::Serialize;

use super::models::{LineItem, Order, OrderId, OrderStatus};
use crate::context::SharedContext;
use crate::mail::Email;
use crate::modules::notifications::models::NewNotification;
use crate::modules::users::models::{User, UserId};
use crate::modules::users::UserDirectory;

pub const NEW_ORDER_EVENT: &str = "newOrder";
pub const STATUS_UPDATE_EVENT: &str = "orderStatusUpdate";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewOrderPayload {
    order_id: OrderId,
    user: UserId,
    #[serde(with = "rust_decimal::serde::float")]
    total_price: rust_decimal::Decimal,
    books: Vec<LineItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusUpdatePayload {
    order_id: OrderId,
    status: OrderStatus,
}

fn broadcast<P>(ctx: &SharedContext, order: OrderId, event: &'static str, payload: P)
where
    P: Serialize + Send + 'static,
{
    let broadcaster = ctx.broadcaster.clone();
    ctx.effects.spawn(event, order.to_string(), async move {
        emit_json(broadcaster.as_ref(), event, &payload)?;
        Ok(())
    });
}

fn email(ctx: &SharedContext, order: OrderId, email: Email) {
    let mailer = ctx.mailer.clone();
    ctx.effects.spawn("email", order.to_string(), async move {
        mailer.send(email).await
    });
}

fn notify(ctx: &SharedContext, order: OrderId, notification: NewNotification) {
    let notifications = ctx.notifications.clone();
    ctx.effects.spawn("notification", order.to_string(), async move {
        notifications.create(notification)?;
        Ok(())
    });
}

fn purchaser(ctx: &SharedContext, order: &Order) -> Option<User> {
    match ctx.users.get(&order.user) {
        Ok(Some(user)) => Some(user),
        Ok(None) => {
            tracing::warn!(
                order_id = %order.id,
                user = %order.user,
                "order owner not found, skipping personal effects"
            );
            None
        }
        Err(err) => {
            tracing::error!(order_id = %order.id, error = %err, "order owner lookup failed");
            None
        }
    }
}

/// Schedule the effects of a newly committed order.
pub fn order_placed(ctx: &SharedContext, order: &Order) {
    broadcast(
        ctx,
        order.id,
        NEW_ORDER_EVENT,
        NewOrderPayload {
            order_id: order.id,
            user: order.user,
            total_price: order.total_price,
            books: order.books.clone(),
        },
    );

    if let Some(user) = purchaser(ctx, order) {
        email(
            ctx,
            order.id,
            Email {
                to: user.email.clone(),
                subject: "Order Confirmation".to_string(),
                title: "Thank you for your order!".to_string(),
                username: user.username.clone(),
                message: format!(
                    "Your order {} has been placed successfully. Total: ${:.2}.",
                    order.id, order.total_price
                ),
            },
        );
        notify(
            ctx,
            order.id,
            NewNotification::order_status(
                vec![user.id],
                "Order placed",
                format!("Your order {} has been placed and is pending.", order.id),
                order.id,
            ),
        );
    }

    let admins: Vec<UserId> = match UserDirectory::new(ctx.users.clone()).admins() {
        Ok(admins) => admins.into_iter().map(|admin| admin.id).collect(),
        Err(err) => {
            tracing::error!(order_id = %order.id, error = %err, "administrator lookup failed");
            Vec::new()
        }
    };
    if admins.is_empty() {
        tracing::debug!(order_id = %order.id, "no administrators to notify");
    } else {
        notify(
            ctx,
            order.id,
            NewNotification::order_status(
                admins,
                "New order received",
                format!(
                    "Order {} was placed with {} line item(s), total ${:.2}.",
                    order.id,
                    order.books.len(),
                    order.total_price
                ),
                order.id,
            ),
        );
    }
}

fn status_message(order: &Order) -> String {
    match order.status {
        OrderStatus::Completed => format!("Your order {} is ready for delivery.", order.id),
        OrderStatus::Canceled => format!("Your order {} has been canceled.", order.id),
        other => format!("Your order {} has been updated to {}.", order.id, other),
    }
}

/// Schedule the effects of a committed status change.
pub fn status_changed(ctx: &SharedContext, order: &Order) {
    broadcast(
        ctx,
        order.id,
        STATUS_UPDATE_EVENT,
        StatusUpdatePayload {
            order_id: order.id,
            status: order.status,
        },
    );

    let Some(user) = purchaser(ctx, order) else {
        return;
    };
    let message = status_message(order);
    email(
        ctx,
        order.id,
        Email {
            to: user.email.clone(),
            subject: "Order Status Update".to_string(),
            title: format!("Order {}", order.status),
            username: user.username.clone(),
            message: message.clone(),
        },
    );
    notify(
        ctx,
        order.id,
        NewNotification::order_status(vec![user.id], "Order status updated", message, order.id),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn status_messages_follow_the_target_status() {
        let mut order = Order::new(UserId::generate(), Vec::new(), Decimal::ZERO);
        order.status = OrderStatus::Completed;
        assert!(status_message(&order).contains("ready for delivery"));
        order.status = OrderStatus::Canceled;
        assert!(status_message(&order).contains("has been canceled"));
        order.status = OrderStatus::Pending;
        assert!(status_message(&order).contains("updated to pending"));
    }
}
