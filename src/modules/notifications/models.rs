use std::fmt;
use std::str::FromStr;

use bookstore_db::Document;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::modules::books::models::BookId;
use crate::modules::orders::models::OrderId;
use crate::modules::users::models::UserId;

crate::entity_id!(
    /// Storage key of a notification.
    NotificationId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    OrderStatus,
    Review,
    System,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::OrderStatus => "order_status",
            NotificationType::Review => "review",
            NotificationType::System => "system",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "order_status" => Ok(NotificationType::OrderStatus),
            "review" => Ok(NotificationType::Review),
            "system" => Ok(NotificationType::System),
            _ => Err(()),
        }
    }
}

/// What a notification points at. Serialized as a `relatedItem` id plus an
/// `itemModel` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "itemModel", content = "relatedItem")]
pub enum RelatedItem {
    Order(OrderId),
    #[serde(rename = "Books")]
    Book(BookId),
    Review(Uuid),
    User(UserId),
}

/// A stored notification. The read flag is shared by every recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub recipients: Vec<UserId>,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub related: Option<RelatedItem>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Notification {
    pub fn is_addressed_to(&self, user: &UserId) -> bool {
        self.recipients.contains(user)
    }
}

impl Document for Notification {
    type Id = NotificationId;
    const TABLE: &'static str = "notification";

    fn id(&self) -> &NotificationId {
        &self.id
    }
}

/// Input for creating a notification.
#[derive(Debug, Clone, Validate)]
pub struct NewNotification {
    #[validate(length(min = 1, message = "At least one recipient is required"))]
    pub recipients: Vec<UserId>,
    pub kind: NotificationType,
    #[validate(custom(function = "title_length"))]
    pub title: String,
    #[validate(custom(function = "message_length"))]
    pub message: String,
    pub related: Option<RelatedItem>,
}

impl NewNotification {
    pub fn order_status(
        recipients: Vec<UserId>,
        title: impl Into<String>,
        message: impl Into<String>,
        order: OrderId,
    ) -> Self {
        Self {
            recipients,
            kind: NotificationType::OrderStatus,
            title: title.into(),
            message: message.into(),
            related: Some(RelatedItem::Order(order)),
        }
    }
}

fn title_length(title: &str) -> Result<(), ValidationError> {
    if title.trim().chars().count() < 3 {
        return Err(ValidationError::new("length")
            .with_message("Title must be at least 3 characters long".into()));
    }
    Ok(())
}

fn message_length(message: &str) -> Result<(), ValidationError> {
    if message.trim().chars().count() < 5 {
        return Err(ValidationError::new("length")
            .with_message("Message must be at least 5 characters long".into()));
    }
    Ok(())
}

/// Query string accepted by the listing endpoint, kept raw so each field can
/// be rejected with its own message.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub is_read: Option<String>,
}

/// A validated listing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListFilter {
    pub page: usize,
    pub limit: usize,
    pub kind: Option<NotificationType>,
    pub is_read: Option<bool>,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            kind: None,
            is_read: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Filters {
    #[serde(rename = "type")]
    pub kind: Option<NotificationType>,
    #[serde(rename = "isRead")]
    pub is_read: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub has_next_page: bool,
    pub has_prev_page: bool,
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub filters: Filters,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn related_item_uses_model_tags() {
        let book = BookId::generate();
        let value = serde_json::to_value(RelatedItem::Book(book)).unwrap();
        assert_eq!(value, json!({ "itemModel": "Books", "relatedItem": book.to_string() }));

        let back: RelatedItem = serde_json::from_value(value).unwrap();
        assert_eq!(back, RelatedItem::Book(book));
    }

    #[test]
    fn notification_flattens_related_item() {
        let order = OrderId::generate();
        let notification = Notification {
            id: NotificationId::generate(),
            recipients: vec![UserId::generate()],
            kind: NotificationType::OrderStatus,
            title: "Order placed".into(),
            message: "Your order is in".into(),
            is_read: false,
            related: Some(RelatedItem::Order(order)),
            created_at: crate::utils::now(),
        };
        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["type"], "order_status");
        assert_eq!(value["itemModel"], "Order");
        assert_eq!(value["relatedItem"], order.to_string());
        assert_eq!(value["isRead"], false);
    }

    #[test]
    fn short_titles_and_messages_are_invalid() {
        let order = OrderId::generate();
        let ok =
            NewNotification::order_status(vec![UserId::generate()], "Order", "Hello there", order);
        assert!(ok.validate().is_ok());

        let short = NewNotification::order_status(vec![UserId::generate()], " ab ", "hey  ", order);
        let errors = short.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("title"));
        assert!(errors.field_errors().contains_key("message"));

        let nobody = NewNotification::order_status(Vec::new(), "Order", "Hello there", order);
        assert!(nobody.validate().is_err());
    }
}
