//! Storage-facing notification operations.

use bookstore_db::{DbError, Table};
use bookstore_http::{validation::field_errors, AppError};
use thiserror::Error;
use time::OffsetDateTime;
use validator::{Validate, ValidationErrors};

use super::models::{
    Filters, ListFilter, ListQuery, NewNotification, Notification, NotificationId,
    NotificationPage, NotificationType, Pagination,
};
use crate::modules::users::models::UserId;

pub const MAX_PAGE_SIZE: usize = 50;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("invalid notification")]
    Invalid(#[from] ValidationErrors),

    #[error("{0}")]
    InvalidQuery(&'static str),

    #[error("Notification not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] DbError),
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::Invalid(errors) => {
                let details = field_errors(&errors);
                let message = details
                    .first()
                    .and_then(|detail| detail["message"].as_str())
                    .unwrap_or("Notification validation failed")
                    .to_string();
                AppError::validation(details, message)
            }
            NotificationError::InvalidQuery(message) => {
                AppError::bad_request(message).with_code("invalid_query")
            }
            NotificationError::NotFound => {
                AppError::not_found(err.to_string()).with_code("notification_not_found")
            }
            NotificationError::Store(db) => db.into(),
        }
    }
}

impl ListQuery {
    /// Validate the raw query string values.
    pub fn parse(&self) -> Result<ListFilter, NotificationError> {
        let mut filter = ListFilter::default();

        if let Some(page) = non_empty(&self.page) {
            filter.page = page
                .parse::<usize>()
                .ok()
                .filter(|page| *page >= 1)
                .ok_or(NotificationError::InvalidQuery("Page must be a positive number"))?;
        }
        if let Some(limit) = non_empty(&self.limit) {
            filter.limit = limit
                .parse::<usize>()
                .ok()
                .filter(|limit| (1..=MAX_PAGE_SIZE).contains(limit))
                .ok_or(NotificationError::InvalidQuery("Limit must be between 1 and 50"))?;
        }
        if let Some(kind) = non_empty(&self.kind) {
            filter.kind = Some(
                kind.parse::<NotificationType>()
                    .map_err(|_| NotificationError::InvalidQuery("Invalid notification type"))?,
            );
        }
        if let Some(is_read) = non_empty(&self.is_read) {
            filter.is_read = Some(match is_read {
                "true" => true,
                "false" => false,
                _ => return Err(NotificationError::InvalidQuery("isRead must be true or false")),
            });
        }
        Ok(filter)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

#[derive(Clone)]
pub struct NotificationService {
    table: Table<Notification>,
}

impl NotificationService {
    pub fn new(table: Table<Notification>) -> Self {
        Self { table }
    }

    pub fn create(&self, input: NewNotification) -> Result<Notification, NotificationError> {
        input.validate()?;

        let mut recipients = input.recipients;
        recipients.sort();
        recipients.dedup();

        let notification = Notification {
            id: NotificationId::generate(),
            recipients,
            kind: input.kind,
            title: input.title.trim().to_string(),
            message: input.message.trim().to_string(),
            is_read: false,
            related: input.related,
            created_at: crate::utils::now(),
        };
        self.table.insert(notification.clone())?;
        tracing::debug!(
            id = %notification.id,
            kind = %notification.kind,
            recipients = notification.recipients.len(),
            "notification stored"
        );
        Ok(notification)
    }

    /// Notifications addressed to `user`, newest first. A page past the end
    /// is empty.
    pub fn list(
        &self,
        user: UserId,
        filter: ListFilter,
    ) -> Result<NotificationPage, NotificationError> {
        let mut matching = self.table.find(|n| {
            n.is_addressed_to(&user)
                && filter.kind.map_or(true, |kind| n.kind == kind)
                && filter.is_read.map_or(true, |is_read| n.is_read == is_read)
        })?;
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total_items = matching.len();
        let total_pages = total_items.div_ceil(filter.limit);
        let notifications = matching
            .into_iter()
            .skip(filter.page.saturating_sub(1).saturating_mul(filter.limit))
            .take(filter.limit)
            .collect();

        Ok(NotificationPage {
            notifications,
            filters: Filters {
                kind: filter.kind,
                is_read: filter.is_read,
            },
            pagination: Pagination {
                current_page: filter.page,
                total_pages,
                total_items,
                has_next_page: filter.page < total_pages,
                has_prev_page: filter.page > 1,
                limit: filter.limit,
            },
        })
    }

    pub fn unread_count(&self, user: UserId) -> Result<usize, NotificationError> {
        Ok(self.table.count(|n| n.is_addressed_to(&user) && !n.is_read)?)
    }

    pub fn mark_read(&self, user: UserId, raw_id: &str) -> Result<Notification, NotificationError> {
        let id: NotificationId = raw_id.parse().map_err(|_| NotificationError::NotFound)?;
        match self.table.get(&id)? {
            Some(n) if n.is_addressed_to(&user) => {}
            _ => return Err(NotificationError::NotFound),
        }
        self.table
            .update(&id, |n| n.is_read = true)?
            .ok_or(NotificationError::NotFound)
    }

    pub fn mark_all_read(&self, user: UserId) -> Result<usize, NotificationError> {
        Ok(self
            .table
            .update_where(|n| n.is_addressed_to(&user) && !n.is_read, |n| n.is_read = true)?)
    }

    /// Delete read notifications created before `cutoff`.
    pub fn purge_read_older_than(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<usize, NotificationError> {
        Ok(self.table.delete_where(|n| n.is_read && n.created_at < cutoff)?)
    }

    #[cfg(test)]
    pub(crate) fn table(&self) -> &Table<Notification> {
        &self.table
    }
}
