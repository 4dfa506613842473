//! Client dashboard notifications.

use rosp_core::{AccountId, NotificationId};

use crate::error::LifecycleError;
use crate::model::Notification;
use crate::Engine;

impl Engine {
    /// Notifications for an account, newest first.
    pub async fn notifications_for(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Notification>, LifecycleError> {
        self.ledger
            .read(|t| t.notifications_for(account_id).into_iter().cloned().collect())
            .await
    }

    pub async fn unread_count(&self, account_id: AccountId) -> Result<usize, LifecycleError> {
        self.ledger
            .read(|t| {
                t.notifications_for(account_id)
                    .into_iter()
                    .filter(|n| !n.read)
                    .count()
            })
            .await
    }

    /// Mark one notification read. A notification that belongs to another
    /// account is reported as not found.
    pub async fn mark_read(
        &self,
        account_id: AccountId,
        notification_id: NotificationId,
    ) -> Result<Notification, LifecycleError> {
        self.ledger
            .transact(|uow| {
                let mut notification = uow
                    .notification(notification_id)
                    .filter(|n| n.account_id == account_id)
                    .ok_or_else(|| LifecycleError::not_found("notification", notification_id))?;
                if !notification.read {
                    notification.read = true;
                    uow.put_notification(notification.clone())?;
                }
                Ok(notification)
            })
            .await
    }
}
