use super::Engine;
use crate::database::models::{NotificationGroup, NotificationGroupInput};
use crate::error::{EngineError, EngineResult};

fn validate(input: &NotificationGroupInput) -> EngineResult<Vec<String>> {
    if input.group_name.trim().is_empty() {
        return Err(EngineError::InvalidInput("group name is required".into()));
    }

    let emails: Vec<String> = input.emails.iter().map(|e| e.trim().to_string()).filter(|e| !e.is_empty()).collect();
    if let Some(bad) = emails.iter().find(|e| !e.contains('@')) {
        return Err(EngineError::InvalidInput(format!("not an email address: {bad}")));
    }
    Ok(emails)
}

impl Engine {
    pub async fn create_notification_group(
        &self,
        user_id: i64,
        input: NotificationGroupInput,
    ) -> EngineResult<NotificationGroup> {
        let emails = validate(&input)?;
        let mut group = NotificationGroup::new(user_id, input.group_name.trim().to_string(), emails);
        group.id = Some(self.db().insert_notification_group(&group).await?);
        Ok(group)
    }

    pub async fn get_notification_group(&self, user_id: i64, id: i64) -> EngineResult<NotificationGroup> {
        match self.db().get_notification_group(id).await? {
            Some(group) if group.user_id == user_id => Ok(group),
            _ => Err(EngineError::not_found("notification group", id)),
        }
    }

    pub async fn get_user_notification_groups(&self, user_id: i64) -> EngineResult<Vec<NotificationGroup>> {
        Ok(self.db().get_user_notification_groups(user_id).await?)
    }

    pub async fn update_notification_group(
        &self,
        user_id: i64,
        id: i64,
        input: NotificationGroupInput,
    ) -> EngineResult<NotificationGroup> {
        let emails = validate(&input)?;
        let mut group = self.get_notification_group(user_id, id).await?;
        group.group_name = input.group_name.trim().to_string();
        group.emails = emails;
        self.db().update_notification_group(&group).await?;
        Ok(group)
    }

    /// Monitors still pointing at a deleted group simply stop notifying
    pub async fn delete_notification_group(&self, user_id: i64, id: i64) -> EngineResult<Vec<NotificationGroup>> {
        self.get_notification_group(user_id, id).await?;
        self.db().delete_notification_group(id).await?;
        self.get_user_notification_groups(user_id).await
    }
}
