use serde::Serialize;
use uuid::Uuid;

use crate::models::Reward;

#[derive(Debug, Serialize)]
pub struct RewardUnlockedNotification<'a> {
    pub user_id: Uuid,
    pub reward_id: Uuid,
    pub rule: &'a str,
    pub title: String,
    pub body: &'a str,
    pub category: &'a str,
}

/// Posts user-facing events to the notification service. Without a configured
/// base URL every call is a no-op.
#[derive(Clone)]
pub struct NotificationClient {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl NotificationClient {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.as_deref().map(normalize_base_url),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }

    pub async fn notify_reward_unlocked(&self, user_id: Uuid, reward: &Reward) -> Result<(), String> {
        let Some(base_url) = &self.base_url else {
            return Ok(());
        };

        let request = RewardUnlockedNotification {
            user_id,
            reward_id: reward.id,
            rule: &reward.rule,
            title: format!("Reward unlocked: {}", reward.name),
            body: &reward.reward_description,
            category: &reward.category,
        };

        let url = format!("{}/notifications/reward-unlocked", base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("Failed to send reward notification: {}", text));
        }

        Ok(())
    }

    /// Sends one notification per reward; failures are logged and never
    /// surface to the caller.
    pub async fn announce_unlocked(&self, user_id: Uuid, rewards: &[Reward]) {
        for reward in rewards {
            log::info!("User {} unlocked reward '{}'", user_id, reward.rule);
            if let Err(err) = self.notify_reward_unlocked(user_id, reward).await {
                log::warn!("Reward notification for user {user_id} failed: {err}");
            }
        }
    }
}

fn normalize_base_url(value: &str) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.ends_with("/api/v1") {
        trimmed.to_string()
    } else {
        format!("{}/api/v1", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("http://notify:9000"), "http://notify:9000/api/v1");
        assert_eq!(normalize_base_url("http://notify:9000/"), "http://notify:9000/api/v1");
        assert_eq!(
            normalize_base_url("http://notify:9000/api/v1/"),
            "http://notify:9000/api/v1"
        );
    }

    #[actix_rt::test]
    async fn test_unconfigured_client_is_noop() {
        let client = NotificationClient::new(None);
        assert!(!client.is_enabled());
        let reward = Reward {
            id: Uuid::new_v4(),
            rule: "gym_explorer".into(),
            name: "Gym Explorer".into(),
            description: String::new(),
            points_required: 1,
            category: "milestone".into(),
            reward_type: "badge".into(),
            reward_value: 0.0,
            reward_description: String::new(),
            created_at: chrono::Utc::now(),
        };
        assert!(client.notify_reward_unlocked(Uuid::new_v4(), &reward).await.is_ok());
    }
}
