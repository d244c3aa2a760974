//! Admin and followed-chat checks.
//!
//! Allowances live in the store; a copy is held in memory so every inbound
//! event can be gated without a database round trip. The cache is written
//! only after the store accepted the change.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use tracing::info;

use super::MessageStore;
use crate::model::Allowance;

pub struct AccessControl {
    store: Arc<dyn MessageStore>,
    admins: HashSet<i64>,
    allowances: RwLock<HashMap<i64, Allowance>>,
}

impl AccessControl {
    /// Build the cache from the allowances currently persisted.
    pub async fn load(store: Arc<dyn MessageStore>, admins: &[i64]) -> Result<Self> {
        let allowances: HashMap<i64, Allowance> = store
            .load_allowances()
            .await
            .context("Failed to load chat allowances")?
            .into_iter()
            .map(|a| (a.chat_id, a))
            .collect();

        info!(
            "Access control loaded: {} admin(s), {} chat allowance(s)",
            admins.len(),
            allowances.len()
        );

        Ok(Self {
            store,
            admins: admins.iter().copied().collect(),
            allowances: RwLock::new(allowances),
        })
    }

    pub fn is_admin(&self, author_id: i64) -> bool {
        author_id != 0 && self.admins.contains(&author_id)
    }

    pub fn is_chat_followed(&self, chat_id: i64) -> bool {
        let allowances = self.allowances.read().unwrap_or_else(|e| e.into_inner());
        allowances.get(&chat_id).is_some_and(|a| a.follow)
    }

    /// Persist the allowance, then refresh the cached copy.
    pub async fn set_chat_follow(&self, chat_id: i64, author_id: i64, follow: bool) -> Result<()> {
        let allowance = Allowance {
            chat_id,
            author_id,
            follow,
        };
        self.store.set_chat_follow(&allowance).await?;

        let mut allowances = self.allowances.write().unwrap_or_else(|e| e.into_inner());
        allowances.insert(chat_id, allowance);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn test_unknown_chat_not_followed() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let access = AccessControl::load(store, &[1]).await.unwrap();
        assert!(!access.is_chat_followed(-100));
    }

    #[tokio::test]
    async fn test_follow_then_unfollow() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let access = AccessControl::load(store, &[1]).await.unwrap();

        access.set_chat_follow(-100, 1, true).await.unwrap();
        assert!(access.is_chat_followed(-100));

        access.set_chat_follow(-100, 1, false).await.unwrap();
        assert!(!access.is_chat_followed(-100));
    }

    #[tokio::test]
    async fn test_cache_populated_from_store() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        {
            let access = AccessControl::load(store.clone(), &[]).await.unwrap();
            access.set_chat_follow(-7, 3, true).await.unwrap();
        }

        let reloaded = AccessControl::load(store, &[]).await.unwrap();
        assert!(reloaded.is_chat_followed(-7));
    }

    #[tokio::test]
    async fn test_admin_set() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let access = AccessControl::load(store, &[5, 0]).await.unwrap();
        assert!(access.is_admin(5));
        assert!(!access.is_admin(6));
        // Channel posts use author 0, which is never an admin.
        assert!(!access.is_admin(0));
    }
}
