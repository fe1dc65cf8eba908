//! The signed-in user, kept in the layered cache across restarts.

use tracing::debug;

use super::Portal;
use crate::cache::types;
use crate::models::User;

const SESSION_ID: &str = "user";

impl Portal {
    /// Stores the signed-in user under the permanent `auth` type.
    pub async fn remember_session(&self, user: &User) {
        self.layered.set_as(types::AUTH, user, Some(SESSION_ID)).await;
        debug!(uid = %user.uid, "session remembered");
    }

    pub async fn restored_session(&self) -> Option<User> {
        self.layered.get_as(types::AUTH, Some(SESSION_ID)).await
    }

    /// Removes the session from every tier, blob included.
    pub async fn forget_session(&self) {
        self.layered.purge(types::AUTH, Some(SESSION_ID)).await;
        debug!("session forgotten");
    }
}

#[cfg(test)]
mod tests {
    use crate::portal::test_support::Harness;
    use crate::models::User;

    #[tokio::test]
    async fn test_session_round_trip() {
        let h = Harness::new();
        assert!(h.portal.restored_session().await.is_none());

        let user = User::new("u1", "ada@school.edu", "Ada");
        h.portal.remember_session(&user).await;
        assert_eq!(h.portal.restored_session().await, Some(user));

        h.portal.forget_session().await;
        assert!(h.portal.restored_session().await.is_none());
    }

    #[tokio::test]
    async fn test_session_survives_persisted_tier_loss() {
        let h = Harness::new();
        let user = User::new("u1", "ada@school.edu", "Ada");
        h.portal.remember_session(&user).await;

        // Dropping the memory and persisted tiers leaves the blob copy
        h.portal.layered().clear().await;

        assert_eq!(h.portal.restored_session().await, Some(user));
    }
}
