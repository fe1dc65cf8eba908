//! User records and course enrollment.

use serde_json::Value;
use tracing::{debug, info};

use super::collections::USERS;
use super::{user_request_key, Portal, ReadMode};
use crate::cache::FlightHandle;
use crate::error::{PortalError, Result};
use crate::models::User;
use crate::remote::ArrayUpdate;

impl Portal {
    // == Get User ==
    /// Fetches one user record. A missing user is `NotFound`.
    pub async fn get_user(&self, uid: &str, mode: ReadMode) -> Result<User> {
        let key = user_request_key(uid);

        if mode == ReadMode::ForceRefresh {
            debug!(uid, "force refreshing user");
            let fetched = self.fetch::<User>(USERS, uid).await;
            self.dedup.forget(&key).await;
            match &fetched {
                Ok(user) => self.flat.store_user(user),
                Err(PortalError::NotFound(_)) => self.flat.remove_user(uid),
                Err(_) => {}
            }
            return fetched;
        }

        let portal = self.clone();
        let uid = uid.to_string();
        self.dedup
            .dedupe_tracked(&key, move |flight| async move { portal.load_user(&uid, &flight).await })
            .await
    }

    async fn load_user(&self, uid: &str, flight: &FlightHandle) -> Result<User> {
        if let Some(user) = self.flat.cached_user(uid) {
            debug!(uid, "user served from flat cache");
            return Ok(user);
        }
        let user: User = self.fetch(USERS, uid).await?;
        if flight.write_if_current(|| self.flat.store_user(&user)).await.is_none() {
            debug!(uid, "user changed during fetch, not caching");
        }
        Ok(user)
    }

    // == Enrollment ==
    /// Adds `course_id` to the user's courses, creating the user record if needed.
    pub async fn enroll(&self, uid: &str, course_id: &str) -> Result<()> {
        validate_enrollment(uid, course_id)?;
        self.remote
            .update_array_field(
                USERS,
                uid,
                "courses",
                ArrayUpdate::Union(vec![Value::String(course_id.to_string())]),
            )
            .await?;
        info!(uid, course_id, "enrolled");
        self.user_changed(uid).await;
        Ok(())
    }

    /// Removes `course_id` from the user's courses. Unknown users are a no-op.
    pub async fn unenroll(&self, uid: &str, course_id: &str) -> Result<()> {
        validate_enrollment(uid, course_id)?;
        self.remote
            .update_array_field(
                USERS,
                uid,
                "courses",
                ArrayUpdate::Remove(vec![Value::String(course_id.to_string())]),
            )
            .await?;
        info!(uid, course_id, "unenrolled");
        self.user_changed(uid).await;
        Ok(())
    }

    /// Retires in-flight reads of the user, then drops the cached record.
    pub(super) async fn user_changed(&self, uid: &str) {
        self.dedup.forget(&user_request_key(uid)).await;
        self.flat.invalidate_user_enrollment(uid);
    }
}

fn validate_enrollment(uid: &str, course_id: &str) -> Result<()> {
    if uid.trim().is_empty() || course_id.trim().is_empty() {
        return Err(PortalError::InvalidRequest(
            "User id and course id are required".to_string(),
        ));
    }
    Ok(())
}
