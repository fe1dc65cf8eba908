//! Cache administration: forced refreshes, stats, clearing and pre-warming.

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::collections::{COURSES, COURSE_LIST, USERS};
use super::course_list::decode_courses;
use super::{course_request_key, user_request_key, Portal, ReadMode, COURSE_LIST_DOC};
use crate::error::Result;
use crate::models::{CacheStatsResponse, Course, CourseListDocument, User};
use crate::remote::Snapshot;

/// What a forced refresh read from the remote store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RefreshedData {
    /// A single document, `None` when it does not exist
    Document(Option<Value>),
    Collection(Vec<Value>),
}

impl Portal {
    // == Force Refresh ==
    /// Reads a document, or a whole collection when `id` is `None`, straight
    /// from the remote store and overwrites the cached copies it maps to.
    pub async fn force_refresh_from_server(
        &self,
        collection: &str,
        id: Option<&str>,
    ) -> Result<RefreshedData> {
        match id {
            Some(id) => {
                let snapshot = self.remote.get_document(collection, id).await?;
                self.recache_document(collection, id, snapshot.as_ref()).await;
                info!(collection, id, found = snapshot.is_some(), "document force refreshed");
                Ok(RefreshedData::Document(snapshot.map(Snapshot::into_value)))
            }
            None => {
                let snapshots = self.remote.list_documents(collection).await?;
                self.recache_collection(collection, &snapshots).await;
                info!(collection, count = snapshots.len(), "collection force refreshed");
                Ok(RefreshedData::Collection(
                    snapshots.into_iter().map(Snapshot::into_value).collect(),
                ))
            }
        }
    }

    async fn recache_document(&self, collection: &str, id: &str, snapshot: Option<&Snapshot>) {
        match collection {
            COURSES => {
                self.dedup.forget(&course_request_key(id)).await;
                self.dedup.forget(super::COURSES_REQUEST_KEY).await;
                match snapshot.cloned().map(Snapshot::decode::<Course>) {
                    Some(Ok(course)) => self.flat.store_course(&course),
                    Some(Err(err)) => {
                        warn!(course_id = id, error = %err, "refreshed course does not decode");
                        self.flat.remove_course(id);
                    }
                    None => self.flat.remove_course(id),
                }
            }
            USERS => {
                self.dedup.forget(&user_request_key(id)).await;
                match snapshot.cloned().map(Snapshot::decode::<User>) {
                    Some(Ok(user)) => self.flat.store_user(&user),
                    _ => self.flat.remove_user(id),
                }
            }
            COURSE_LIST if id == COURSE_LIST_DOC => {
                self.dedup.forget(super::COURSES_REQUEST_KEY).await;
                self.dedup.forget(super::COURSE_MAP_REQUEST_KEY).await;
                match snapshot.cloned().map(Snapshot::decode::<CourseListDocument>) {
                    Some(Ok(aggregate)) => self.flat.store_course_list(&aggregate.listings()),
                    _ => self.flat.remove_course_list(),
                }
            }
            _ => {}
        }
    }

    async fn recache_collection(&self, collection: &str, snapshots: &[Snapshot]) {
        match collection {
            COURSES => {
                let courses = decode_courses(snapshots.to_vec());
                self.cache_courses(&courses).await;
            }
            USERS => {
                for snapshot in snapshots {
                    self.dedup.forget(&user_request_key(&snapshot.id)).await;
                    if let Ok(user) = snapshot.clone().decode::<User>() {
                        self.flat.store_user(&user);
                    }
                }
            }
            _ => {}
        }
    }

    /// Refreshes the courses collection and the course-list aggregate.
    pub async fn clear_cache_and_refresh(&self) -> Result<()> {
        self.force_refresh_from_server(COURSES, None).await?;
        self.force_refresh_from_server(COURSE_LIST, Some(COURSE_LIST_DOC))
            .await?;
        info!("cache cleared and refreshed from remote store");
        Ok(())
    }

    // == Stats ==
    pub async fn get_cache_stats(&self) -> CacheStatsResponse {
        let layered = self.layered.stats().await;
        CacheStatsResponse {
            hit_rate: layered.hit_rate(),
            layered,
            flat: self.flat.stats(),
            blob: self.layered.blob().stats().await,
            memoized_responses: self.dedup.response_count().await,
            pending_requests: self.dedup.pending_count().await,
        }
    }

    // == Clearing ==
    /// Clears the layered cache, the flat cache and the request deduplicator.
    /// Blob copies of permanent types survive.
    ///
    /// Returns the number of persisted entries removed.
    pub async fn clear_all_cache(&self) -> usize {
        let layered = self.layered.clear().await;
        let flat = self.flat.clear_all();
        self.dedup.clear_all().await;
        info!(layered, flat, "all caches cleared");
        layered + flat
    }

    pub async fn invalidate_type(&self, cache_type: &str) -> usize {
        self.layered.invalidate_type(cache_type).await
    }

    pub async fn clear_permanent_cache(&self) {
        self.layered.clear_permanent().await;
    }

    // == Pre-warm ==
    /// Loads the listing and every course into the caches.
    ///
    /// Returns the number of courses warmed.
    pub async fn pre_warm_cache(&self) -> usize {
        let listings = self.list_courses(ReadMode::Cached).await;
        let mut warmed = 0;
        for listing in &listings {
            match self.get_course(&listing.id, ReadMode::Cached).await {
                Ok(_) => warmed += 1,
                Err(err) => warn!(course_id = %listing.id, error = %err, "pre-warm failed for course"),
            }
        }
        info!(warmed, total = listings.len(), "cache pre-warm complete");
        warmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::types;
    use crate::portal::test_support::Harness;
    use crate::remote::RemoteStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_force_refresh_document_overwrites_flat_cache() {
        let h = Harness::with_algorithms_course();
        h.portal.get_course("c1", ReadMode::Cached).await.unwrap();
        h.remote.seed("courses", "c1", json!({"name": "Renamed"}));

        let refreshed = h.portal.force_refresh_from_server("courses", Some("c1")).await.unwrap();
        match refreshed {
            RefreshedData::Document(Some(value)) => {
                assert_eq!(value["id"], "c1");
                assert_eq!(value["name"], "Renamed");
            }
            other => panic!("unexpected refresh result: {:?}", other),
        }

        let course = h.portal.get_course("c1", ReadMode::Cached).await.unwrap();
        assert_eq!(course.name, "Renamed");
    }

    #[tokio::test]
    async fn test_force_refresh_missing_document() {
        let h = Harness::with_algorithms_course();
        h.portal.get_course("c1", ReadMode::Cached).await.unwrap();
        h.remote.delete_document("courses", "c1").await.unwrap();

        let refreshed = h.portal.force_refresh_from_server("courses", Some("c1")).await.unwrap();
        assert_eq!(refreshed, RefreshedData::Document(None));
        assert!(h.portal.flat().cached_course("c1").is_none());
    }

    #[tokio::test]
    async fn test_force_refresh_surfaces_remote_errors() {
        let h = Harness::new();
        h.remote.set_offline(true);
        assert!(h.portal.force_refresh_from_server("courses", None).await.is_err());
    }

    #[tokio::test]
    async fn test_clear_all_cache() {
        let h = Harness::with_algorithms_course();
        h.portal.get_course("c1", ReadMode::Cached).await.unwrap();
        h.portal.layered().set(types::CHATS, json!([]), None).await;

        let removed = h.portal.clear_all_cache().await;
        assert_eq!(removed, 2);

        let stats = h.portal.get_cache_stats().await;
        assert_eq!(stats.layered.total_entries, 0);
        assert_eq!(stats.flat.total, 0);
        assert_eq!(stats.memoized_responses, 0);

        h.portal.get_course("c1", ReadMode::Cached).await.unwrap();
        assert_eq!(h.remote.calls().gets, 2);
    }

    #[tokio::test]
    async fn test_invalidate_type_and_clear_permanent() {
        let h = Harness::new();
        let layered = h.portal.layered();
        layered.set(types::USERS, json!(1), Some("a")).await;
        layered.set(types::COURSE, json!(2), Some("c1")).await;

        assert_eq!(h.portal.invalidate_type(types::USERS).await, 1);
        assert!(layered.get(types::USERS, Some("a")).await.is_none());

        h.portal.clear_permanent_cache().await;
        assert!(layered.get(types::COURSE, Some("c1")).await.is_none());
    }

    #[tokio::test]
    async fn test_pre_warm_cache() {
        let h = Harness::with_algorithms_course();
        h.remote.seed("courses", "c2", json!({"name": "Biology"}));

        assert_eq!(h.portal.pre_warm_cache().await, 2);

        let stats = h.portal.get_cache_stats().await;
        assert_eq!(stats.flat.courses, 2);
        assert_eq!(stats.flat.course_list, 1);
        assert_eq!(h.remote.calls().gets, 0);
    }
}
