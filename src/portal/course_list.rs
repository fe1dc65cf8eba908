//! The course listing and its denormalized aggregate document.

use std::collections::BTreeMap;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::collections::{COURSES, COURSE_LIST};
use super::{course_request_key, Portal, ReadMode, COURSES_REQUEST_KEY, COURSE_LIST_DOC, COURSE_MAP_REQUEST_KEY};
use crate::cache::FlightHandle;
use crate::error::Result;
use crate::models::{Course, CourseListDocument, CourseListing, CourseSummary};
use crate::remote::{to_document, Snapshot, WriteMode};

impl Portal {
    // == List Courses ==
    /// Lists every course. Degrades to an empty list when the remote store
    /// fails; the failure is not memoized.
    pub async fn list_courses(&self, mode: ReadMode) -> Vec<CourseListing> {
        let outcome = if mode == ReadMode::ForceRefresh {
            self.refresh_course_listings().await
        } else {
            let portal = self.clone();
            self.dedup
                .dedupe_tracked(COURSES_REQUEST_KEY, move |flight| async move {
                    portal.load_course_listings(&flight).await
                })
                .await
        };

        outcome.unwrap_or_else(|err| {
            warn!(error = %err, "listing courses failed, returning empty list");
            Vec::new()
        })
    }

    async fn load_course_listings(&self, flight: &FlightHandle) -> Result<Vec<CourseListing>> {
        if let Some(listings) = self.flat.cached_course_list() {
            debug!(count = listings.len(), "course list served from flat cache");
            return Ok(listings);
        }

        let courses = self.fetch_course_collection().await?;
        let listings: Vec<CourseListing> = courses.iter().map(Course::listing).collect();
        let stored = flight
            .write_if_current(|| {
                for course in &courses {
                    self.flat.store_course(course);
                }
                self.flat.store_course_list(&listings);
            })
            .await;
        if stored.is_none() {
            debug!("courses changed during listing, not caching");
        }
        Ok(listings)
    }

    /// Reads the whole courses collection and writes it through, retiring
    /// every request memo it supersedes.
    async fn refresh_course_listings(&self) -> Result<Vec<CourseListing>> {
        let courses = self.fetch_course_collection().await?;
        self.cache_courses(&courses).await;
        Ok(courses.iter().map(Course::listing).collect())
    }

    async fn fetch_course_collection(&self) -> Result<Vec<Course>> {
        let courses = decode_courses(self.remote.list_documents(COURSES).await?);
        debug!(count = courses.len(), "course collection fetched from remote store");
        Ok(courses)
    }

    // == Course Map ==
    /// The course list keyed by id, read from the aggregate document.
    ///
    /// A missing aggregate is rebuilt on the spot. If the aggregate cannot be
    /// read the map is derived from the courses collection instead.
    pub async fn get_course_list(&self, mode: ReadMode) -> Result<BTreeMap<String, CourseSummary>> {
        if mode == ReadMode::ForceRefresh {
            self.dedup.forget(COURSE_MAP_REQUEST_KEY).await;
            return self.fetch_course_map(None).await;
        }

        let portal = self.clone();
        self.dedup
            .dedupe_tracked(COURSE_MAP_REQUEST_KEY, move |flight| async move {
                portal.load_course_map(&flight).await
            })
            .await
    }

    async fn load_course_map(&self, flight: &FlightHandle) -> Result<BTreeMap<String, CourseSummary>> {
        if let Some(listings) = self.flat.cached_course_list() {
            debug!("course map served from flat cache");
            return Ok(listings_to_map(listings));
        }
        self.fetch_course_map(Some(flight)).await
    }

    /// Without a flight the listing is written through unconditionally.
    async fn fetch_course_map(
        &self,
        flight: Option<&FlightHandle>,
    ) -> Result<BTreeMap<String, CourseSummary>> {
        let aggregate = match self.remote.get_document(COURSE_LIST, COURSE_LIST_DOC).await {
            Ok(Some(snapshot)) => snapshot.decode::<CourseListDocument>(),
            Ok(None) => {
                info!("course list document missing, building it");
                self.rebuild_course_list().await
            }
            Err(err) => Err(err.into()),
        };

        match aggregate {
            Ok(aggregate) => {
                let listings = aggregate.listings();
                match flight {
                    Some(flight) => {
                        flight
                            .write_if_current(|| self.flat.store_course_list(&listings))
                            .await;
                    }
                    None => self.flat.store_course_list(&listings),
                }
                Ok(aggregate.courses)
            }
            Err(err) => {
                warn!(error = %err, "course list document unavailable, falling back to course listing");
                Ok(listings_to_map(self.list_courses(ReadMode::Cached).await))
            }
        }
    }

    // == Rebuild Aggregate ==
    /// Regenerates `course-list/all-courses` from the courses collection and
    /// writes the listing through to the flat cache.
    pub async fn rebuild_course_list(&self) -> Result<CourseListDocument> {
        let courses = decode_courses(self.remote.list_documents(COURSES).await?);
        let aggregate = CourseListDocument::from_courses(&courses);

        self.remote
            .set_document(COURSE_LIST, COURSE_LIST_DOC, to_document(&aggregate)?, WriteMode::Overwrite)
            .await?;

        self.dedup.forget(COURSES_REQUEST_KEY).await;
        self.dedup.forget(COURSE_MAP_REQUEST_KEY).await;
        self.flat.store_course_list(&aggregate.listings());
        info!(courses = aggregate.courses.len(), "course list rebuilt");
        Ok(aggregate)
    }

    /// Rebuilds the aggregate on its own task. Failures are logged only.
    pub fn spawn_course_list_rebuild(&self) -> JoinHandle<()> {
        let portal = self.clone();
        tokio::spawn(async move {
            if let Err(err) = portal.rebuild_course_list().await {
                warn!(error = %err, "course list rebuild failed, aggregate left stale");
            }
        })
    }

    /// Drops every cached form of the listing and starts a rebuild.
    pub(super) async fn course_list_changed(&self) {
        self.dedup.forget(COURSES_REQUEST_KEY).await;
        self.dedup.forget(COURSE_MAP_REQUEST_KEY).await;
        self.flat.remove_course_list();
        self.spawn_course_list_rebuild();
    }

    /// Writes a fetched collection of courses through to the flat cache,
    /// after retiring every read it supersedes.
    pub(super) async fn cache_courses(&self, courses: &[Course]) {
        for course in courses {
            self.dedup.forget(&course_request_key(&course.id)).await;
        }
        self.dedup.forget(COURSES_REQUEST_KEY).await;
        self.dedup.forget(COURSE_MAP_REQUEST_KEY).await;

        for course in courses {
            self.flat.store_course(course);
        }
        let listings: Vec<CourseListing> = courses.iter().map(Course::listing).collect();
        self.flat.store_course_list(&listings);
    }
}

/// Decodes course snapshots, skipping documents that do not decode.
pub(super) fn decode_courses(snapshots: Vec<Snapshot>) -> Vec<Course> {
    snapshots
        .into_iter()
        .filter_map(|snapshot| {
            let id = snapshot.id.clone();
            match snapshot.decode::<Course>() {
                Ok(course) => Some(course),
                Err(err) => {
                    warn!(course_id = %id, error = %err, "skipping undecodable course");
                    None
                }
            }
        })
        .collect()
}

fn listings_to_map(listings: Vec<CourseListing>) -> BTreeMap<String, CourseSummary> {
    listings
        .into_iter()
        .map(|listing| {
            (
                listing.id,
                CourseSummary {
                    name: listing.name,
                    description: listing.description,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::test_support::Harness;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_courses_caches_listing_and_courses() {
        let h = Harness::with_algorithms_course();
        h.remote.seed("courses", "c2", json!({"name": "Biology"}));

        let listings = h.portal.list_courses(ReadMode::Cached).await;
        assert_eq!(listings.len(), 2);
        assert_eq!(h.portal.flat().cached_course_list(), Some(listings.clone()));

        // Individual courses were written through too
        h.portal.get_course("c2", ReadMode::Cached).await.unwrap();
        assert_eq!(h.remote.calls().gets, 0);
        assert_eq!(h.remote.calls().lists, 1);
    }

    #[tokio::test]
    async fn test_forced_listing_refresh_retires_course_memos() {
        let h = Harness::with_algorithms_course();
        let before = h.portal.get_course("c1", ReadMode::Cached).await.unwrap();
        assert_eq!(before.name, "Algorithms");

        h.remote.seed("courses", "c1", json!({"name": "Algorithms II"}));
        h.portal.list_courses(ReadMode::ForceRefresh).await;

        let after = h.portal.get_course("c1", ReadMode::Cached).await.unwrap();
        assert_eq!(after.name, "Algorithms II");
        assert_eq!(h.remote.calls().gets, 1);
    }

    #[tokio::test]
    async fn test_list_courses_degrades_to_empty() {
        let h = Harness::with_algorithms_course();
        h.remote.set_offline(true);

        assert!(h.portal.list_courses(ReadMode::Cached).await.is_empty());

        h.remote.set_offline(false);
        assert_eq!(h.portal.list_courses(ReadMode::Cached).await.len(), 1);
    }

    #[tokio::test]
    async fn test_get_course_list_builds_missing_aggregate() {
        let h = Harness::with_algorithms_course();

        let map = h.portal.get_course_list(ReadMode::Cached).await.unwrap();
        assert_eq!(map["c1"].name, "Algorithms");

        let stored = h.remote.document("course-list", "all-courses").unwrap();
        assert_eq!(stored["courses"]["c1"]["description"], "Graphs and more");
    }

    #[tokio::test]
    async fn test_get_course_list_reads_existing_aggregate() {
        let h = Harness::new();
        h.remote.seed(
            "course-list",
            "all-courses",
            json!({"courses": {"x": {"name": "X", "description": "from aggregate"}}}),
        );

        let map = h.portal.get_course_list(ReadMode::Cached).await.unwrap();
        assert_eq!(map["x"].description, "from aggregate");
        assert_eq!(h.remote.calls().lists, 0);
    }

    #[tokio::test]
    async fn test_rebuild_course_list() {
        let h = Harness::with_algorithms_course();
        h.remote.seed("courses", "c2", json!({"title": "Legacy"}));

        let aggregate = h.portal.rebuild_course_list().await.unwrap();
        assert_eq!(aggregate.courses.len(), 2);
        assert_eq!(aggregate.courses["c2"].name, "Legacy");
        assert_eq!(h.portal.flat().cached_course_list().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rebuild_failure_keeps_primary_write() {
        let h = Harness::new();
        let course = h.portal.create_course("Chemistry", "").await.unwrap();

        h.remote.set_offline(true);
        let handle = h.portal.spawn_course_list_rebuild();
        handle.await.unwrap();
        h.remote.set_offline(false);

        assert!(h.remote.document("courses", &course.id).is_some());
    }

    #[tokio::test]
    async fn test_create_course_appears_in_listing() {
        let h = Harness::with_algorithms_course();
        assert_eq!(h.portal.list_courses(ReadMode::Cached).await.len(), 1);

        h.portal.create_course("Databases", "").await.unwrap();

        let listings = h.portal.list_courses(ReadMode::Cached).await;
        assert_eq!(listings.len(), 2);
    }
}
