//! Course reads and writes.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::collections::COURSES;
use super::{
    course_request_key, distinct_categories, filter_by_category, group_by_category, Portal, ReadMode,
    COURSES_REQUEST_KEY,
};
use crate::cache::FlightHandle;
use crate::error::{PortalError, Result};
use crate::models::{Course, CourseItem, NewCourseItem};
use crate::remote::{to_document, WriteMode};

impl Portal {
    // == Get Course ==
    /// Fetches one course. A missing course is `NotFound`.
    pub async fn get_course(&self, course_id: &str, mode: ReadMode) -> Result<Course> {
        let key = course_request_key(course_id);

        if mode == ReadMode::ForceRefresh {
            debug!(course_id, "force refreshing course");
            let fetched = self.fetch::<Course>(COURSES, course_id).await;
            self.dedup.forget(&key).await;
            match &fetched {
                Ok(course) => self.flat.store_course(course),
                Err(PortalError::NotFound(_)) => self.flat.remove_course(course_id),
                Err(_) => {}
            }
            return fetched;
        }

        let portal = self.clone();
        let course_id = course_id.to_string();
        self.dedup
            .dedupe_tracked(&key, move |flight| async move {
                portal.load_course(&course_id, &flight).await
            })
            .await
    }

    /// Flat cache first, then the remote store.
    ///
    /// The fetched copy is cached only while `flight` is current; a write that
    /// landed during the fetch retires it.
    async fn load_course(&self, course_id: &str, flight: &FlightHandle) -> Result<Course> {
        if let Some(course) = self.flat.cached_course(course_id) {
            debug!(course_id, "course served from flat cache");
            return Ok(course);
        }
        debug!(course_id, "fetching course from remote store");
        let course: Course = self.fetch(COURSES, course_id).await?;
        if flight.write_if_current(|| self.flat.store_course(&course)).await.is_none() {
            debug!(course_id, "course changed during fetch, not caching");
        }
        Ok(course)
    }

    // == Course Items ==
    pub async fn get_course_items(&self, course_id: &str, mode: ReadMode) -> Result<Vec<CourseItem>> {
        Ok(self.get_course(course_id, mode).await?.items)
    }

    pub async fn get_course_items_by_category(
        &self,
        course_id: &str,
        mode: ReadMode,
    ) -> Result<BTreeMap<String, Vec<CourseItem>>> {
        let items = self.get_course_items(course_id, mode).await?;
        Ok(group_by_category(&items))
    }

    pub async fn get_course_categories(&self, course_id: &str, mode: ReadMode) -> Result<Vec<String>> {
        let items = self.get_course_items(course_id, mode).await?;
        Ok(distinct_categories(&items))
    }

    pub async fn get_course_items_in_category(
        &self,
        course_id: &str,
        category: &str,
        mode: ReadMode,
    ) -> Result<Vec<CourseItem>> {
        let items = self.get_course_items(course_id, mode).await?;
        Ok(filter_by_category(&items, category))
    }

    // == Create Course ==
    /// Creates a course with no items.
    ///
    /// Caches the new course and refreshes the course list in the background.
    pub async fn create_course(&self, name: &str, description: &str) -> Result<Course> {
        if name.trim().is_empty() {
            return Err(PortalError::InvalidRequest(
                "Course name cannot be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let mut course = Course::new("", name, description);
        course.created_at = Some(now);
        course.updated_at = Some(now);

        let mut document = to_document(&course)?;
        document.remove("id");
        course.id = self.remote.create_document(COURSES, document).await?;
        info!(course_id = %course.id, "course created");

        self.cache_course(&course).await;
        self.course_list_changed().await;
        Ok(course)
    }

    // == Update Course ==
    /// Renames and/or redescribes a course.
    pub async fn update_course(
        &self,
        course_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Course> {
        if name.is_none() && description.is_none() {
            return Err(PortalError::InvalidRequest("Nothing to update".to_string()));
        }
        if name.is_some_and(|n| n.trim().is_empty()) {
            return Err(PortalError::InvalidRequest(
                "Course name cannot be empty".to_string(),
            ));
        }

        let mut course: Course = self.fetch(COURSES, course_id).await?;
        let now = Utc::now();
        let mut changes = serde_json::Map::new();
        if let Some(name) = name {
            course.name = name.to_string();
            changes.insert("name".to_string(), Value::String(name.to_string()));
        }
        if let Some(description) = description {
            course.description = description.to_string();
            changes.insert("description".to_string(), Value::String(description.to_string()));
        }
        course.updated_at = Some(now);
        changes.insert("updatedAt".to_string(), json!(now));

        self.remote
            .set_document(COURSES, course_id, changes, WriteMode::Merge)
            .await?;
        info!(course_id, "course updated");

        self.cache_course(&course).await;
        self.course_list_changed().await;
        Ok(course)
    }

    // == Delete Course ==
    pub async fn delete_course(&self, course_id: &str) -> Result<()> {
        self.remote.delete_document(COURSES, course_id).await?;
        info!(course_id, "course deleted");

        self.dedup.forget(&course_request_key(course_id)).await;
        self.flat.remove_course(course_id);
        self.course_list_changed().await;
        Ok(())
    }

    // == Add Item ==
    /// Appends an item. Name and URL are checked before any remote call.
    pub async fn add_item_to_course(&self, course_id: &str, item: NewCourseItem) -> Result<CourseItem> {
        let item = item.validate()?;

        let mut course: Course = self.fetch(COURSES, course_id).await?;
        course.items.push(item.clone());
        self.write_items(&mut course).await?;
        info!(course_id, item = %item.name, category = %item.category, "course item added");

        self.cache_course(&course).await;
        Ok(item)
    }

    // == Remove Item ==
    /// Removes the item at `index` and returns the remaining items.
    ///
    /// An out-of-range index fails without writing.
    pub async fn remove_item_from_course(&self, course_id: &str, index: usize) -> Result<Vec<CourseItem>> {
        let mut course: Course = self.fetch(COURSES, course_id).await?;
        if index >= course.items.len() {
            return Err(PortalError::InvalidRequest(format!(
                "Invalid item index {} for course with {} items",
                index,
                course.items.len()
            )));
        }

        let removed = course.items.remove(index);
        self.write_items(&mut course).await?;
        info!(course_id, index, item = %removed.name, "course item removed");

        self.cache_course(&course).await;
        Ok(course.items)
    }

    // == Replace Category ==
    /// Replaces every item of `category` with `items`, e.g. a library import.
    ///
    /// Returns the number of items written.
    pub async fn replace_category_items(
        &self,
        course_id: &str,
        category: &str,
        items: Vec<NewCourseItem>,
    ) -> Result<usize> {
        if category.trim().is_empty() {
            return Err(PortalError::InvalidRequest("Category is required".to_string()));
        }
        let replacements = items
            .into_iter()
            .map(|item| {
                NewCourseItem {
                    category: Some(category.to_string()),
                    ..item
                }
                .validate()
            })
            .collect::<Result<Vec<_>>>()?;

        let mut course: Course = self.fetch(COURSES, course_id).await?;
        course.items.retain(|item| item.category != category);
        let added = replacements.len();
        course.items.extend(replacements);
        self.write_items(&mut course).await?;
        info!(course_id, category, added, "course category replaced");

        self.cache_course(&course).await;
        Ok(added)
    }

    // == Helpers ==
    /// Merges the course's items and a fresh `updatedAt` into the remote document.
    async fn write_items(&self, course: &mut Course) -> Result<()> {
        let now = Utc::now();
        course.updated_at = Some(now);
        let mut changes = serde_json::Map::new();
        changes.insert("items".to_string(), serde_json::to_value(&course.items)?);
        changes.insert("updatedAt".to_string(), json!(now));
        self.remote
            .set_document(COURSES, &course.id, changes, WriteMode::Merge)
            .await?;
        Ok(())
    }

    /// Retires reads of the course still in flight, then writes it through
    /// to the flat cache.
    ///
    /// The listing memo is retired as well, since listing reads also write
    /// individual courses.
    pub(super) async fn cache_course(&self, course: &Course) {
        self.dedup.forget(&course_request_key(&course.id)).await;
        self.dedup.forget(COURSES_REQUEST_KEY).await;
        self.flat.store_course(course);
    }
}
