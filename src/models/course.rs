//! Course documents and their cache-side views.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{PortalError, Result};
use crate::models::RemoteModel;

/// Category given to items stored without one.
pub const DEFAULT_CATEGORY: &str = "others";

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// Missing, null and empty categories all read as the default.
fn category_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(default_category))
}

/// Reads stored items leniently: missing fields default and entries that are
/// not item objects are skipped.
fn stored_items<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<CourseItem>, D::Error> {
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(item) => Some(item),
            Err(err) => {
                warn!(index, error = %err, "skipping unreadable course item");
                None
            }
        })
        .collect())
}

/// Null reads as an empty string.
fn string_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// == Course ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "title")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "stored_items")]
    pub items: Vec<CourseItem>,
    #[serde(rename = "folder_items", default, skip_serializing_if = "Option::is_none")]
    pub folder_items: Option<Vec<Folder>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Course {
    /// A course with no items and no timestamps.
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            items: Vec::new(),
            folder_items: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn summary(&self) -> CourseSummary {
        CourseSummary {
            name: self.display_name().to_string(),
            description: self.description.clone(),
        }
    }

    pub fn listing(&self) -> CourseListing {
        CourseListing {
            id: self.id.clone(),
            name: self.display_name().to_string(),
            description: self.description.clone(),
        }
    }

    /// The name, or a placeholder for unnamed courses.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            "Untitled Course"
        } else {
            &self.name
        }
    }
}

impl RemoteModel for Course {}

// == Course Item ==
/// A stored item. Reading never rejects missing fields; new items are checked
/// through [`NewCourseItem::validate`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseItem {
    #[serde(default, deserialize_with = "string_or_default")]
    pub name: String,
    #[serde(default, deserialize_with = "string_or_default")]
    pub url: String,
    #[serde(default = "default_category", deserialize_with = "category_or_default")]
    pub category: String,
}

/// An item as submitted by a caller, category optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCourseItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub category: Option<String>,
}

impl NewCourseItem {
    pub fn new(name: impl Into<String>, url: impl Into<String>, category: Option<&str>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            category: category.map(str::to_string),
        }
    }

    /// Checks required fields and fills in the default category.
    pub fn validate(self) -> Result<CourseItem> {
        if self.name.trim().is_empty() || self.url.trim().is_empty() {
            return Err(PortalError::InvalidRequest(
                "Item name and URL are required".to_string(),
            ));
        }
        Ok(CourseItem {
            name: self.name,
            url: self.url,
            category: self
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(default_category),
        })
    }
}

// == Folders ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub folder_name: String,
    #[serde(default)]
    pub files: Vec<FolderFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderFile {
    pub file_name: String,
    pub file_url: String,
}

// == Course List ==
/// One row of the course-list aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSummary {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A summary with its course id, as cached in the flat cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseListing {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// The denormalized `course-list/all-courses` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseListDocument {
    #[serde(default)]
    pub courses: BTreeMap<String, CourseSummary>,
}

impl RemoteModel for CourseListDocument {
    const ID_FIELD: Option<&'static str> = None;
}

impl CourseListDocument {
    pub fn from_courses<'a>(courses: impl IntoIterator<Item = &'a Course>) -> Self {
        Self {
            courses: courses
                .into_iter()
                .map(|course| (course.id.clone(), course.summary()))
                .collect(),
        }
    }

    pub fn listings(&self) -> Vec<CourseListing> {
        self.courses
            .iter()
            .map(|(id, summary)| CourseListing {
                id: id.clone(),
                name: summary.name.clone(),
                description: summary.description.clone(),
            })
            .collect()
    }
}
