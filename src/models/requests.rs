//! Request DTOs for the portal API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;

use crate::error::{PortalError, Result};
use crate::models::NewCourseItem;

/// Request body for POST /courses
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCourseRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl CreateCourseRequest {
    /// Validates the request data
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PortalError::InvalidRequest(
                "Course name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Request body for PATCH /courses/:id
///
/// Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCourseRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Request body for PUT /courses/:id/categories/:category/items
#[derive(Debug, Clone, Deserialize)]
pub struct ReplaceItemsRequest {
    pub items: Vec<NewCourseItem>,
}

/// Request body for POST /users/:uid/chat
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserChatRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
}

/// Request body for POST /group-chats
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateGroupChatRequest {
    #[serde(default)]
    pub course_id: Option<String>,
}

/// Request body for enrollment changes
#[derive(Debug, Clone, Deserialize)]
pub struct EnrollmentRequest {
    pub course_id: String,
}

/// Request body for POST /cache/refresh
///
/// Without an `id` the whole collection is refreshed.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub collection: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// Query string accepted by read endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadQuery {
    /// Bypass every cache layer
    #[serde(default)]
    pub refresh: bool,
    #[serde(default)]
    pub category: Option<String>,
}
