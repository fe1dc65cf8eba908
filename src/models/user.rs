//! User records.

use serde::{Deserialize, Serialize};

use crate::models::RemoteModel;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "name")]
    pub display_name: String,
    /// Ids of enrolled courses
    #[serde(default)]
    pub courses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

impl User {
    pub fn new(uid: impl Into<String>, email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name: display_name.into(),
            ..Self::default()
        }
    }

    pub fn is_enrolled(&self, course_id: &str) -> bool {
        self.courses.iter().any(|c| c == course_id)
    }
}

impl RemoteModel for User {
    const ID_FIELD: Option<&'static str> = Some("uid");
}
