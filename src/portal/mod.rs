//! Data Access Facade
//!
//! The only way callers reach course, user and chat data. Reads go through
//! the request deduplicator, then the flat cache, then the remote store.
//! Writes go to the remote store first and then update or invalidate every
//! cache entry they affect.

mod admin;
mod categories;
mod chats;
mod course_list;
mod courses;
mod session;
mod users;

use std::sync::Arc;

use crate::cache::{FlatCache, LayeredCache, RequestDeduplicator};
use crate::error::{PortalError, Result};
use crate::models::RemoteModel;
use crate::remote::RemoteStore;

pub use admin::RefreshedData;
pub use categories::{distinct_categories, filter_by_category, group_by_category};

// == Collections ==
pub mod collections {
    pub const USERS: &str = "users";
    pub const COURSES: &str = "courses";
    pub const COURSE_LIST: &str = "course-list";
    pub const CHATS: &str = "chats";
    pub const GROUP_CHATS: &str = "gcs";
}

/// Id of the denormalized course-list document.
pub const COURSE_LIST_DOC: &str = "all-courses";

// == Request Keys ==
fn course_request_key(course_id: &str) -> String {
    format!("course:{}", course_id)
}

fn user_request_key(uid: &str) -> String {
    format!("user:{}", uid)
}

const COURSES_REQUEST_KEY: &str = "courses:list";
const COURSE_MAP_REQUEST_KEY: &str = "courselist:all";

// == Read Mode ==
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadMode {
    /// Deduplicated, served from cache when fresh
    #[default]
    Cached,
    /// Skips every cache, refetches and overwrites the cached copy
    ForceRefresh,
}

impl ReadMode {
    pub fn from_refresh_flag(refresh: bool) -> Self {
        if refresh {
            ReadMode::ForceRefresh
        } else {
            ReadMode::Cached
        }
    }
}

// == Portal ==
/// Cheap to clone; clones share every cache and the remote handle.
#[derive(Debug, Clone)]
pub struct Portal {
    remote: Arc<dyn RemoteStore>,
    layered: Arc<LayeredCache>,
    flat: FlatCache,
    dedup: RequestDeduplicator,
}

impl Portal {
    // == Constructor ==
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        layered: Arc<LayeredCache>,
        flat: FlatCache,
        dedup: RequestDeduplicator,
    ) -> Self {
        Self {
            remote,
            layered,
            flat,
            dedup,
        }
    }

    pub fn layered(&self) -> &Arc<LayeredCache> {
        &self.layered
    }

    pub fn flat(&self) -> &FlatCache {
        &self.flat
    }

    pub fn dedup(&self) -> &RequestDeduplicator {
        &self.dedup
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// Fetches and decodes one document, failing with `NotFound` when absent.
    async fn fetch<T: RemoteModel>(&self, collection: &str, id: &str) -> Result<T> {
        self.remote
            .get_document(collection, id)
            .await?
            .ok_or_else(|| PortalError::NotFound(format!("{}/{}", collection, id)))?
            .decode()
    }
}
