//! Domain records and API DTOs
//!
//! Courses, users and chats as stored in the remote document store, plus
//! the request/response bodies of the HTTP surface.

pub mod chat;
pub mod course;
pub mod requests;
pub mod responses;
pub mod user;

use serde::de::DeserializeOwned;

pub use chat::{
    Chat, ChatMessage, ChatSummary, GroupChat, GroupMessage, NewChatMessage, NewGroupMessage,
};
pub use course::{
    Course, CourseItem, CourseListDocument, CourseListing, CourseSummary, Folder, FolderFile,
    NewCourseItem, DEFAULT_CATEGORY,
};
pub use requests::{
    CreateCourseRequest, CreateGroupChatRequest, EnrollmentRequest, ReadQuery, RefreshRequest,
    ReplaceItemsRequest, UpdateCourseRequest, UserChatRequest,
};
pub use responses::{
    CacheStatsResponse, ClearResponse, CreatedResponse, HealthResponse, ItemsReplacedResponse,
    MessageResponse,
};
pub use user::User;

/// A record decoded from a remote document.
///
/// The document id lives outside the document body; `ID_FIELD` names the
/// field it is copied into before decoding.
pub trait RemoteModel: DeserializeOwned {
    const ID_FIELD: Option<&'static str> = Some("id");
}
