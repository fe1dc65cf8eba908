//! API Handlers
//!
//! HTTP request handlers over the data-access facade.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::error::{PortalError, Result};
use crate::models::{
    CacheStatsResponse, ChatMessage, ChatSummary, ClearResponse, Course, CourseItem,
    CourseListing, CourseSummary, CreateCourseRequest, CreateGroupChatRequest, CreatedResponse,
    EnrollmentRequest, GroupMessage, HealthResponse, ItemsReplacedResponse, MessageResponse,
    NewChatMessage, NewCourseItem, NewGroupMessage, ReadQuery, RefreshRequest,
    ReplaceItemsRequest, UpdateCourseRequest, User, UserChatRequest,
};
use crate::portal::{Portal, ReadMode, RefreshedData};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub portal: Arc<Portal>,
}

impl AppState {
    pub fn new(portal: Portal) -> Self {
        Self {
            portal: Arc::new(portal),
        }
    }
}

fn read_mode(query: &ReadQuery) -> ReadMode {
    ReadMode::from_refresh_flag(query.refresh)
}

// == Courses ==
/// Handler for GET /courses
pub async fn list_courses_handler(
    State(state): State<AppState>,
    Query(query): Query<ReadQuery>,
) -> Json<Vec<CourseListing>> {
    Json(state.portal.list_courses(read_mode(&query)).await)
}

/// Handler for POST /courses
pub async fn create_course_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateCourseRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>)> {
    req.validate()?;
    let course = state
        .portal
        .create_course(&req.name, &req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: course.id })))
}

/// Handler for GET /courses/:id
pub async fn get_course_handler(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<Course>> {
    let course = state.portal.get_course(&course_id, read_mode(&query)).await?;
    Ok(Json(course))
}

/// Handler for PATCH /courses/:id
pub async fn update_course_handler(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Json(req): Json<UpdateCourseRequest>,
) -> Result<Json<Course>> {
    let course = state
        .portal
        .update_course(&course_id, req.name.as_deref(), req.description.as_deref())
        .await?;
    Ok(Json(course))
}

/// Handler for DELETE /courses/:id
pub async fn delete_course_handler(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.portal.delete_course(&course_id).await?;
    Ok(Json(MessageResponse::new(format!(
        "Course '{}' deleted",
        course_id
    ))))
}

/// Handler for GET /courses/:id/items
///
/// `?category=` narrows the items to one category.
pub async fn course_items_handler(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<Vec<CourseItem>>> {
    let mode = read_mode(&query);
    let items = match query.category.as_deref() {
        Some(category) => {
            state
                .portal
                .get_course_items_in_category(&course_id, category, mode)
                .await?
        }
        None => state.portal.get_course_items(&course_id, mode).await?,
    };
    Ok(Json(items))
}

/// Handler for GET /courses/:id/grouped-items
pub async fn grouped_items_handler(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<BTreeMap<String, Vec<CourseItem>>>> {
    let grouped = state
        .portal
        .get_course_items_by_category(&course_id, read_mode(&query))
        .await?;
    Ok(Json(grouped))
}

/// Handler for GET /courses/:id/categories
pub async fn course_categories_handler(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<Vec<String>>> {
    let categories = state
        .portal
        .get_course_categories(&course_id, read_mode(&query))
        .await?;
    Ok(Json(categories))
}

/// Handler for POST /courses/:id/items
pub async fn add_item_handler(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Json(item): Json<NewCourseItem>,
) -> Result<(StatusCode, Json<CourseItem>)> {
    let item = state.portal.add_item_to_course(&course_id, item).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Handler for DELETE /courses/:id/items/:index
pub async fn remove_item_handler(
    State(state): State<AppState>,
    Path((course_id, index)): Path<(String, usize)>,
) -> Result<Json<Vec<CourseItem>>> {
    let items = state
        .portal
        .remove_item_from_course(&course_id, index)
        .await?;
    Ok(Json(items))
}

/// Handler for PUT /courses/:id/categories/:category/items
pub async fn replace_category_items_handler(
    State(state): State<AppState>,
    Path((course_id, category)): Path<(String, String)>,
    Json(req): Json<ReplaceItemsRequest>,
) -> Result<Json<ItemsReplacedResponse>> {
    let added = state
        .portal
        .replace_category_items(&course_id, &category, req.items)
        .await?;
    Ok(Json(ItemsReplacedResponse { category, added }))
}

/// Handler for POST /courses/:id/group-chat
///
/// Returns the course's group chat, creating it on first use.
pub async fn ensure_group_chat_handler(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<Json<CreatedResponse>> {
    let id = state.portal.ensure_group_chat(&course_id).await?;
    Ok(Json(CreatedResponse { id }))
}

/// Handler for GET /course-list
pub async fn course_list_handler(
    State(state): State<AppState>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<BTreeMap<String, CourseSummary>>> {
    let map = state.portal.get_course_list(read_mode(&query)).await?;
    Ok(Json(map))
}

// == Users ==
/// Handler for GET /users/:uid
pub async fn get_user_handler(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<User>> {
    let user = state.portal.get_user(&uid, read_mode(&query)).await?;
    Ok(Json(user))
}

/// Handler for POST /users/:uid/enrollments
pub async fn enroll_handler(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(req): Json<EnrollmentRequest>,
) -> Result<Json<MessageResponse>> {
    state.portal.enroll(&uid, &req.course_id).await?;
    Ok(Json(MessageResponse::new(format!(
        "User '{}' enrolled in '{}'",
        uid, req.course_id
    ))))
}

/// Handler for DELETE /users/:uid/enrollments/:course_id
pub async fn unenroll_handler(
    State(state): State<AppState>,
    Path((uid, course_id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>> {
    state.portal.unenroll(&uid, &course_id).await?;
    Ok(Json(MessageResponse::new(format!(
        "User '{}' unenrolled from '{}'",
        uid, course_id
    ))))
}

/// Handler for POST /users/:uid/chat
///
/// Returns the user's support chat id, creating the chat if needed.
pub async fn user_chat_handler(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(req): Json<UserChatRequest>,
) -> Result<Json<CreatedResponse>> {
    let id = state
        .portal
        .create_or_get_user_chat(&uid, &req.email, &req.name)
        .await?;
    Ok(Json(CreatedResponse { id }))
}

// == Chats ==
/// Handler for GET /chats
pub async fn list_chats_handler(
    State(state): State<AppState>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<Vec<ChatSummary>>> {
    let chats = state.portal.get_all_chats(read_mode(&query)).await?;
    Ok(Json(chats))
}

/// Handler for GET /chats/:id/messages
pub async fn chat_messages_handler(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<Vec<ChatMessage>>> {
    let messages = state.portal.get_chat_messages(&chat_id).await?;
    Ok(Json(messages))
}

/// Handler for POST /chats/:id/messages
pub async fn add_chat_message_handler(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(message): Json<NewChatMessage>,
) -> Result<(StatusCode, Json<ChatMessage>)> {
    let message = state.portal.add_message_to_chat(&chat_id, message).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Handler for POST /group-chats
pub async fn create_group_chat_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateGroupChatRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>)> {
    let id = state
        .portal
        .create_group_chat(req.course_id.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// Handler for POST /group-chats/:id/messages
pub async fn send_group_message_handler(
    State(state): State<AppState>,
    Path(gc_id): Path<String>,
    Json(message): Json<NewGroupMessage>,
) -> Result<(StatusCode, Json<GroupMessage>)> {
    let message = state.portal.send_group_message(&gc_id, message).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

// == Session ==
/// Handler for GET /session
pub async fn get_session_handler(State(state): State<AppState>) -> Result<Json<User>> {
    state
        .portal
        .restored_session()
        .await
        .map(Json)
        .ok_or_else(|| PortalError::NotFound("session".to_string()))
}

/// Handler for PUT /session
pub async fn remember_session_handler(
    State(state): State<AppState>,
    Json(user): Json<User>,
) -> Result<Json<MessageResponse>> {
    if user.uid.trim().is_empty() {
        return Err(PortalError::InvalidRequest("User id is required".to_string()));
    }
    state.portal.remember_session(&user).await;
    Ok(Json(MessageResponse::new(format!(
        "Session remembered for '{}'",
        user.uid
    ))))
}

/// Handler for DELETE /session
pub async fn forget_session_handler(State(state): State<AppState>) -> Json<MessageResponse> {
    state.portal.forget_session().await;
    Json(MessageResponse::new("Session forgotten"))
}

// == Cache Administration ==
/// Handler for GET /cache/stats
pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    Json(state.portal.get_cache_stats().await)
}

/// Handler for DELETE /cache
pub async fn clear_cache_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    let removed = state.portal.clear_all_cache().await;
    Json(ClearResponse::new("all caches", removed))
}

/// Handler for DELETE /cache/types/:type
pub async fn invalidate_type_handler(
    State(state): State<AppState>,
    Path(cache_type): Path<String>,
) -> Json<ClearResponse> {
    let removed = state.portal.invalidate_type(&cache_type).await;
    Json(ClearResponse::new(&cache_type, removed))
}

/// Handler for POST /cache/refresh
pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<RefreshedData>> {
    let refreshed = state
        .portal
        .force_refresh_from_server(&req.collection, req.id.as_deref())
        .await?;
    Ok(Json(refreshed))
}

/// Handler for POST /cache/clear-and-refresh
pub async fn clear_and_refresh_handler(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>> {
    state.portal.clear_cache_and_refresh().await?;
    Ok(Json(MessageResponse::new("Caches refreshed from remote store")))
}

/// Handler for DELETE /cache/permanent
pub async fn clear_permanent_handler(State(state): State<AppState>) -> Json<MessageResponse> {
    state.portal.clear_permanent_cache().await;
    Json(MessageResponse::new("Permanent cache cleared"))
}

/// Handler for POST /cache/pre-warm
pub async fn pre_warm_handler(State(state): State<AppState>) -> Json<MessageResponse> {
    let warmed = state.portal.pre_warm_cache().await;
    Json(MessageResponse::new(format!("{} courses warmed", warmed)))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
