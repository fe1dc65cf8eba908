//! API Routes
//!
//! Configures the Axum router with all portal endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    add_chat_message_handler, add_item_handler, cache_stats_handler, chat_messages_handler,
    clear_and_refresh_handler, clear_cache_handler, clear_permanent_handler,
    course_categories_handler, course_items_handler, course_list_handler,
    create_course_handler, create_group_chat_handler, delete_course_handler, enroll_handler,
    ensure_group_chat_handler, forget_session_handler, get_course_handler, get_session_handler,
    get_user_handler, grouped_items_handler, health_handler, invalidate_type_handler,
    list_chats_handler, list_courses_handler, pre_warm_handler, refresh_handler,
    remember_session_handler, remove_item_handler, replace_category_items_handler,
    send_group_message_handler, unenroll_handler, update_course_handler, user_chat_handler,
    AppState,
};

/// Creates the main router with all endpoints configured.
///
/// Read endpoints accept `?refresh=true` to bypass every cache layer.
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/courses", get(list_courses_handler).post(create_course_handler))
        .route(
            "/courses/:id",
            get(get_course_handler)
                .patch(update_course_handler)
                .delete(delete_course_handler),
        )
        .route(
            "/courses/:id/items",
            get(course_items_handler).post(add_item_handler),
        )
        .route("/courses/:id/items/:index", delete(remove_item_handler))
        .route("/courses/:id/grouped-items", get(grouped_items_handler))
        .route("/courses/:id/categories", get(course_categories_handler))
        .route(
            "/courses/:id/categories/:category/items",
            put(replace_category_items_handler),
        )
        .route("/courses/:id/group-chat", post(ensure_group_chat_handler))
        .route("/course-list", get(course_list_handler))
        .route("/users/:uid", get(get_user_handler))
        .route("/users/:uid/chat", post(user_chat_handler))
        .route("/users/:uid/enrollments", post(enroll_handler))
        .route(
            "/users/:uid/enrollments/:course_id",
            delete(unenroll_handler),
        )
        .route("/chats", get(list_chats_handler))
        .route(
            "/chats/:id/messages",
            get(chat_messages_handler).post(add_chat_message_handler),
        )
        .route("/group-chats", post(create_group_chat_handler))
        .route("/group-chats/:id/messages", post(send_group_message_handler))
        .route(
            "/session",
            get(get_session_handler)
                .put(remember_session_handler)
                .delete(forget_session_handler),
        )
        .route("/cache", delete(clear_cache_handler))
        .route("/cache/stats", get(cache_stats_handler))
        .route("/cache/types/:type", delete(invalidate_type_handler))
        .route("/cache/refresh", post(refresh_handler))
        .route("/cache/pre-warm", post(pre_warm_handler))
        .route("/cache/clear-and-refresh", post(clear_and_refresh_handler))
        .route("/cache/permanent", delete(clear_permanent_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::test_support::Harness;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::util::ServiceExt;

    fn create_test_app(harness: &Harness) -> Router {
        create_router(AppState::new(harness.portal.clone()))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let h = Harness::new();

        let response = create_test_app(&h)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cache_stats_endpoint() {
        let h = Harness::new();

        let response = create_test_app(&h)
            .oneshot(
                Request::builder()
                    .uri("/cache/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_course_endpoint() {
        let h = Harness::new();

        let response = create_test_app(&h)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/courses")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"Algorithms"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_get_course_not_found() {
        let h = Harness::new();

        let response = create_test_app(&h)
            .oneshot(
                Request::builder()
                    .uri("/courses/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_course_endpoint() {
        let h = Harness::with_algorithms_course();

        let response = create_test_app(&h)
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/courses/c1")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"description":"Flows too"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.remote.document("courses", "c1").unwrap()["description"], "Flows too");
    }

    #[tokio::test]
    async fn test_session_not_found_endpoint() {
        let h = Harness::new();

        let response = create_test_app(&h)
            .oneshot(
                Request::builder()
                    .uri("/session")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
