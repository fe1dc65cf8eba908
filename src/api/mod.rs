//! API Module
//!
//! HTTP handlers and routing for the portal REST API.
//!
//! # Endpoints
//! - `GET /courses`, `POST /courses` - List or create courses
//! - `GET /courses/:id`, `PATCH /courses/:id`, `DELETE /courses/:id` - One course
//! - `GET /courses/:id/items`, `POST /courses/:id/items` - Course items
//! - `DELETE /courses/:id/items/:index` - Remove an item by position
//! - `GET /courses/:id/grouped-items`, `GET /courses/:id/categories` - Item views
//! - `PUT /courses/:id/categories/:category/items` - Replace one category's items
//! - `POST /courses/:id/group-chat` - The course's group chat, created on first use
//! - `GET /course-list` - Course map from the aggregate document
//! - `GET /users/:uid` - User record
//! - `POST /users/:uid/enrollments`, `DELETE /users/:uid/enrollments/:course_id`
//! - `POST /users/:uid/chat` - The user's support chat, created on first use
//! - `GET /chats`, `GET /chats/:id/messages`, `POST /chats/:id/messages`
//! - `POST /group-chats`, `POST /group-chats/:id/messages`
//! - `GET /session`, `PUT /session`, `DELETE /session` - Remembered sign-in
//! - `GET /cache/stats`, `DELETE /cache`, `DELETE /cache/types/:type`
//! - `POST /cache/refresh`, `POST /cache/pre-warm`, `POST /cache/clear-and-refresh`
//! - `DELETE /cache/permanent` - Drop blob copies of permanent types
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
