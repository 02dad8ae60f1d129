//! The starter's modules, mounted by `crate::mount_modules`.
//!
//! | module          | depends on | routes                          |
//! |-----------------|------------|---------------------------------|
//! | `auth`          |            | `GET /auth/me`                  |
//! | `health`        |            | `GET /health`                   |
//! | `sse`           | `auth`     | `/sse/...` stream, broadcast, admin |
//! | `notifications` | `sse`      | `POST /notifications`           |

pub mod auth;
pub mod health;
pub mod notifications;
pub mod sse;

pub use self::auth::AuthModule;
pub use self::health::HealthModule;
pub use self::notifications::NotificationsModule;
pub use self::sse::SseModule;
