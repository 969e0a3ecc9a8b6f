//! HTTP surface: pipeline runs and approval queue review.

pub mod handlers {
    pub use crate::handlers::{api_routes, health, AppState, QueueListParams, ReviewRequest};
}
