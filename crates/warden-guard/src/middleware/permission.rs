//! Permission-guard middleware

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::guard::Guard;

/// Middleware state: the guard plus the permission a route requires
#[derive(Clone)]
pub struct RequiredPermission {
    pub guard: Guard,
    pub permission: Arc<str>,
}

impl RequiredPermission {
    pub fn new(guard: Guard, permission: impl Into<Arc<str>>) -> Self {
        Self {
            guard,
            permission: permission.into(),
        }
    }
}

/// Reject the request unless the guard lets it through.
///
/// ```ignore
/// let app = Router::new()
///     .route("/admin", get(handler))
///     .layer(from_fn_with_state(
///         RequiredPermission::new(guard, "admin:access:all"),
///         require_permission,
///     ));
/// ```
pub async fn require_permission(
    State(required): State<RequiredPermission>,
    request: Request,
    next: Next,
) -> Response {
    let rejection = required
        .guard
        .guard_permission(&required.permission, &request)
        .await;

    match rejection {
        Some(response) => response,
        None => next.run(request).await,
    }
}
