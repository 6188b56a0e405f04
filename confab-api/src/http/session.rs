// Session handlers: opaque cookie-based identity

use axum::{extract::State, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};

use confab_signal::UserId;

use super::{ApiError, ApiResult, AppState};

/// Name of the identity cookie
pub const USER_COOKIE: &str = "userId";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: UserId,
}

/// Issue a fresh opaque user id and set the identity cookie
///
/// Path: `GET /login`
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<LoginResponse>) {
    let user = state.coordinator.login();
    let user_id = user.id().clone();

    let mut cookie = Cookie::new(USER_COOKIE, user_id.as_str().to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);

    (jar.add(cookie), Json(LoginResponse { user_id }))
}

/// The identity carried by the request's cookie, if present
pub fn identity(jar: &CookieJar) -> ApiResult<UserId> {
    jar.get(USER_COOKIE)
        .map(|cookie| UserId::from(cookie.value()))
        .ok_or_else(ApiError::login_required)
}
