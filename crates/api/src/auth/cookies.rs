//! Session cookies

use axum_extra::extract::cookie::{Cookie, CookieJar};
use time::Duration;

use tubeline_shared::TokenPair;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

fn session_cookie(name: &'static str, value: String, max_age: Duration) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .path("/")
        .max_age(max_age)
        .build()
}

/// Add both tokens of a pair as HTTP-only, secure-only cookies
pub fn set_session_cookies(
    jar: CookieJar,
    pair: &TokenPair,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
) -> CookieJar {
    jar.add(session_cookie(
        ACCESS_TOKEN_COOKIE,
        pair.access_token.clone(),
        Duration::seconds(access_ttl_secs),
    ))
    .add(session_cookie(
        REFRESH_TOKEN_COOKIE,
        pair.refresh_token.clone(),
        Duration::seconds(refresh_ttl_secs),
    ))
}

/// Expire both session cookies
pub fn clear_session_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_TOKEN_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_TOKEN_COOKIE).path("/"))
}
