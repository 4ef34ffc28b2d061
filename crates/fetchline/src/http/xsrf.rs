//! Anti-forgery token attachment.
//!
//! The server drops a token in a cookie (`XSRF-TOKEN` by default); every
//! request eligible for it echoes the value back in a header
//! (`X-XSRF-TOKEN` by default).

use reqwest::cookie::{CookieStore, Jar};
use url::Url;

/// Find a cookie value in a `Cookie` header string (`a=1; b=2`).
pub(crate) fn find_cookie<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key.trim() == name).then_some(value.trim())
    })
}

/// Read the anti-forgery token stored for `url`, if any.
pub(crate) fn token_for(jar: &Jar, url: &Url, cookie_name: &str) -> Option<String> {
    let cookies = jar.cookies(url)?;
    let cookies = cookies.to_str().ok()?;
    find_cookie(cookies, cookie_name)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Check whether two URLs share scheme, host and port.
pub(crate) fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}
