//! Interstitial "waking up" page
//!
//! Served instead of the proxied response while the backend is unreachable.
//! The page refreshes itself back to the exact URL that triggered the wake,
//! so the retried request is identical to the original one. Status is 200 on
//! purpose: the client-side refresh drives the retry, not an HTTP redirect,
//! which keeps the next real attempt's method intact.

use hyper::header;
use hyper::{Response, StatusCode};

use crate::error::{full_body, ResponseBody};

/// Neutralize quote characters so attacker-controlled paths and query
/// strings cannot break out of the refresh attribute.
pub fn escape_attribute(url: &str) -> String {
    url.replace('"', "%22").replace('\'', "%27")
}

/// Render the full HTML document for the interstitial page.
pub fn render_page(original_url: &str, target_host: &str, refresh_delay_secs: u64) -> String {
    let safe_url = escape_attribute(original_url);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta http-equiv="refresh" content="{refresh_delay_secs};url={safe_url}">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Waking Up...</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Oxygen-Sans, Ubuntu, Cantarell, "Helvetica Neue", sans-serif; line-height: 1.6; text-align: center; padding: 40px 20px; background-color: #f4f4f4; color: #333; }}
        .container {{ max-width: 650px; margin: auto; padding: 30px; border: 1px solid #ddd; border-radius: 8px; background-color: #fff; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }}
        h2 {{ color: #2c3e50; margin-bottom: 15px; }}
        p {{ margin-bottom: 20px; color: #555; }}
        .spinner {{ border: 5px solid #e0e0e0; border-top: 5px solid #3498db; border-radius: 50%; width: 45px; height: 45px; animation: spin 1.5s linear infinite; margin: 25px auto; }}
        code {{ background-color: #eee; padding: 2px 5px; border-radius: 3px; font-family: monospace; }}
        @keyframes spin {{ 0% {{ transform: rotate(0deg); }} 100% {{ transform: rotate(360deg); }} }}
    </style>
</head>
<body>
    <div class="container">
        <h2>Waking Up...</h2>
        <p>Attempting to wake the device at <code>{target_host}</code>. This page will refresh automatically.</p>
        <div class="spinner"></div>
        <p>Please wait. If this page persists for more than a few minutes, check the device directly.</p>
        <p><small>Refreshing to: <code>{safe_url}</code></small></p>
    </div>
</body>
</html>
"#
    )
}

/// Build the complete interstitial response: 200 OK, HTML body, and explicit
/// no-cache directives so no intermediary serves a stale "waking up" page
/// once the backend is reachable.
pub fn interstitial_response(
    original_url: &str,
    target_host: &str,
    refresh_delay_secs: u64,
) -> Response<ResponseBody> {
    let html = render_page(original_url, target_host, refresh_delay_secs);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .body(full_body(html))
        .expect("valid response with static headers")
}
