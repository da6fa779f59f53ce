//! Client address extraction from proxy headers.

use axum::http::HeaderMap;

/// Returned when no forwarding header identifies the caller.
pub const UNKNOWN_CLIENT: &str = "unknown";

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// Extract the caller's address from forwarding headers.
///
/// Prefers the first entry of `X-Forwarded-For`, then `X-Real-IP`, then
/// [`UNKNOWN_CLIENT`].
pub fn get_client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    headers
        .get(REAL_IP)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}
