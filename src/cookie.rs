//! Parse the Amplitude identity cookie into a device/user id pair.
//!
//! This is genuinely ambient surface (spec.md treats the cookie parser as
//! an external collaborator); it carries no dependency on the rest of the
//! crate and a caller is free to ignore it and build an
//! [`crate::context::EvaluationContext`] directly.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use percent_encoding::percent_decode_str;
use serde::Deserialize;

/// The device/user identity recovered from an Amplitude cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieIdentity {
    pub device_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BrowserSdkV2Session {
    #[serde(rename = "deviceId")]
    device_id: String,
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

/// Parse the legacy `amp_<...>` cookie format: `<device_id>.<base64 user_id>...`,
/// `.`-delimited, device id in field 0 and an optional base64-encoded user
/// id in field 1.
pub fn parse_legacy(cookie_value: &str) -> CookieIdentity {
    let mut parts = cookie_value.split('.');
    let device_id = parts.next().filter(|s| !s.is_empty()).map(str::to_owned);
    let user_id = parts
        .next()
        .filter(|s| !s.is_empty())
        .and_then(|encoded| BASE64.decode(encoded).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok());
    CookieIdentity { device_id, user_id }
}

/// Parse the Browser-SDK-v2 `AMP_<...>` cookie format: a URL-encoded,
/// base64-wrapped JSON object `{deviceId, userId?}`.
pub fn parse_browser_sdk_v2(cookie_value: &str) -> Option<CookieIdentity> {
    let decoded = BASE64.decode(cookie_value).ok()?;
    let json_text = String::from_utf8(decoded).ok()?;
    let form_decoded = json_text.replace('+', " ");
    let unescaped = percent_decode_str(&form_decoded).decode_utf8().ok()?;
    let session: BrowserSdkV2Session = serde_json::from_str(&unescaped).ok()?;
    Some(CookieIdentity {
        device_id: Some(session.device_id),
        user_id: session.user_id,
    })
}

/// The cookie name Amplitude sets for a given API key.
pub fn cookie_name(api_key: &str, new_format: bool) -> Option<String> {
    if new_format {
        (api_key.len() >= 10).then(|| format!("AMP_{}", &api_key[..10]))
    } else {
        (api_key.len() >= 6).then(|| format!("amp_{}", &api_key[..6]))
    }
}
