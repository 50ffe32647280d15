//! Account blob codec
//!
//! `accounts.json` in a backup is a flat JSON object mapping a fixed set of
//! keys to base64-encoded UTF-8 values. Only non-blank values are written, and
//! the entry is left out of the archive when nothing is set.
//!
//! Restoring applies only the keys present in the blob on top of the current
//! credentials.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bridge_traits::storage::AccountCredentials;
use std::collections::BTreeMap;

use crate::error::Result;

/// Archive entry name.
pub const ACCOUNTS_ENTRY: &str = "accounts.json";

/// Placeholder shown by the proxy settings before a URL is entered.
const PROXY_URL_PLACEHOLDER: &str = "host:port";

/// Blob keys in write order.
pub const ACCOUNT_KEYS: &[&str] = &[
    "innerTubeCookie",
    "visitorData",
    "dataSyncId",
    "accountName",
    "accountEmail",
    "accountChannelHandle",
    "accountImageUrl",
    "lastFmSessionKey",
    "lastFmUsername",
    "discordToken",
    "discordUsername",
    "discordName",
    "discordAvatarUrl",
    "spotifyAccessToken",
    "spotifyRefreshToken",
    "proxyUrl",
    "proxyUsername",
    "proxyPassword",
];

fn field<'a>(credentials: &'a AccountCredentials, key: &str) -> Option<&'a str> {
    let value = match key {
        "innerTubeCookie" => &credentials.inner_tube_cookie,
        "visitorData" => &credentials.visitor_data,
        "dataSyncId" => &credentials.data_sync_id,
        "accountName" => &credentials.account_name,
        "accountEmail" => &credentials.account_email,
        "accountChannelHandle" => &credentials.account_channel_handle,
        "accountImageUrl" => &credentials.account_image_url,
        "lastFmSessionKey" => &credentials.last_fm_session_key,
        "lastFmUsername" => &credentials.last_fm_username,
        "discordToken" => &credentials.discord_token,
        "discordUsername" => &credentials.discord_username,
        "discordName" => &credentials.discord_name,
        "discordAvatarUrl" => &credentials.discord_avatar_url,
        "spotifyAccessToken" => &credentials.spotify_access_token,
        "spotifyRefreshToken" => &credentials.spotify_refresh_token,
        "proxyUrl" => &credentials.proxy_url,
        "proxyUsername" => &credentials.proxy_username,
        "proxyPassword" => &credentials.proxy_password,
        _ => return None,
    };
    Some(value.as_str())
}

fn field_mut<'a>(credentials: &'a mut AccountCredentials, key: &str) -> Option<&'a mut String> {
    let value = match key {
        "innerTubeCookie" => &mut credentials.inner_tube_cookie,
        "visitorData" => &mut credentials.visitor_data,
        "dataSyncId" => &mut credentials.data_sync_id,
        "accountName" => &mut credentials.account_name,
        "accountEmail" => &mut credentials.account_email,
        "accountChannelHandle" => &mut credentials.account_channel_handle,
        "accountImageUrl" => &mut credentials.account_image_url,
        "lastFmSessionKey" => &mut credentials.last_fm_session_key,
        "lastFmUsername" => &mut credentials.last_fm_username,
        "discordToken" => &mut credentials.discord_token,
        "discordUsername" => &mut credentials.discord_username,
        "discordName" => &mut credentials.discord_name,
        "discordAvatarUrl" => &mut credentials.discord_avatar_url,
        "spotifyAccessToken" => &mut credentials.spotify_access_token,
        "spotifyRefreshToken" => &mut credentials.spotify_refresh_token,
        "proxyUrl" => &mut credentials.proxy_url,
        "proxyUsername" => &mut credentials.proxy_username,
        "proxyPassword" => &mut credentials.proxy_password,
        _ => return None,
    };
    Some(value)
}

/// Serialized blob, or `None` when no account value is set.
pub fn encode_accounts(credentials: &AccountCredentials) -> Result<Option<Vec<u8>>> {
    let mut blob = serde_json::Map::new();
    for key in ACCOUNT_KEYS {
        let Some(value) = field(credentials, key) else {
            continue;
        };
        if value.trim().is_empty() || (*key == "proxyUrl" && value == PROXY_URL_PLACEHOLDER) {
            continue;
        }
        blob.insert(
            key.to_string(),
            serde_json::Value::String(STANDARD.encode(value.as_bytes())),
        );
    }

    if blob.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_vec(&blob)?))
}

/// Decode a blob into plain values.
///
/// Blank values are dropped. A value that is not valid base64 (or not UTF-8
/// once decoded) is kept verbatim.
pub fn decode_accounts(raw: &str) -> Result<BTreeMap<String, String>> {
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let blob: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)?;
    let mut decoded = BTreeMap::new();
    for (key, value) in blob {
        let encoded = match &value {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Null => continue,
            other => other.to_string(),
        };
        if encoded.is_empty() {
            continue;
        }
        let plain = STANDARD
            .decode(encoded.as_bytes())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or(encoded);
        decoded.insert(key, plain);
    }
    Ok(decoded)
}

/// Overlay decoded values onto `current`. Keys absent from `decoded` keep
/// their current value.
pub fn apply_accounts(
    mut current: AccountCredentials,
    decoded: &BTreeMap<String, String>,
) -> AccountCredentials {
    for (key, value) in decoded {
        if let Some(slot) = field_mut(&mut current, key) {
            *slot = value.clone();
        }
    }

    if let Some(session_key) = decoded.get("lastFmSessionKey") {
        current.last_fm_enabled = !session_key.trim().is_empty();
    }
    if let Some(proxy_url) = decoded.get("proxyUrl") {
        current.proxy_enabled = !proxy_url.trim().is_empty();
    }
    current
}
