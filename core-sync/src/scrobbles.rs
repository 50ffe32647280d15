//! Legacy Last.fm offline queue
//!
//! Older mobile builds kept the pending-scrobble JSON inside a shared
//! preferences XML file:
//!
//! ```text
//! <?xml version='1.0' encoding='utf-8' standalone='yes' ?><map><string name="pending_scrobbles">[…]</string></map>
//! ```
//!
//! Backups carry that file so those builds can restore the queue.

/// Archive entry name.
pub const LEGACY_SCROBBLES_ENTRY: &str = "lastfm_offline.xml";

const PENDING_KEY: &str = "pending_scrobbles";

/// Wrap a pending-scrobble JSON payload. Returns `None` for an empty queue.
pub fn encode_pending_xml(pending_json: &str) -> Option<String> {
    let trimmed = pending_json.trim();
    if trimmed.is_empty() || trimmed == "[]" {
        return None;
    }

    Some(format!(
        "<?xml version='1.0' encoding='utf-8' standalone='yes' ?><map><string name=\"{}\">{}</string></map>",
        PENDING_KEY,
        escape(trimmed)
    ))
}

/// Pull the pending-scrobble JSON back out of the XML wrapper.
///
/// Malformed input yields `None`.
pub fn extract_pending_json(xml: &str) -> Option<String> {
    let mut rest = xml;
    while let Some(start) = rest.find("<string") {
        rest = &rest[start + "<string".len()..];
        let tag_end = rest.find('>')?;
        let attributes = &rest[..tag_end];
        if attributes.ends_with('/') {
            rest = &rest[tag_end + 1..];
            continue;
        }

        let body_start = tag_end + 1;
        let body_len = rest[body_start..].find("</string>")?;
        let body = &rest[body_start..body_start + body_len];
        rest = &rest[body_start + body_len..];

        if attribute(attributes, "name").as_deref() != Some(PENDING_KEY) {
            continue;
        }
        let value = unescape(body)?;
        let value = value.trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

/// Value of attribute `name`. The name must follow whitespace, so `name`
/// does not match inside `username`.
fn attribute(attributes: &str, name: &str) -> Option<String> {
    let needle = format!("{}=", name);
    let start = attributes
        .match_indices(needle.as_str())
        .map(|(index, _)| index)
        .find(|&index| attributes[..index].ends_with(char::is_whitespace))?
        + needle.len();
    let quoted = &attributes[start..];
    let quote = quoted.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let end = quoted[1..].find(quote)?;
    unescape(&quoted[1..1 + end])
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn unescape(value: &str) -> Option<String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let semi = rest.find(';')?;
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()?
                } else {
                    entity.strip_prefix('#')?.parse().ok()?
                };
                char::from_u32(code)?
            }
        };
        out.push(decoded);
        rest = &rest[semi + 1..];
    }
    out.push_str(rest);
    Some(out)
}
