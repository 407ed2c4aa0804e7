//! Protocol-URI handling for `roblox-player:` / `roblox-studio:` launches.
//!
//! The URI body is a `+`-separated list of `key:value` fragments. Only the
//! `channel` key is interpreted here.

use tracing::warn;

/// Prefix shared by every registered protocol-URI invocation.
pub const PROTOCOL_PREFIX: &str = "roblox-";

/// Whether the invocation arguments are a single protocol URI.
#[must_use]
pub fn is_protocol_invocation(args: &[String]) -> bool {
    matches!(args, [only] if only.starts_with(PROTOCOL_PREFIX))
}

/// Extract the requested channel from a protocol URI.
///
/// Every fragment that splits into exactly `channel` and a non-empty value
/// is a candidate; the last one wins. Returns `None` when no fragment
/// qualifies.
#[must_use]
pub fn requested_channel(uri: &str) -> Option<&str> {
    uri.split('+')
        .filter_map(|fragment| {
            let mut parts = fragment.split(':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some("channel"), Some(value), None) if !value.is_empty() => Some(value),
                _ => None,
            }
        })
        .last()
}

/// Apply a protocol URI's channel request to `channel`.
///
/// Returns `true` if the channel was changed.
pub fn apply_channel_override(uri: &str, channel: &mut String) -> bool {
    let Some(requested) = requested_channel(uri) else {
        return false;
    };
    warn!(channel = requested, "protocol URI requested a user channel, changing");
    requested.clone_into(channel);
    true
}
