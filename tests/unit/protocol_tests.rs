//! Unit tests for protocol-URI detection and channel overrides.

use cellar::launcher::protocol::{
    apply_channel_override, is_protocol_invocation, requested_channel,
};

const PLAYER_URI: &str = "roblox-player:1+launchmode:play+gameinfo:abc+launchtime:1700000000";

#[test]
fn single_protocol_argument_is_an_invocation() {
    assert!(is_protocol_invocation(&[PLAYER_URI.to_owned()]));
    assert!(is_protocol_invocation(&["roblox-studio:1+launchmode:edit".to_owned()]));
}

#[test]
fn plain_arguments_are_not_an_invocation() {
    assert!(!is_protocol_invocation(&[]));
    assert!(!is_protocol_invocation(&["-ide".to_owned()]));
    assert!(!is_protocol_invocation(&[
        PLAYER_URI.to_owned(),
        "extra".to_owned()
    ]));
}

#[test]
fn uri_without_channel_requests_nothing() {
    assert_eq!(requested_channel(PLAYER_URI), None);
}

#[test]
fn channel_fragment_is_extracted() {
    let uri = format!("{PLAYER_URI}+channel:zcanary");
    assert_eq!(requested_channel(&uri), Some("zcanary"));
}

#[test]
fn last_channel_fragment_wins() {
    let uri = "roblox-player:1+channel:first+launchmode:play+channel:second";
    assert_eq!(requested_channel(uri), Some("second"));
}

#[test]
fn malformed_channel_fragments_are_ignored() {
    assert_eq!(requested_channel("roblox-player:1+channel:"), None);
    assert_eq!(requested_channel("roblox-player:1+channel"), None);
    assert_eq!(requested_channel("roblox-player:1+channel:a:b"), None);
    assert_eq!(
        requested_channel("roblox-player:1+channel:a:b+channel:ok"),
        Some("ok")
    );
}

#[test]
fn override_replaces_configured_channel() {
    let mut channel = "zlive".to_owned();
    assert!(apply_channel_override(
        "roblox-player:1+channel:zintegration",
        &mut channel
    ));
    assert_eq!(channel, "zintegration");
}

#[test]
fn malformed_uri_leaves_channel_unchanged() {
    let mut channel = "zlive".to_owned();
    assert!(!apply_channel_override("roblox-player:1+channel:", &mut channel));
    assert_eq!(channel, "zlive");
}
