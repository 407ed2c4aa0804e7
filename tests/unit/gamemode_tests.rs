//! Unit tests for `GameMode` portal error interpretation.

use cellar::integrations::gamemode::is_unavailable;

#[test]
fn missing_portal_is_unavailable() {
    let stderr = "Error: GDBus.Error:org.freedesktop.DBus.Error.ServiceUnknown: \
                  The name org.freedesktop.portal.Desktop was not provided by any .service files";
    assert!(is_unavailable(stderr));
    assert!(is_unavailable(
        "GDBus.Error:org.freedesktop.DBus.Error.UnknownMethod: No such interface"
    ));
}

#[test]
fn other_failures_are_errors() {
    assert!(!is_unavailable(
        "GDBus.Error:org.freedesktop.DBus.Error.AccessDenied: not allowed"
    ));
    assert!(!is_unavailable(""));
}
