/// Replace the user part of a Stratum worker identity.
///
/// Identities look like `<user>[.<suffix>]`. The string is split on the first
/// `.` only, so everything after it (including further dots) is kept as the
/// suffix. Without a dot the whole identity becomes `replacement`.
///
/// ```rust
/// use credential_rewrite::rewrite_identity;
///
/// assert_eq!(rewrite_identity("alice.rig1", "bob"), "bob.rig1");
/// assert_eq!(rewrite_identity("alice", "bob"), "bob");
/// ```
pub fn rewrite_identity(identity: &str, replacement: &str) -> String {
    match identity.split_once('.') {
        Some((_, suffix)) => format!("{replacement}.{suffix}"),
        None => replacement.to_string(),
    }
}
