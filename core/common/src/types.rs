//! Object key normalization shared by every adapter.
//!
//! User-supplied keys may start with `./` or `/` and may use backslashes as
//! separators. Adapters never use such keys directly; they go through
//! [`object_rel`] (backend object key) or [`object_abs`] (URL path under a
//! public domain). Both functions are idempotent.

/// Relative form of an object key: forward slashes only, no leading separator.
///
/// An empty key (or one made only of `.`/`/` prefixes) becomes `""`.
pub fn object_rel(key: &str) -> String {
    let key = key.replace('\\', "/");
    let mut rest = key.as_str();
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        } else {
            break;
        }
    }
    if rest == "." {
        rest = "";
    }
    rest.to_string()
}

/// Absolute form of an object key: exactly one leading `/`, forward slashes only.
pub fn object_abs(key: &str) -> String {
    format!("/{}", object_rel(key))
}
