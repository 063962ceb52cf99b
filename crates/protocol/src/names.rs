//! Validation for usernames and logical filenames.
//!
//! Both identifiers end up interpolated into backend paths and staging file
//! names, so they must be a single safe path component: no separators, no
//! traversal, no shell metacharacters.

/// Error returned for an identifier that is not a safe path component.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {detail}")]
pub struct InvalidName {
    pub kind: &'static str,
    pub detail: String,
}

/// Validates a username or filename as a single path component.
///
/// Accepts ASCII alphanumerics plus `.`, `-` and `_`. Rejects empty names,
/// `.` and `..`, and a leading `-` (which a CLI backend would read as a
/// flag).
pub fn validate_name(kind: &'static str, name: &str) -> Result<(), InvalidName> {
    let fail = |detail: String| Err(InvalidName { kind, detail });

    if name.is_empty() {
        return fail("empty".into());
    }
    if name == "." || name == ".." {
        return fail(format!("reserved name {name:?}"));
    }
    if name.starts_with('-') {
        return fail(format!("leading dash in {name:?}"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
    {
        return fail(format!("character {c:?} in {name:?}"));
    }
    Ok(())
}
