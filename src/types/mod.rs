//! Data types for the configuration store
//!
//! These are the records routed by the gateway, appended to the WAL by the
//! command handler and materialized by the read model. A record is always
//! written whole: updates replace the previous copy.

mod project;
mod remote_source;
mod user;

pub use project::Project;
pub use remote_source::{RemoteSource, RemoteSourceAuthType, RemoteSourceType};
pub use user::{LinkedAccount, User};

/// Check if value is false (for skip_serializing_if)
pub fn is_false(val: &bool) -> bool {
    !*val
}

/// Validate an entity name.
///
/// Names start with an ASCII letter, contain only ASCII alphanumerics and
/// dashes, never end with a dash and never contain two dashes in a row.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }

    let mut prev_dash = false;
    for c in chars {
        if c == '-' {
            if prev_dash {
                return false;
            }
            prev_dash = true;
        } else if c.is_ascii_alphanumeric() {
            prev_dash = false;
        } else {
            return false;
        }
    }
    !prev_dash
}
