//! Sample identifiers
//!
//! An identifier is a namespaced string such as `GP.83693`, optionally
//! carried under a URI (`http://id.luomus.fi/GP.83693`). The short form is
//! whatever follows the last `/`.

pub mod ocr_text;
pub mod resolver;

pub use resolver::{resolve, Resolution};

/// Identifier with any URI prefix removed
pub fn short_form(identifier: &str) -> &str {
    match identifier.rfind('/') {
        Some(pos) => &identifier[pos + 1..],
        None => identifier,
    }
}

/// URI prefix of an identifier, up to and including the last `/`
pub fn prefix(identifier: &str) -> Option<&str> {
    identifier.rfind('/').map(|pos| &identifier[..=pos])
}

/// An identifier is well formed when it has no prefix, or its prefix is
/// one of the allowed URI prefixes.
pub fn is_well_formed(identifier: &str, allowed_prefixes: &[String]) -> bool {
    match prefix(identifier) {
        None => true,
        Some(p) => allowed_prefixes.iter().any(|allowed| allowed == p),
    }
}
