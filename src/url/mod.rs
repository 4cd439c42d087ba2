//! URL handling module for Sumi-Chronicle
//!
//! This module provides URL canonicalization and the content-derived identity
//! digest every archived item is keyed by.

mod normalize;

use sha2::{Digest, Sha256};
use url::Url;

// Re-export main functions
pub use normalize::canonicalize_url;

/// Computes the identity digest of a canonical URL
///
/// The digest is the hex-encoded SHA-256 of the canonical URL string. Callers
/// must pass a URL that already went through [`canonicalize_url`], otherwise two
/// spellings of the same item would receive different identities.
///
/// # Examples
///
/// ```
/// use sumi_chronicle::url::{canonicalize_url, identity_hash};
///
/// let a = canonicalize_url("https://www.example.com/2015/03/post.html?m=1").unwrap();
/// let b = canonicalize_url("https://example.com/2015/03/post.html").unwrap();
/// assert_eq!(identity_hash(&a), identity_hash(&b));
/// assert_eq!(identity_hash(&a).len(), 64);
/// ```
pub fn identity_hash(canonical: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

/// Returns the robots.txt URL for the origin of `url`
pub fn robots_url(url: &Url) -> Option<Url> {
    url.host_str()?;
    url.join("/robots.txt").ok()
}
