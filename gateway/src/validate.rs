//! Syntax checks for identifiers on the pull surface

use camino::Utf8PathBuf;

/// Longest accepted registry namespace.
pub(crate) const MAX_NAMESPACE_LEN: usize = 64;

/// Check a repository name: one or more non-empty `/`-separated segments
/// of `[A-Za-z0-9._-]`, with `..` banned anywhere in the name.
pub(crate) fn valid_repository(repository: &str) -> bool {
    if repository.is_empty() || repository.contains("..") {
        return false;
    }

    repository
        .split('/')
        .all(|segment| !segment.is_empty() && segment.bytes().all(is_repository_byte))
}

fn is_repository_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-')
}

/// Check a manifest reference (tag or digest). References are opaque here;
/// only path traversal shapes are rejected.
pub(crate) fn valid_reference(reference: &str) -> bool {
    !reference.is_empty()
        && reference != "."
        && reference != ".."
        && !reference.contains('/')
        && !reference.contains('\\')
}

/// Check a registry namespace: `[A-Za-z0-9_-]`, at most
/// [`MAX_NAMESPACE_LEN`] bytes.
pub(crate) fn valid_namespace(namespace: &str) -> bool {
    !namespace.is_empty()
        && namespace.len() <= MAX_NAMESPACE_LEN
        && namespace
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-'))
}

/// Extract the hex portion of an `sha256:` digest, lowercased.
///
/// Returns `None` unless the digest is exactly `sha256:` followed by 64 hex
/// characters. Mixed-case hex is accepted and canonicalized.
pub(crate) fn digest_hex(digest: &str) -> Option<String> {
    let hex = digest.strip_prefix("sha256:")?;
    if hex.len() == 64 && hex.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        Some(hex.to_ascii_lowercase())
    } else {
        None
    }
}

/// Object key for a blob, sharded on the first two hex characters.
pub(crate) fn blob_object_key(hex: &str) -> Utf8PathBuf {
    format!("blobs/sha256/{}/{}", &hex[..2], hex).into()
}

/// Leading path segment of a repository name.
pub(crate) fn namespace_of(repository: &str) -> &str {
    repository
        .split_once('/')
        .map_or(repository, |(first, _)| first)
        .trim()
}
