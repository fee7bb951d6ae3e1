//! Canonical path normalization.

/// Normalizes a store path for comparison.
///
/// Lowercases the path and ensures a single leading slash. Listings may
/// report paths with server-chosen casing; the engine and watcher compare
/// normalized forms only.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_start_matches('/');
    let mut out = String::with_capacity(trimmed.len() + 1);
    out.push('/');
    out.push_str(&trimmed.to_lowercase());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_roots() {
        assert_eq!(normalize_path("/Notes.TXT"), "/notes.txt");
        assert_eq!(normalize_path("notes.txt"), "/notes.txt");
        assert_eq!(normalize_path("//notes.txt"), "/notes.txt");
        assert_eq!(normalize_path("  /notes.txt  "), "/notes.txt");
    }

    #[test]
    fn idempotent() {
        let once = normalize_path("/A/B.txt");
        assert_eq!(normalize_path(&once), once);
    }
}
