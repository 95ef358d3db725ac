//! Naming helpers for tasks and their stored artifacts.

use crate::types::Timestamp;

/// Default display name for a task submitted without one.
pub fn default_task_name(now: Timestamp) -> String {
    format!("task_{}", now.format("%Y%m%d_%H%M%S"))
}

/// `YYYY/MM` sub-directory used to shard stored artifacts by month.
pub fn year_month_subpath(now: Timestamp) -> String {
    now.format("%Y/%m").to_string()
}

/// First `len` characters of a hex digest (the whole digest if shorter).
pub fn short_hash(hash: &str, len: usize) -> &str {
    hash.get(..len).unwrap_or(hash)
}

/// Build a public URL for a stored artifact path.
///
/// Paths are stored as written by the artifact store, e.g.
/// `static\hunyuan\2026\02\abc.glb` on Windows hosts or
/// `static/hunyuan/2026/02/abc.glb` elsewhere. Everything up to and
/// including the `static/<provider>/` segment is stripped and the rest is
/// appended to `{base_url}/{provider}/`.
pub fn public_file_url(base_url: &str, provider: &str, path: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }

    let normalized = path.replace('\\', "/");
    let marker = format!("static/{provider}/");
    let relative = match normalized.find(&marker) {
        Some(idx) => &normalized[idx + marker.len()..],
        None => normalized.as_str(),
    };

    Some(format!(
        "{}/{provider}/{}",
        base_url.trim_end_matches('/'),
        relative.trim_start_matches('/')
    ))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed_time() -> Timestamp {
        chrono::Utc.with_ymd_and_hms(2026, 2, 7, 9, 5, 3).unwrap()
    }

    #[test]
    fn default_name_uses_compact_timestamp() {
        assert_eq!(default_task_name(fixed_time()), "task_20260207_090503");
    }

    #[test]
    fn subpath_is_zero_padded() {
        assert_eq!(year_month_subpath(fixed_time()), "2026/02");
    }

    #[test]
    fn short_hash_handles_short_input() {
        assert_eq!(short_hash("abcdef", 4), "abcd");
        assert_eq!(short_hash("ab", 4), "ab");
    }

    #[test]
    fn file_url_strips_static_prefix_with_backslashes() {
        let url = public_file_url(
            "http://10.0.0.5:8080/",
            "hunyuan",
            "static\\hunyuan\\2026\\02\\abc.glb",
        );
        assert_eq!(url.as_deref(), Some("http://10.0.0.5:8080/hunyuan/2026/02/abc.glb"));
    }

    #[test]
    fn file_url_keeps_unknown_layout() {
        let url = public_file_url("http://host", "meshy", "/mnt/nas/meshy/t1_abcd.glb");
        assert_eq!(url.as_deref(), Some("http://host/meshy/mnt/nas/meshy/t1_abcd.glb"));
    }

    #[test]
    fn empty_path_has_no_url() {
        assert_eq!(public_file_url("http://host", "meshy", ""), None);
    }
}
