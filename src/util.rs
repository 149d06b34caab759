//! Small helpers shared across modules.

use std::borrow::Cow;

use chrono::{DateTime, Local};

/// Expand a leading `~` to `$HOME`.
///
/// - `"~"` → `"/home/user"`
/// - `"~/foo"` → `"/home/user/foo"`
/// - Anything else passes through unchanged.
pub fn expand_tilde(path: &str) -> Cow<'_, str> {
    if path == "~" || path.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            if path == "~" {
                return Cow::Owned(home);
            }
            return Cow::Owned(format!("{}{}", home, &path[1..]));
        }
    }
    Cow::Borrowed(path)
}

/// Fresh 32-char hex identifier used as a row primary key.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Milliseconds since the Unix epoch.
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Render a millisecond timestamp as `YYYY-MM-DD HH:MM:SS` in local time.
pub fn datetime_format(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde_passthrough() {
        assert_eq!(expand_tilde("/var/lib/kbserve"), "/var/lib/kbserve");
        assert_eq!(expand_tilde("relative/~/x"), "relative/~/x");
    }

    #[test]
    fn test_new_id_shape() {
        let id = new_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_id());
    }

    #[test]
    fn test_datetime_format_shape() {
        let s = datetime_format(current_timestamp());
        assert_eq!(s.len(), 19);
        assert_eq!(&s[4..5], "-");
        assert_eq!(&s[13..14], ":");
    }
}
