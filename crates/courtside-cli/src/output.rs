use chrono::{DateTime, Utc};

#[derive(Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Shorten to at most `max_chars` characters, marking the cut with "..."
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate_string("Knie", 10), "Knie");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_string("Kühlen und hochlagern", 8), "Kühle...");
    }

    #[test]
    fn timestamp_is_minute_precision() {
        let dt = DateTime::parse_from_rfc3339("2024-03-01T12:34:56Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(&dt), "2024-03-01 12:34");
    }
}
