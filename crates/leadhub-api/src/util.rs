use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

/// Normalize a phone number to bare digits with country code.
/// Accepts the usual operator input (`+52 1 55 1234 5678`, `55-1234-5678`);
/// rejects anything outside 8-15 digits.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if (8..=15).contains(&digits.len()) {
        Some(digits)
    } else {
        None
    }
}

/// Render a campaign message template for one recipient.
/// Supported placeholders: `{{nombre}}`, `{{telefono}}`.
pub fn render_template(template: &str, name: &str, phone: &str) -> String {
    template
        .replace("{{nombre}}", name)
        .replace("{{telefono}}", phone)
}

/// Parse a timestamp column. SQLite's `datetime('now')` default stores
/// "YYYY-MM-DD HH:MM:SS" without timezone; rows written by the hub itself
/// carry RFC 3339.
pub fn parse_sqlite_ts(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_operator_input() {
        assert_eq!(
            normalize_phone("+52 1 55 1234 5678").as_deref(),
            Some("5215512345678")
        );
        assert_eq!(normalize_phone("55-1234-5678").as_deref(), Some("5512345678"));
    }

    #[test]
    fn rejects_junk_phones() {
        assert!(normalize_phone("").is_none());
        assert!(normalize_phone("12345").is_none());
        assert!(normalize_phone("not a phone").is_none());
        assert!(normalize_phone("1234567890123456").is_none());
    }

    #[test]
    fn renders_both_placeholders() {
        let out = render_template(
            "Hola {{nombre}}! Confirma al {{telefono}}.",
            "Ana",
            "5215512345678",
        );
        assert_eq!(out, "Hola Ana! Confirma al 5215512345678.");
    }

    #[test]
    fn template_without_placeholders_is_untouched() {
        assert_eq!(render_template("Promo 2x1 hoy", "Ana", "55"), "Promo 2x1 hoy");
    }

    #[test]
    fn parses_both_timestamp_formats() {
        let sqlite = parse_sqlite_ts("2026-08-07 12:30:00");
        assert_eq!(sqlite.to_rfc3339(), "2026-08-07T12:30:00+00:00");

        let rfc = parse_sqlite_ts("2026-08-07T12:30:00+00:00");
        assert_eq!(rfc, sqlite);
    }
}
