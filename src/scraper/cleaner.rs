use crate::error::ExtractionError;
use chrono::NaiveDateTime;

/// Site rendering of match timestamps: "3/7/2017 9:05:11 PM".
pub const PLAYED_AT_FORMAT: &str = "%-m/%-d/%Y %-I:%M:%S %p";

// ── Cell parsers ──────────────────────────────────────────────────────────────

/// Parse an integer cell.
/// "2315" → 2315 | "(12)" → 12 | "  42 pts" → 42 | "N/A" → error
///
/// One leading '(' is dropped; the leading digit run is parsed and anything
/// after it is ignored.
pub fn parse_cell_int(s: &str) -> Result<i64, ExtractionError> {
    let trimmed = s.trim();
    let body = trimmed.strip_prefix('(').unwrap_or(trimmed);

    let digits_end = body
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(body.len());

    if digits_end == 0 {
        return Err(ExtractionError::BadNumber(trimmed.to_string()));
    }

    body[..digits_end]
        .parse()
        .map_err(|_| ExtractionError::BadNumber(trimmed.to_string()))
}

pub fn parse_played_at(s: &str) -> Result<NaiveDateTime, ExtractionError> {
    let s = normalise_text(s);
    NaiveDateTime::parse_from_str(&s, PLAYED_AT_FORMAT).map_err(|e| {
        ExtractionError::BadTimestamp {
            raw: s.clone(),
            reason: e.to_string(),
        }
    })
}

#[cfg(test)]
pub fn format_played_at(t: &NaiveDateTime) -> String {
    t.format(PLAYED_AT_FORMAT).to_string()
}

/// Pull the numeric `PlayerID=` value out of a profile link.
/// "/Player/Profile?PlayerID=1234&x=y" → 1234
pub fn player_id_from_href(href: &str) -> Option<i64> {
    let (_, rest) = href.split_once("PlayerID=")?;
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Decode the two entities the site emits and collapse whitespace.
pub fn normalise_text(s: &str) -> String {
    s.replace('\u{a0}', " ")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_cell_int() {
        assert_eq!(parse_cell_int("2315"), Ok(2315));
        assert_eq!(parse_cell_int("(12)"), Ok(12));
        assert_eq!(parse_cell_int("  42 pts"), Ok(42));
        assert_eq!(parse_cell_int("0"), Ok(0));
    }

    #[test]
    fn test_parse_cell_int_rejects_non_numeric() {
        assert!(matches!(parse_cell_int("N/A"), Err(ExtractionError::BadNumber(_))));
        assert!(matches!(parse_cell_int(""), Err(ExtractionError::BadNumber(_))));
        // only one paren is stripped
        assert!(matches!(parse_cell_int("((3))"), Err(ExtractionError::BadNumber(_))));
        assert!(matches!(parse_cell_int("-5"), Err(ExtractionError::BadNumber(_))));
    }

    #[test]
    fn test_played_at_round_trip() {
        let samples = [
            NaiveDate::from_ymd_opt(2017, 3, 7).unwrap().and_hms_opt(21, 5, 11).unwrap(),
            NaiveDate::from_ymd_opt(2016, 12, 31).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            NaiveDate::from_ymd_opt(2018, 1, 1).unwrap().and_hms_opt(12, 59, 59).unwrap(),
        ];
        for t in samples {
            assert_eq!(parse_played_at(&format_played_at(&t)), Ok(t));
        }
        assert_eq!(format_played_at(&samples[0]), "3/7/2017 9:05:11 PM");
    }

    #[test]
    fn test_parse_played_at_rejects_garbage() {
        assert!(matches!(
            parse_played_at("yesterday"),
            Err(ExtractionError::BadTimestamp { .. })
        ));
    }

    #[test]
    fn test_player_id_from_href() {
        assert_eq!(player_id_from_href("/Player/Profile?PlayerID=1234"), Some(1234));
        assert_eq!(player_id_from_href("Profile?PlayerID=77&Tab=2"), Some(77));
        assert_eq!(player_id_from_href("/Player/Profile?Name=x"), None);
    }

    #[test]
    fn test_normalise_text() {
        assert_eq!(normalise_text("  Foo&nbsp;Bar \n Baz "), "Foo Bar Baz");
        assert_eq!(normalise_text("Tom &amp; Jerry"), "Tom & Jerry");
    }
}
