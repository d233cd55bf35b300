#![forbid(unsafe_code)]

pub mod table;

use time::OffsetDateTime;
use time::macros::format_description;

/// Short calendar date as shown next to each task, e.g. `Jan 5, 2026`.
#[must_use]
pub fn format_date(dt: OffsetDateTime) -> String {
    let fmt = format_description!("[month repr:short] [day padding:none], [year]");
    dt.format(fmt).unwrap_or_else(|_| "-".to_owned())
}

#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    let mut out: String = s.chars().take(max).collect();
    if s.chars().count() > max {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn dates_render_like_the_list_view() {
        assert_eq!(format_date(datetime!(2026-01-05 23:59 UTC)), "Jan 5, 2026");
        assert_eq!(format_date(datetime!(2024-11-30 00:00 UTC)), "Nov 30, 2024");
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer line", 6), "a long…");
    }
}
