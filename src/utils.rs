/// `12d ago`, `today`, or `-` when unknown.
pub fn fmt_age(days: Option<i64>) -> String {
    match days {
        None => "-".to_string(),
        Some(d) if d <= 0 => "today".to_string(),
        Some(d) => format!("{d}d ago"),
    }
}

pub fn fmt_pct(part: u64, total: u64) -> String {
    if total == 0 {
        return "-".to_string();
    }
    format!("{:>5.1}%", 100.0 * part as f64 / total as f64)
}

/// First 8 characters of a commit id.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats() {
        assert_eq!(fmt_age(None), "-");
        assert_eq!(fmt_age(Some(0)), "today");
        assert_eq!(fmt_age(Some(12)), "12d ago");
        assert_eq!(fmt_pct(1, 4), " 25.0%");
        assert_eq!(fmt_pct(1, 0), "-");
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
