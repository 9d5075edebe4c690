use crate::domain::stats::{FileRecord, RepositoryStat};
use crate::utils::{fmt_age, fmt_pct, short_id};
use comfy_table::{presets::UTF8_HORIZONTAL_ONLY, Table};

fn table(header: Vec<&str>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_HORIZONTAL_ONLY).set_header(header);
    t
}

/// Ranked contributors, first `limit` rows.
pub fn contributors(stat: &RepositoryStat, limit: usize) -> String {
    let total = stat.total_lines();
    let mut t = table(vec![
        "#", "Contributor", "Lines", "Share", "Code", "Docs", "Tests", "Other", "Last 3m",
        "Last year", "Last commit",
    ]);
    for (i, c) in stat.contributors.iter().take(limit).enumerate() {
        let all = c.lines.combined();
        let who = match &c.username {
            Some(name) => format!("{name} <{}>", c.email),
            None => c.email.clone(),
        };
        t.add_row(vec![
            (i + 1).to_string(),
            who,
            all.total.to_string(),
            fmt_pct(all.total, total),
            c.lines.code.total.to_string(),
            c.lines.docs.total.to_string(),
            c.lines.tests.total.to_string(),
            c.lines.resources.total.to_string(),
            all.last_3_month.to_string(),
            all.last_year.to_string(),
            fmt_age(c.commit_days),
        ]);
    }
    t.to_string()
}

/// Code/docs/tests/other split of the whole repository.
pub fn summary(stat: &RepositoryStat) -> String {
    let total = stat.total_lines();
    let mut t = table(vec!["Kind", "Lines", "Share", "Last month", "Last 6m", "Last year"]);
    for (kind, s) in [
        ("Code", &stat.lines.code),
        ("Docs", &stat.lines.docs),
        ("Tests", &stat.lines.tests),
        ("Other", &stat.lines.resources),
    ] {
        t.add_row(vec![
            kind.to_string(),
            s.total.to_string(),
            format!("{:>3}%", s.percent(total)),
            s.last_month.to_string(),
            s.last_6_month.to_string(),
            s.last_year.to_string(),
        ]);
    }
    t.to_string()
}

/// Contributors of one file, most lines first.
pub fn file(record: &FileRecord) -> String {
    let mut users: Vec<_> = record.users.iter().collect();
    users.sort_by(|a, b| {
        b.1.lines
            .total_lines()
            .cmp(&a.1.lines.total_lines())
            .then_with(|| a.0.cmp(b.0))
    });

    let mut t = table(vec!["Contributor", "Lines", "Share", "Code", "Docs", "Tests", "Other", "Commit"]);
    for (email, u) in users {
        let lines = u.lines.total_lines();
        let commit = u
            .commit
            .as_ref()
            .map(|c| format!("{} ({})", short_id(&c.id), fmt_age(Some(c.days))))
            .unwrap_or_else(|| "-".to_string());
        t.add_row(vec![
            email.clone(),
            lines.to_string(),
            fmt_pct(lines, record.total_lines),
            u.lines.code.total.to_string(),
            u.lines.docs.total.to_string(),
            u.lines.tests.total.to_string(),
            u.lines.resources.total.to_string(),
            commit,
        ]);
    }
    t.to_string()
}
