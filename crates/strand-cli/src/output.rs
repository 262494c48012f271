//! Report printing.
//!
//! The last line of every run is a tag that scripts can match on.

use strand_search::{SearchReport, Violation};

/// No property was violated.
pub const TAG_OK: &str = "[STRAND:OK]";

/// Prefix of the tag naming the first violated property.
pub const TAG_VIOLATION_PREFIX: &str = "[STRAND:VIOLATION:";

pub fn format_violation_tag(property: &str) -> String {
    format!("{}{}]", TAG_VIOLATION_PREFIX, property)
}

pub fn format_trail(v: &Violation) -> Vec<String> {
    v.trail
        .iter()
        .enumerate()
        .map(|(i, r)| format!("  #{:<3} {:<20} {:?} ({}/{})", i, r.cg_id, r.choice, r.index + 1, r.total))
        .collect()
}

pub fn format_report(report: &SearchReport, show_trails: bool) -> Vec<String> {
    let s = &report.stats;
    let mut lines = vec![
        format!("search:      {}", report.strategy),
        format!(
            "states:      {} new, {} revisited, {} end",
            s.new_states, s.revisited_states, s.end_states
        ),
        format!(
            "transitions: {} (max depth {}, {} paths)",
            s.transitions, s.max_depth, s.paths
        ),
        format!(
            "moves:       {} backtracks, {} restores, {} constraint hits",
            s.backtracks, s.restores, s.constraint_hits
        ),
    ];
    for v in &report.violations {
        lines.push(format!("violation:   {}", v));
        if show_trails {
            lines.extend(format_trail(v));
        }
    }
    lines.push(match report.violations.first() {
        None => TAG_OK.to_string(),
        Some(v) => format_violation_tag(&v.property),
    });
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use strand_search::SearchStats;

    #[test]
    fn test_tags() {
        let mut report = SearchReport {
            strategy: "dfs",
            stats: SearchStats::default(),
            violations: Vec::new(),
        };
        assert_eq!(format_report(&report, true).last().map(String::as_str), Some(TAG_OK));

        report.violations.push(Violation {
            property: "not-deadlocked".to_string(),
            message: "T1 blocked".to_string(),
            trail: Vec::new(),
        });
        let lines = format_report(&report, true);
        assert_eq!(lines.last().unwrap(), "[STRAND:VIOLATION:not-deadlocked]");
        assert_eq!(lines[lines.len() - 2], "violation:   not-deadlocked: T1 blocked (depth 0)");
    }
}
