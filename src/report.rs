use std::fmt::Write as _;

use crate::types::{CaseResult, ListTally, RunReport};

/// Accumulates case results into report sections and per-list tallies.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    output: String,
    tallies: Vec<(String, ListTally)>,
    current: Option<String>,
    passed: usize,
    failed: usize,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new section when the list changes.
    pub fn enter_list(&mut self, list: &str) {
        if self.current.as_deref() == Some(list) {
            return;
        }
        if !self.output.is_empty() {
            self.output.push('\n');
        }
        let _ = writeln!(self.output, "== {list} ==");
        self.current = Some(list.to_string());
        self.tallies.push((list.to_string(), ListTally::default()));
    }

    pub fn record(&mut self, result: CaseResult) {
        let tally = match self.tallies.last_mut() {
            Some((_, tally)) => tally,
            None => return,
        };
        if result.ok {
            tally.passed += 1;
            self.passed += 1;
        } else {
            tally.failed += 1;
            self.failed += 1;
        }
        self.output.push_str(&result.output);
        self.output.push('\n');
    }

    pub fn abort(&mut self, message: impl std::fmt::Display) {
        let _ = writeln!(self.output, "Bot test failed: {message}");
    }

    pub fn tallies(&self) -> &[(String, ListTally)] {
        &self.tallies
    }

    /// Closes the report. `skipped` is counted against the number of selected
    /// groups, not leaf cases, so a texts group yielding one aggregate result
    /// contributes no skips.
    pub fn finish(
        self,
        total: usize,
        groups: usize,
        step: Option<usize>,
        step_count: usize,
    ) -> (RunReport, Vec<(String, ListTally)>) {
        let skipped = groups.saturating_sub(self.passed + self.failed);
        let summary_output = render_summary(
            step.is_none(),
            self.passed,
            self.failed,
            skipped,
            &self.tallies,
        );
        let report = RunReport {
            output: self.output,
            summary_output,
            total,
            passed: self.passed,
            failed: self.failed,
            skipped,
            step,
            step_count,
        };
        (report, self.tallies)
    }
}

pub fn render_summary(
    with_totals: bool,
    passed: usize,
    failed: usize,
    skipped: usize,
    tallies: &[(String, ListTally)],
) -> String {
    let mut summary = String::new();
    if with_totals {
        let _ = writeln!(summary, "PASSED: {passed}, FAILED: {failed}, SKIPPED: {skipped}");
    }
    for (list, tally) in tallies {
        let mark = if tally.failed > 0 { "✗" } else { "✓" };
        let _ = writeln!(summary, "{mark} {list}: (✓: {}, ✗: {})", tally.passed, tally.failed);
    }
    summary
}

/// Adds `tally` to the entry for `list`, keeping first-seen order.
pub fn merge_tally(tallies: &mut Vec<(String, ListTally)>, list: &str, tally: ListTally) {
    match tallies.iter_mut().find(|(name, _)| name == list) {
        Some((_, existing)) => {
            existing.passed += tally.passed;
            existing.failed += tally.failed;
        }
        None => tallies.push((list.to_string(), tally)),
    }
}
