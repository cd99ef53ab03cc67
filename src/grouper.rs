use std::{collections::HashMap, ops::Range};

use tracing::{debug, warn};

use crate::{
    config::TestOptions,
    types::{Cases, Group, ListKind, NamedProbe, StepCase, TestCaseRecord, TestList},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grouping {
    pub groups: Vec<Group>,
    /// Lists whose first record carried neither steps nor texts.
    pub dropped: Vec<String>,
}

/// Remaining window over a list's cases while it is being paged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListCursor {
    offset: usize,
    remaining: usize,
}

impl ListCursor {
    pub fn new(len: usize) -> Self {
        Self {
            offset: 0,
            remaining: len,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    pub fn advance(&mut self, count: usize) -> Range<usize> {
        let count = count.min(self.remaining);
        let range = self.offset..self.offset + count;
        self.offset += count;
        self.remaining -= count;
        range
    }
}

/// Buckets records by list name in first-seen order and decides each list's kind
/// from its first record.
pub fn collect_lists(records: Vec<TestCaseRecord>) -> (Vec<TestList>, Vec<String>) {
    let mut buckets: Vec<(String, Vec<TestCaseRecord>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        match index.get(&record.list) {
            Some(&i) => buckets[i].1.push(record),
            None => {
                index.insert(record.list.clone(), buckets.len());
                buckets.push((record.list.clone(), vec![record]));
            }
        }
    }

    let mut lists = Vec::new();
    let mut dropped = Vec::new();

    for (id, (name, records)) in buckets.into_iter().enumerate() {
        let kind = match records.first() {
            Some(first) if first.texts.is_some() => ListKind::Texts,
            Some(first) if first.steps.is_some() => ListKind::Steps,
            _ => {
                warn!(list = %name, "dropping list without steps or texts");
                dropped.push(name);
                continue;
            }
        };

        let cases = match kind {
            ListKind::Steps => Cases::Steps(
                records
                    .into_iter()
                    .filter_map(|record| match record.steps {
                        Some(steps) => Some(StepCase {
                            list: record.list,
                            name: record.name,
                            steps,
                        }),
                        None => {
                            warn!(list = %name, case = %record.name, "skipping case without steps in a steps list");
                            None
                        }
                    })
                    .collect(),
            ),
            ListKind::Texts => Cases::Texts(
                records
                    .into_iter()
                    .flat_map(|record| {
                        if record.texts.is_none() {
                            warn!(list = %name, case = %record.name, "skipping case without texts in a texts list");
                        }
                        let case_name = record.name;
                        record
                            .texts
                            .unwrap_or_default()
                            .into_iter()
                            .map(move |probe| NamedProbe {
                                name: case_name.clone(),
                                probe,
                            })
                    })
                    .collect(),
            ),
        };

        lists.push(TestList { id, name, cases });
    }

    (lists, dropped)
}

/// Pages every list into groups.
///
/// The first group of the whole run is half the configured size. Steps lists cut
/// their pages around cases that are longer than the page itself.
pub fn build_groups(records: Vec<TestCaseRecord>, options: &TestOptions) -> Grouping {
    let (lists, dropped) = collect_lists(records);
    let mut groups = Vec::new();
    let mut first_group = true;

    for list in &lists {
        let configured = match list.cases.kind() {
            ListKind::Steps => options.step_cases_per_step,
            ListKind::Texts => options.text_cases_per_step,
        }
        .max(1);

        let mut cursor = ListCursor::new(list.cases.len());
        while !cursor.is_exhausted() {
            let lim = if first_group {
                configured.div_ceil(2)
            } else {
                configured
            };
            first_group = false;

            let size = match &list.cases {
                Cases::Steps(cases) => long_case_cut(&cases[cursor.offset()..], lim, configured),
                Cases::Texts(_) => lim,
            };
            let range = cursor.advance(size);

            let cases = match &list.cases {
                Cases::Steps(cases) => Cases::Steps(cases[range].to_vec()),
                Cases::Texts(probes) => Cases::Texts(probes[range].to_vec()),
            };

            debug!(list = %list.name, size = cases.len(), "built group");
            groups.push(Group {
                list_id: list.id,
                list: list.name.clone(),
                cases,
            });
        }
    }

    Grouping { groups, dropped }
}

fn long_case_cut(remaining: &[StepCase], lim: usize, configured: usize) -> usize {
    let window = remaining.len().min(lim);
    let half = configured as f64 / 2.0;

    match remaining[..window]
        .iter()
        .position(|case| case.steps.len() > lim)
    {
        Some(i) if (i as f64) < half => i + 1,
        Some(i) => i.max(1),
        None => lim,
    }
}
