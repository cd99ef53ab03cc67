use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    config::{TestOptions, TextMode},
    error::{BotTestError, GroupError, HarnessError},
    grouper::build_groups,
    harness::{AgentFactory, AgentReplica, Classifier, SnapshotRevision},
    report::{merge_tally, render_summary, ReportBuilder},
    source::SourceRegistry,
    steps::run_step_group,
    texts::{run_text_group, TextRunContext},
    types::{CaseResult, Cases, Group, ListTally, RunReport},
};

/// Process-lifetime cache of the agent replica under test.
pub struct ReplicaCache {
    factory: Arc<dyn AgentFactory>,
    replica: Mutex<Option<Arc<dyn AgentReplica>>>,
}

impl ReplicaCache {
    pub fn new(factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            factory,
            replica: Mutex::new(None),
        }
    }

    pub async fn get(&self) -> Result<Arc<dyn AgentReplica>, HarnessError> {
        let mut slot = self.replica.lock().await;
        if let Some(replica) = slot.as_ref() {
            return Ok(Arc::clone(replica));
        }
        info!("building agent replica");
        let replica = self.factory.create(SnapshotRevision::Unlimited).await?;
        *slot = Some(Arc::clone(&replica));
        Ok(replica)
    }

    pub async fn reset(&self) {
        self.replica.lock().await.take();
    }

    pub async fn is_cached(&self) -> bool {
        self.replica.lock().await.is_some()
    }
}

/// Runs paged conversation test suites against an agent replica.
pub struct BotTester {
    sources: SourceRegistry,
    replicas: ReplicaCache,
    classifier: Option<Arc<dyn Classifier>>,
    options: TestOptions,
}

struct PageOutcome {
    report: RunReport,
    tallies: Vec<(String, ListTally)>,
    aborted: bool,
}

impl BotTester {
    pub fn new(sources: SourceRegistry, factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            sources,
            replicas: ReplicaCache::new(factory),
            classifier: None,
            options: TestOptions::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_options(mut self, options: TestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &TestOptions {
        &self.options
    }

    pub fn replica_cache(&self) -> &ReplicaCache {
        &self.replicas
    }

    /// Runs every group (`step` is `None`) or the single group at the 1-based `step`.
    ///
    /// Only configuration problems are returned as errors; failing groups end up
    /// in the report.
    pub async fn test(&self, step: Option<usize>, lang: Option<&str>) -> Result<RunReport, BotTestError> {
        Ok(self.run_page(step, lang).await?.report)
    }

    /// Walks every page in order the way an external step driver would, and
    /// merges the pages into one report.
    pub async fn test_all_steps(&self, lang: Option<&str>) -> Result<RunReport, BotTestError> {
        let mut merged = RunReport::default();
        let mut tallies: Vec<(String, ListTally)> = Vec::new();
        let mut step = 1;

        loop {
            let page = self.run_page(Some(step), lang).await?;
            merged.output.push_str(&page.report.output);
            merged.total += page.report.total;
            merged.passed += page.report.passed;
            merged.failed += page.report.failed;
            merged.skipped += page.report.skipped;
            merged.step_count = page.report.step_count;
            for (list, tally) in page.tallies {
                merge_tally(&mut tallies, &list, tally);
            }

            if page.aborted || step >= page.report.step_count {
                break;
            }
            step += 1;
        }

        merged.summary_output = render_summary(true, merged.passed, merged.failed, merged.skipped, &tallies);
        Ok(merged)
    }

    async fn run_page(&self, step: Option<usize>, lang: Option<&str>) -> Result<PageOutcome, BotTestError> {
        self.options.validate()?;
        let source = self.sources.resolve(lang)?;
        if step.map_or(true, |step| step <= 1) {
            self.replicas.reset().await;
        }

        let records = source.test_cases().await?;
        let grouping = build_groups(records, &self.options);
        let step_count = if step.is_some() { grouping.groups.len() } else { 1 };

        let selected: Vec<Group> = match step {
            None => grouping.groups,
            Some(step) => step
                .checked_sub(1)
                .and_then(|index| grouping.groups.into_iter().nth(index))
                .into_iter()
                .collect(),
        };
        let total: usize = selected.iter().map(Group::len).sum();
        info!(?step, step_count, groups = selected.len(), total, "running bot test");

        let mut builder = ReportBuilder::new();
        let mut aborted = false;
        for group in &selected {
            builder.enter_list(&group.list);
            match self.run_group(group, lang).await {
                Ok(results) => {
                    for result in results {
                        builder.record(result);
                    }
                }
                Err(error) => {
                    warn!(list = %group.list, %error, "bot test aborted");
                    builder.abort(&error);
                    aborted = true;
                    break;
                }
            }
        }

        let (report, tallies) = builder.finish(total, selected.len(), step, step_count);
        Ok(PageOutcome {
            report,
            tallies,
            aborted,
        })
    }

    async fn run_group(&self, group: &Group, lang: Option<&str>) -> Result<Vec<CaseResult>, GroupError> {
        match &group.cases {
            Cases::Steps(cases) => {
                let replica = self.replicas.get().await.map_err(GroupError::ReplicaBuild)?;
                run_step_group(replica.as_ref(), cases, &self.options.assertions, lang).await
            }
            Cases::Texts(probes) => {
                let replica = match self.options.text_mode {
                    TextMode::Conversation => Some(self.replicas.get().await.map_err(GroupError::ReplicaBuild)?),
                    TextMode::Classifier => None,
                };
                let ctx = TextRunContext {
                    options: &self.options,
                    classifier: self.classifier.clone(),
                    replica,
                    lang,
                };
                run_text_group(&group.list, probes, &ctx).await
            }
        }
    }
}
