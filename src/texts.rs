use std::sync::Arc;

use futures_util::future::join_all;
use tracing::debug;

use crate::{
    assertions::{any, passed_action},
    config::{TestOptions, TextMode},
    error::{AssertionError, GroupError, HarnessError},
    harness::{AgentReplica, Classifier, RankedResult, SessionHarness, SessionState},
    matching::action_matches,
    types::{CaseResult, NamedProbe, TextProbe},
};

/// What a single probe produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub text: String,
    pub score: Option<f64>,
    pub intent: Option<String>,
    pub failure: Option<String>,
}

impl ProbeOutcome {
    fn failed(text: &str, failure: impl Into<String>) -> Self {
        Self {
            text: text.to_string(),
            score: None,
            intent: None,
            failure: Some(failure.into()),
        }
    }

    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

pub struct TextRunContext<'a> {
    pub options: &'a TestOptions,
    pub classifier: Option<Arc<dyn Classifier>>,
    pub replica: Option<Arc<dyn AgentReplica>>,
    pub lang: Option<&'a str>,
}

/// Runs a texts group in windows of `text_case_parallel` probes and folds the
/// outcomes into a single aggregate result.
pub async fn run_text_group(
    list: &str,
    probes: &[NamedProbe],
    ctx: &TextRunContext<'_>,
) -> Result<Vec<CaseResult>, GroupError> {
    let runner = ProbeRunner::new(ctx)?;
    let parallel = ctx.options.text_case_parallel.max(1);
    let mut outcomes = Vec::with_capacity(probes.len());

    for window in probes.chunks(parallel) {
        outcomes.extend(join_all(window.iter().map(|probe| runner.run(&probe.probe))).await);
    }

    debug!(list, probes = outcomes.len(), "text group finished");
    Ok(vec![summarize(list, &outcomes, ctx.options.text_threshold)])
}

enum ProbeRunner<'a> {
    Classifier {
        classifier: Arc<dyn Classifier>,
        lang: Option<&'a str>,
    },
    Conversation {
        replica: Arc<dyn AgentReplica>,
        lang: Option<&'a str>,
    },
}

impl<'a> ProbeRunner<'a> {
    fn new(ctx: &TextRunContext<'a>) -> Result<Self, GroupError> {
        match ctx.options.text_mode {
            TextMode::Classifier => Ok(ProbeRunner::Classifier {
                classifier: ctx.classifier.clone().ok_or(GroupError::MissingClassifier)?,
                lang: ctx.lang,
            }),
            TextMode::Conversation => Ok(ProbeRunner::Conversation {
                replica: ctx.replica.clone().ok_or(GroupError::MissingReplica)?,
                lang: ctx.lang,
            }),
        }
    }

    async fn run(&self, probe: &TextProbe) -> ProbeOutcome {
        match self {
            ProbeRunner::Classifier { classifier, lang } => {
                // a failing classifier call fails the probe, not the whole group
                match classifier.ai_actions_for_text(&probe.text, *lang, true).await {
                    Ok(results) => evaluate_classification(probe, &results),
                    Err(error) => ProbeOutcome::failed(&probe.text, error.to_string()),
                }
            }
            ProbeRunner::Conversation { replica, lang } => {
                let mut session = match replica.open_session().await {
                    Ok(session) => session,
                    Err(error) => return ProbeOutcome::failed(&probe.text, error.to_string()),
                };
                session.set_state(SessionState {
                    lang: lang.map(str::to_string),
                });
                let outcome = run_conversation_probe(session.as_mut(), probe).await;
                session.teardown().await;
                outcome
            }
        }
    }
}

/// Compares the top classifier result with what the probe expects.
pub fn evaluate_classification(probe: &TextProbe, results: &[RankedResult]) -> ProbeOutcome {
    let Some(top) = results.first() else {
        return ProbeOutcome::failed(&probe.text, "no NLP result");
    };

    let mut outcome = ProbeOutcome {
        text: probe.text.clone(),
        score: Some(top.score),
        intent: top.intent.as_ref().map(|intent| intent.name.clone()),
        failure: None,
    };

    if !probe.has_expectations() {
        return outcome;
    }

    outcome.failure = classification_failure(probe, top);
    outcome
}

fn classification_failure(probe: &TextProbe, top: &RankedResult) -> Option<String> {
    if !top.above_confidence {
        return Some("low score".to_string());
    }

    if let Some(expected) = probe.intent.as_deref() {
        let actual = top.intent.as_ref().map(|intent| intent.name.as_str());
        if actual != Some(expected) {
            return Some(format!(
                "wrong intent: expected {expected}, got {}",
                actual.unwrap_or("-")
            ));
        }
    }

    let meta = top.meta.as_ref();
    if let Some(app_id) = probe.app_id.as_deref() {
        let target = meta.and_then(|meta| meta.target_app_id.as_deref());
        if target != Some(app_id) {
            let actual = target.or(top.action.as_deref()).unwrap_or("*");
            return Some(format!("wrong route: expected {app_id}, got {actual}"));
        }
        if let Some(action) = probe.action.as_deref() {
            let routed = meta.and_then(|meta| meta.target_action.as_deref());
            if !routed.is_some_and(|routed| action_matches(action, routed)) {
                return Some(format!(
                    "wrong action: expected {action}, got {}",
                    routed.unwrap_or("-")
                ));
            }
        }
    } else if let Some(action) = probe.action.as_deref() {
        let actual = top.action.as_deref();
        if !actual.is_some_and(|actual| action_matches(action, actual)) {
            return Some(format!(
                "wrong action: expected {action}, got {}",
                actual.unwrap_or("-")
            ));
        }
    }

    None
}

async fn run_conversation_probe(session: &mut dyn SessionHarness, probe: &TextProbe) -> ProbeOutcome {
    let result = conversation_checks(session, probe).await;

    let turn = session.last_turn();
    ProbeOutcome {
        text: probe.text.clone(),
        score: turn.and_then(|turn| turn.score),
        intent: turn.and_then(|turn| turn.intent.clone()),
        failure: result.err().map(|error| error.to_string()),
    }
}

async fn conversation_checks(session: &mut dyn SessionHarness, probe: &TextProbe) -> Result<(), HarnessError> {
    session.text(&probe.text).await?;
    let turn = session.last_turn().ok_or(HarnessError::NoTurn)?;

    if let Some(app_id) = probe.app_id.as_deref() {
        any(turn).pass_thread(app_id)?;
    }
    if let Some(action) = probe.action.as_deref() {
        passed_action(turn, action, false)?;
    }
    if let Some(expected) = probe.intent.as_deref() {
        if turn.intent.as_deref() != Some(expected) {
            return Err(AssertionError::Intent {
                expected: expected.to_string(),
                actual: turn.intent.clone().unwrap_or_else(|| "-".to_string()),
            }
            .into());
        }
    }
    Ok(())
}

/// Renders the failing probes and the pass ratio of a texts group.
pub fn summarize(list: &str, outcomes: &[ProbeOutcome], threshold: f64) -> CaseResult {
    let total = outcomes.len();
    let passed = outcomes.iter().filter(|outcome| outcome.passed()).count();
    let ratio = if total == 0 {
        1.0
    } else {
        passed as f64 / total as f64
    };
    let ok = ratio >= threshold;

    let width = outcomes
        .iter()
        .map(|outcome| outcome.text.chars().count())
        .max()
        .unwrap_or(0);

    let mut lines: Vec<String> = outcomes
        .iter()
        .filter_map(|outcome| {
            let reason = outcome.failure.as_deref()?;
            let score = outcome.score.unwrap_or(0.0);
            Some(format!(
                "{:>width$}\t{score:.2}\t{}|{reason}",
                outcome.text,
                outcome.intent.as_deref().unwrap_or("-"),
            ))
        })
        .collect();

    lines.push(format!(
        "{} {list} {passed}/{total} ({:.0}%)",
        if ok { "✓" } else { "✗" },
        ratio * 100.0
    ));

    CaseResult {
        ok,
        output: lines.join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::sleep;

    use super::*;
    use crate::harness::{
        scripted::{BotDefinition, IntentDefinition, RouteDefinition, ScriptedBot},
        IntentMatch, RouteMeta,
    };

    fn result(intent: &str, score: f64, action: Option<&str>) -> RankedResult {
        RankedResult {
            score,
            above_confidence: score >= 0.5,
            intent: Some(IntentMatch {
                name: intent.to_string(),
                score,
            }),
            meta: None,
            action: action.map(str::to_string),
        }
    }

    /// Passes probes whose text starts with "ok", tracking how many run at once.
    struct WindowClassifier {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl WindowClassifier {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Classifier for WindowClassifier {
        async fn ai_actions_for_text(
            &self,
            text: &str,
            _lang: Option<&str>,
            _full_detail: bool,
        ) -> Result<Vec<RankedResult>, HarnessError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            // later probes finish first within a window
            let delay = 30u64.saturating_sub(text.len() as u64);
            sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let intent = if text.starts_with("ok") { "good" } else { "bad" };
            Ok(vec![result(intent, 0.9, None)])
        }
    }

    fn probes(passing: usize, failing: usize) -> Vec<NamedProbe> {
        let make = |text: String| NamedProbe {
            name: "case".to_string(),
            probe: TextProbe::new(text).with_intent("good"),
        };
        (0..passing)
            .map(|i| make(format!("ok {i}")))
            .chain((0..failing).map(|i| make(format!("no {i}"))))
            .collect()
    }

    #[tokio::test]
    async fn eight_of_ten_meets_default_threshold() {
        let options = TestOptions::default();
        let ctx = TextRunContext {
            options: &options,
            classifier: Some(Arc::new(WindowClassifier::new())),
            replica: None,
            lang: None,
        };

        let results = run_text_group("intents", &probes(8, 2), &ctx).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].ok);
        assert!(results[0].output.ends_with("✓ intents 8/10 (80%)"));

        let results = run_text_group("intents", &probes(7, 3), &ctx).await.unwrap();
        assert!(!results[0].ok);
        assert!(results[0].output.ends_with("✗ intents 7/10 (70%)"));
    }

    #[tokio::test]
    async fn windows_bound_concurrency_and_keep_order() {
        let options = TestOptions::default().with_text_case_parallel(3);
        let classifier = Arc::new(WindowClassifier::new());
        let ctx = TextRunContext {
            options: &options,
            classifier: Some(classifier.clone()),
            replica: None,
            lang: None,
        };

        let mut probes = probes(0, 7);
        for (i, probe) in probes.iter_mut().enumerate() {
            probe.probe.text = format!("no {}", "x".repeat(i));
        }
        let results = run_text_group("intents", &probes, &ctx).await.unwrap();

        assert_eq!(classifier.peak.load(Ordering::SeqCst), 3);
        let lines: Vec<&str> = results[0].output.lines().collect();
        assert_eq!(lines.len(), 8);
        assert!(lines[0].trim_start().starts_with("no \t"));
        assert!(lines[6].starts_with("no xxxxxx\t"));
    }

    #[test]
    fn failure_lines_are_padded_and_annotated() {
        let outcomes = vec![
            ProbeOutcome {
                text: "hi".to_string(),
                score: Some(0.4567),
                intent: Some("greet".to_string()),
                failure: Some("low score".to_string()),
            },
            ProbeOutcome {
                text: "hello there".to_string(),
                score: Some(0.99),
                intent: None,
                failure: None,
            },
        ];

        let result = summarize("smalltalk", &outcomes, 0.8);
        assert_eq!(
            result.output,
            "         hi\t0.46\tgreet|low score\n✗ smalltalk 1/2 (50%)"
        );
    }

    #[test]
    fn classification_rules() {
        let probe = TextProbe::new("hello").with_intent("greet");
        assert_eq!(
            evaluate_classification(&probe, &[]).failure.as_deref(),
            Some("no NLP result")
        );
        assert_eq!(
            evaluate_classification(&probe, &[result("greet", 0.2, None)]).failure.as_deref(),
            Some("low score")
        );
        assert_eq!(
            evaluate_classification(&probe, &[result("bye", 0.9, None)]).failure.as_deref(),
            Some("wrong intent: expected greet, got bye")
        );
        assert!(evaluate_classification(&probe, &[result("greet", 0.9, None)]).passed());

        let unexpected = TextProbe::new("whatever");
        assert!(evaluate_classification(&unexpected, &[result("bye", 0.1, None)]).passed());
    }

    #[test]
    fn action_and_route_rules() {
        let probe = TextProbe::new("book").with_action("/booking/*");
        assert!(evaluate_classification(&probe, &[result("book", 0.9, Some("/booking/start"))]).passed());
        assert_eq!(
            evaluate_classification(&probe, &[result("book", 0.9, Some("/menu"))]).failure.as_deref(),
            Some("wrong action: expected /booking/*, got /menu")
        );

        let routed = TextProbe::new("agent please")
            .with_app_id("support")
            .with_action("/inbox");
        let mut top = result("human", 0.9, Some("/handover"));
        assert_eq!(
            evaluate_classification(&routed, &[top.clone()]).failure.as_deref(),
            Some("wrong route: expected support, got /handover")
        );

        top.meta = Some(RouteMeta {
            target_app_id: Some("support".to_string()),
            target_action: Some("/inbox".to_string()),
        });
        assert!(evaluate_classification(&routed, &[top.clone()]).passed());

        top.meta = Some(RouteMeta {
            target_app_id: Some("support".to_string()),
            target_action: None,
        });
        assert_eq!(
            evaluate_classification(&routed, &[top]).failure.as_deref(),
            Some("wrong action: expected /inbox, got -")
        );
    }

    #[tokio::test]
    async fn conversation_mode_drives_the_replica() {
        let bot = ScriptedBot::new(
            BotDefinition::new()
                .with_route(RouteDefinition::new("/support").pass_thread("support-app"))
                .with_route(RouteDefinition::new("/menu").reply("Menu"))
                .with_intent(
                    IntentDefinition::new("help")
                        .utterance("i need help")
                        .action("/support"),
                )
                .with_intent(IntentDefinition::new("menu").utterance("show menu").action("/menu")),
        );
        let options = TestOptions::default().with_text_mode(crate::config::TextMode::Conversation);
        let ctx = TextRunContext {
            options: &options,
            classifier: None,
            replica: Some(Arc::new(bot)),
            lang: Some("en"),
        };
        let probes = vec![
            NamedProbe {
                name: "handover".to_string(),
                probe: TextProbe::new("i need help").with_app_id("support-app"),
            },
            NamedProbe {
                name: "menu".to_string(),
                probe: TextProbe::new("show menu").with_action("/menu"),
            },
            NamedProbe {
                name: "menu".to_string(),
                probe: TextProbe::new("show menu").with_app_id("support-app"),
            },
        ];

        let results = run_text_group("routing", &probes, &ctx).await.unwrap();
        assert!(!results[0].ok);
        assert!(results[0].output.contains("expected pass thread to 'support-app', got '-'"));
        assert!(results[0].output.ends_with("✗ routing 2/3 (67%)"));
    }

    /// Refuses every session after the first `open` ones.
    struct FlakyReplica {
        inner: ScriptedBot,
        opened: AtomicUsize,
        open: usize,
    }

    #[async_trait]
    impl AgentReplica for FlakyReplica {
        async fn open_session(&self) -> Result<Box<dyn SessionHarness>, HarnessError> {
            if self.opened.fetch_add(1, Ordering::SeqCst) >= self.open {
                return Err(HarnessError::Replica("session limit reached".to_string()));
            }
            self.inner.open_session().await
        }
    }

    #[tokio::test]
    async fn session_errors_fail_only_their_probe() {
        let replica = FlakyReplica {
            inner: ScriptedBot::new(
                BotDefinition::new()
                    .with_route(RouteDefinition::new("/menu").reply("Menu"))
                    .with_intent(IntentDefinition::new("menu").utterance("show menu").action("/menu")),
            ),
            opened: AtomicUsize::new(0),
            open: 2,
        };
        let options = TestOptions::default()
            .with_text_mode(crate::config::TextMode::Conversation)
            .with_text_case_parallel(1);
        let ctx = TextRunContext {
            options: &options,
            classifier: None,
            replica: Some(Arc::new(replica)),
            lang: None,
        };
        let probes: Vec<NamedProbe> = ["show menu", "show menu", "show menu again"]
            .into_iter()
            .map(|text| NamedProbe {
                name: "menu".to_string(),
                probe: TextProbe::new(text).with_action("/menu"),
            })
            .collect();

        let results = run_text_group("menu", &probes, &ctx).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].output.contains("show menu again\t0.00\t-|replica error: session limit reached"));
        assert!(results[0].output.ends_with("✗ menu 2/3 (67%)"));
    }

    #[tokio::test]
    async fn classifier_mode_requires_a_classifier() {
        let options = TestOptions::default();
        let ctx = TextRunContext {
            options: &options,
            classifier: None,
            replica: None,
            lang: None,
        };
        let error = run_text_group("x", &probes(1, 0), &ctx).await.unwrap_err();
        assert!(matches!(error, GroupError::MissingClassifier));
    }
}
