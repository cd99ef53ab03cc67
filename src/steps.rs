use tracing::debug;

use crate::{
    assertions::{any, passed_action},
    config::StepAssertions,
    error::{AssertionError, GroupError, HarnessError},
    harness::{AgentReplica, SessionHarness, SessionState},
    matching::{passed_action_alternatives, required_parts, TurnAction},
    types::{CaseResult, StepCase, TestStep},
};

/// Runs one scripted conversation. Returns `None` when every step passed,
/// otherwise a report of the first failing step.
pub async fn run_step_case(
    session: &mut dyn SessionHarness,
    steps: &[TestStep],
    assertions: &StepAssertions,
) -> Option<String> {
    for (index, step) in steps.iter().enumerate() {
        if let Err(error) = run_step(session, step, assertions).await {
            return Some(failure_report(session, index + 1, step, &error));
        }
    }
    None
}

async fn run_step(
    session: &mut dyn SessionHarness,
    step: &TestStep,
    assertions: &StepAssertions,
) -> Result<(), HarnessError> {
    match TurnAction::parse(&step.action) {
        TurnAction::Postback(path) => session.postback(&path).await?,
        TurnAction::QuickReply(path) => session.quick_reply(&path).await?,
        TurnAction::QuickReplyText(title) => session.quick_reply_by_text(&title).await?,
        TurnAction::Text(text) => session.text(&text).await?,
    }

    let turn = session.last_turn().ok_or(HarnessError::NoTurn)?;

    if assertions.passed_action {
        let alternatives = passed_action_alternatives(&step.passed_action);
        if !alternatives.is_empty() {
            let mut last_error = None;
            for alternative in &alternatives {
                match passed_action(turn, alternative, false) {
                    Ok(()) => {
                        last_error = None;
                        break;
                    }
                    Err(error) => last_error = Some(error),
                }
            }
            if let Some(error) = last_error {
                return Err(alternatives_error(&alternatives, error).into());
            }
        }
    }

    if assertions.text_contains {
        for part in required_parts(&step.text_contains, true) {
            any(turn).contains(&part)?;
        }
    }

    if assertions.quick_replies_contains {
        for part in required_parts(&step.quick_replies_contains, false) {
            any(turn).quick_reply_text_contains(&part)?;
        }
    }

    Ok(())
}

fn alternatives_error(alternatives: &[String], error: AssertionError) -> AssertionError {
    match error {
        AssertionError::PassedAction { actual, .. } if alternatives.len() > 1 => {
            AssertionError::PassedAction {
                expected: alternatives.join(" | "),
                actual,
            }
        }
        other => other,
    }
}

fn failure_report(
    session: &dyn SessionHarness,
    number: usize,
    step: &TestStep,
    error: &HarnessError,
) -> String {
    let trail: Vec<&str> = session
        .action_history()
        .iter()
        .filter(|visited| !visited.untracked)
        .map(|visited| visited.action.as_str())
        .collect();

    let mut report = format!("step {number} failed (row {})", step.row_num);
    if let Some(description) = step.step_description.as_deref().filter(|d| !d.trim().is_empty()) {
        report.push_str(&format!(": {}", description.trim()));
    }
    report.push_str(&format!("\n  actions: {}", if trail.is_empty() { "-".to_string() } else { trail.join(" > ") }));
    report.push_str(&format!("\n  {error}"));
    report
}

/// Runs each case of a steps group in its own session on the shared replica.
pub async fn run_step_group(
    replica: &dyn AgentReplica,
    cases: &[StepCase],
    assertions: &StepAssertions,
    lang: Option<&str>,
) -> Result<Vec<CaseResult>, GroupError> {
    let mut results = Vec::with_capacity(cases.len());

    for case in cases {
        let mut session = replica.open_session().await.map_err(GroupError::Session)?;
        session.set_state(SessionState {
            lang: lang.map(str::to_string),
        });

        let failure = run_step_case(session.as_mut(), &case.steps, assertions).await;
        session.teardown().await;

        debug!(list = %case.list, case = %case.name, passed = failure.is_none(), "step case finished");
        results.push(match failure {
            None => CaseResult::passed(format!("✓ {}", case.name)),
            Some(report) => CaseResult::failed(format!(
                "✗ FAILED {}\n{}",
                case.name,
                indent(&report)
            )),
        });
    }

    Ok(results)
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::scripted::{BotDefinition, RouteDefinition, ScriptedBot};
    use crate::types::TestStep;

    fn bot() -> ScriptedBot {
        ScriptedBot::new(
            BotDefinition::new()
                .with_route(
                    RouteDefinition::new("/start")
                        .reply("Hello")
                        .quick_reply("Next", "/next"),
                )
                .with_route(
                    RouteDefinition::new("/next")
                        .reply("Quick reply")
                        .quick_reply("Back", "/start"),
                )
                .with_route(RouteDefinition::new("/hidden").reply("Hidden").untracked())
                .with_fallback(RouteDefinition::new("/fallback").reply("Fallback")),
        )
    }

    fn passing_steps() -> Vec<TestStep> {
        vec![
            TestStep::new(1, "#start")
                .with_row(2)
                .expect_action("/start")
                .expect_text("Hello")
                .expect_quick_replies("Next"),
            TestStep::new(2, ">Next")
                .with_row(3)
                .expect_action("/next")
                .expect_text("Quick reply"),
            TestStep::new(3, "random text")
                .with_row(4)
                .expect_text("Fallback"),
        ]
    }

    #[tokio::test]
    async fn passing_case_returns_none() {
        let mut session = bot().open_session().await.unwrap();
        let failure = run_step_case(session.as_mut(), &passing_steps(), &StepAssertions::default()).await;
        assert_eq!(failure, None);
    }

    #[tokio::test]
    async fn stops_at_first_failing_step() {
        let mut steps = passing_steps();
        steps[1] = steps[1].clone().expect_quick_replies("Missing title").with_description("go next");

        let mut session = bot().open_session().await.unwrap();
        let failure = run_step_case(session.as_mut(), &steps, &StepAssertions::default())
            .await
            .expect("case should fail");

        assert_eq!(failure.matches("step ").count(), 1);
        assert!(failure.starts_with("step 2 failed (row 3): go next"));
        assert!(failure.contains("actions: /start > /next"));
        assert!(failure.contains("quick replies do not contain 'Missing title'"));
        // step 3 never ran
        assert_eq!(session.action_history().len(), 2);
    }

    #[tokio::test]
    async fn accepts_any_passed_action_alternative() {
        let steps = vec![TestStep::new(1, "#start").expect_action("/other\n/start")];
        let mut session = bot().open_session().await.unwrap();
        assert_eq!(run_step_case(session.as_mut(), &steps, &StepAssertions::default()).await, None);

        let steps = vec![TestStep::new(1, "#start").expect_action("/other\n/another")];
        let mut session = bot().open_session().await.unwrap();
        let failure = run_step_case(session.as_mut(), &steps, &StepAssertions::default())
            .await
            .unwrap();
        assert!(failure.contains("expected action '/other | /another'"));
    }

    #[tokio::test]
    async fn disabled_assertions_are_skipped() {
        let steps = vec![TestStep::new(1, "#start")
            .expect_action("/nowhere")
            .expect_text("never said")];
        let mut session = bot().open_session().await.unwrap();
        assert_eq!(run_step_case(session.as_mut(), &steps, &StepAssertions::none()).await, None);
    }

    #[tokio::test]
    async fn untracked_actions_are_left_out_of_the_trail() {
        let steps = vec![
            TestStep::new(1, "#hidden"),
            TestStep::new(2, "#start"),
            TestStep::new(3, ">/missing"),
        ];
        let mut session = bot().open_session().await.unwrap();
        let failure = run_step_case(session.as_mut(), &steps, &StepAssertions::default())
            .await
            .unwrap();
        assert!(failure.contains("actions: /start\n"));
        assert!(failure.contains("quick reply not found: /missing"));
    }

    #[tokio::test]
    async fn group_reports_each_case() {
        let mut failing = passing_steps();
        failing[0] = failing[0].clone().expect_text("Goodbye");
        let cases = vec![
            StepCase {
                list: "Good".to_string(),
                name: "foo".to_string(),
                steps: passing_steps(),
            },
            StepCase {
                list: "Good".to_string(),
                name: "bar".to_string(),
                steps: failing,
            },
        ];

        let results = run_step_group(&bot(), &cases, &StepAssertions::default(), Some("en"))
            .await
            .unwrap();
        assert_eq!(results[0], CaseResult::passed("✓ foo"));
        assert!(!results[1].ok);
        assert!(results[1].output.starts_with("✗ FAILED bar\n    step 1 failed (row 2)"));
    }
}
