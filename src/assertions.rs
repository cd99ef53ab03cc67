use crate::{
    error::AssertionError,
    harness::TurnRecord,
    matching::{action_matches, normalize_path, text_contains, tokenize},
};

/// Checks that the turn passed through `expected`.
///
/// With `exact` the final action of the turn must equal the expectation,
/// otherwise any action of the turn may match (wildcards allowed).
pub fn passed_action(turn: &TurnRecord, expected: &str, exact: bool) -> Result<(), AssertionError> {
    let matched = if exact {
        turn.actions
            .last()
            .is_some_and(|last| normalize_path(last) == normalize_path(expected))
    } else {
        turn.actions
            .iter()
            .any(|action| action_matches(expected, action) || action_matches(expected, &tokenize(action)))
    };

    if matched {
        return Ok(());
    }

    let actual = if turn.actions.is_empty() {
        "-".to_string()
    } else {
        turn.actions.join(", ")
    };
    Err(AssertionError::PassedAction {
        expected: expected.to_string(),
        actual,
    })
}

/// Assertions that hold if any response of the turn satisfies them.
pub fn any(turn: &TurnRecord) -> AnyResponse<'_> {
    AnyResponse { turn }
}

#[derive(Debug, Clone, Copy)]
pub struct AnyResponse<'a> {
    turn: &'a TurnRecord,
}

impl AnyResponse<'_> {
    pub fn contains(&self, needle: &str) -> Result<&Self, AssertionError> {
        if self.turn.texts.iter().any(|text| text_contains(text, needle)) {
            Ok(self)
        } else {
            Err(AssertionError::TextNotFound(needle.to_string()))
        }
    }

    pub fn quick_reply_text_contains(&self, needle: &str) -> Result<&Self, AssertionError> {
        if self
            .turn
            .quick_replies
            .iter()
            .any(|reply| text_contains(&reply.title, needle))
        {
            Ok(self)
        } else {
            Err(AssertionError::QuickReplyMissing(needle.to_string()))
        }
    }

    pub fn pass_thread(&self, app_id: &str) -> Result<&Self, AssertionError> {
        match self.turn.pass_thread.as_deref() {
            Some(target) if target == app_id => Ok(self),
            other => Err(AssertionError::PassThread {
                expected: app_id.to_string(),
                actual: other.unwrap_or("-").to_string(),
            }),
        }
    }
}
