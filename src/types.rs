use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One raw record as supplied by a test case source.
///
/// A record carries either `steps` (a scripted conversation) or `texts`
/// (free-text probes). The kind of the whole list is decided by its first record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseRecord {
    pub list: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<TestStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texts: Option<Vec<TextProbe>>,
}

impl TestCaseRecord {
    pub fn steps(list: impl Into<String>, name: impl Into<String>, steps: Vec<TestStep>) -> Self {
        Self {
            list: list.into(),
            name: name.into(),
            steps: Some(steps),
            texts: None,
        }
    }

    pub fn texts(list: impl Into<String>, name: impl Into<String>, texts: Vec<TextProbe>) -> Self {
        Self {
            list: list.into(),
            name: name.into(),
            steps: None,
            texts: Some(texts),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    pub step: u32,
    #[serde(default)]
    pub row_num: u32,
    pub action: String,
    #[serde(default)]
    pub passed_action: String,
    #[serde(default)]
    pub text_contains: String,
    #[serde(default)]
    pub quick_replies_contains: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_description: Option<String>,
}

impl TestStep {
    pub fn new(step: u32, action: impl Into<String>) -> Self {
        Self {
            step,
            row_num: step,
            action: action.into(),
            passed_action: String::new(),
            text_contains: String::new(),
            quick_replies_contains: String::new(),
            step_description: None,
        }
    }

    pub fn with_row(mut self, row_num: u32) -> Self {
        self.row_num = row_num;
        self
    }

    pub fn expect_action(mut self, passed_action: impl Into<String>) -> Self {
        self.passed_action = passed_action.into();
        self
    }

    pub fn expect_text(mut self, text_contains: impl Into<String>) -> Self {
        self.text_contains = text_contains.into();
        self
    }

    pub fn expect_quick_replies(mut self, quick_replies_contains: impl Into<String>) -> Self {
        self.quick_replies_contains = quick_replies_contains.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.step_description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TextProbe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
}

impl TextProbe {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            app_id: None,
            text: text.into(),
            action: None,
            intent: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn has_expectations(&self) -> bool {
        self.action.is_some() || self.app_id.is_some() || self.intent.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepCase {
    pub list: String,
    pub name: String,
    pub steps: Vec<TestStep>,
}

/// A text probe flattened out of its record, named after that record.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedProbe {
    pub name: String,
    pub probe: TextProbe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Steps,
    Texts,
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListKind::Steps => f.write_str("steps"),
            ListKind::Texts => f.write_str("texts"),
        }
    }
}

/// Homogeneous payload of a list or a group.
#[derive(Debug, Clone, PartialEq)]
pub enum Cases {
    Steps(Vec<StepCase>),
    Texts(Vec<NamedProbe>),
}

impl Cases {
    pub fn kind(&self) -> ListKind {
        match self {
            Cases::Steps(_) => ListKind::Steps,
            Cases::Texts(_) => ListKind::Texts,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Cases::Steps(cases) => cases.len(),
            Cases::Texts(probes) => probes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestList {
    pub id: usize,
    pub name: String,
    pub cases: Cases,
}

/// One execution batch drawn from a list.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub list_id: usize,
    pub list: String,
    pub cases: Cases,
}

impl Group {
    pub fn kind(&self) -> ListKind {
        self.cases.kind()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseResult {
    pub ok: bool,
    pub output: String,
}

impl CaseResult {
    pub fn passed(output: impl Into<String>) -> Self {
        Self {
            ok: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            ok: false,
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ListTally {
    pub passed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub output: String,
    pub summary_output: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    pub step_count: usize,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}
