use std::{fs, path::Path};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::BotTestError;

fn default_step_cases_per_step() -> usize {
    20
}

fn default_text_cases_per_step() -> usize {
    80
}

fn default_text_case_parallel() -> usize {
    10
}

fn default_text_threshold() -> f64 {
    0.8
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TextMode {
    /// Ask the classifier directly, bypassing the dialogue.
    #[default]
    Classifier,
    /// Drive a full conversation turn per probe.
    Conversation,
}

/// Per-turn assertions applied by the step executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StepAssertions {
    #[serde(default = "enabled")]
    pub passed_action: bool,
    #[serde(default = "enabled")]
    pub text_contains: bool,
    #[serde(default = "enabled")]
    pub quick_replies_contains: bool,
}

impl Default for StepAssertions {
    fn default() -> Self {
        Self {
            passed_action: true,
            text_contains: true,
            quick_replies_contains: true,
        }
    }
}

impl StepAssertions {
    pub fn none() -> Self {
        Self {
            passed_action: false,
            text_contains: false,
            quick_replies_contains: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestOptions {
    #[serde(default = "default_step_cases_per_step")]
    pub step_cases_per_step: usize,
    #[serde(default = "default_text_cases_per_step")]
    pub text_cases_per_step: usize,
    #[serde(default = "default_text_case_parallel")]
    pub text_case_parallel: usize,
    #[serde(default = "default_text_threshold")]
    pub text_threshold: f64,
    #[serde(default)]
    pub text_mode: TextMode,
    #[serde(default)]
    pub assertions: StepAssertions,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            step_cases_per_step: default_step_cases_per_step(),
            text_cases_per_step: default_text_cases_per_step(),
            text_case_parallel: default_text_case_parallel(),
            text_threshold: default_text_threshold(),
            text_mode: TextMode::default(),
            assertions: StepAssertions::default(),
        }
    }
}

impl TestOptions {
    pub fn from_yaml_str(input: &str) -> Result<Self, BotTestError> {
        let options: Self = serde_yaml::from_str(input)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_str(input: &str) -> Result<Self, BotTestError> {
        let options: Self = serde_json::from_str(input)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BotTestError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn with_step_cases_per_step(mut self, size: usize) -> Self {
        self.step_cases_per_step = size;
        self
    }

    pub fn with_text_cases_per_step(mut self, size: usize) -> Self {
        self.text_cases_per_step = size;
        self
    }

    pub fn with_text_case_parallel(mut self, parallel: usize) -> Self {
        self.text_case_parallel = parallel;
        self
    }

    pub fn with_text_threshold(mut self, threshold: f64) -> Self {
        self.text_threshold = threshold;
        self
    }

    pub fn with_text_mode(mut self, mode: TextMode) -> Self {
        self.text_mode = mode;
        self
    }

    pub fn with_assertions(mut self, assertions: StepAssertions) -> Self {
        self.assertions = assertions;
        self
    }

    pub fn validate(&self) -> Result<(), BotTestError> {
        if self.step_cases_per_step == 0 || self.text_cases_per_step == 0 {
            return Err(BotTestError::InvalidOptions(
                "cases per step must be at least 1".to_string(),
            ));
        }
        if self.text_case_parallel == 0 {
            return Err(BotTestError::InvalidOptions(
                "text_case_parallel must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.text_threshold) {
            return Err(BotTestError::InvalidOptions(format!(
                "text_threshold must be within 0..=1, got {}",
                self.text_threshold
            )));
        }
        Ok(())
    }
}
