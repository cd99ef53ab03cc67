use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotTestError {
    #[error("no test case source registered")]
    NoSource,

    #[error("test case source failed: {0}")]
    Source(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

#[derive(Debug, Clone, Error)]
pub enum HarnessError {
    #[error("quick reply not found: {0}")]
    QuickReplyNotFound(String),

    #[error("no turn has been executed yet")]
    NoTurn,

    #[error("replica error: {0}")]
    Replica(String),

    #[error(transparent)]
    Assertion(#[from] AssertionError),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AssertionError {
    #[error("expected action '{expected}', passed actions: {actual}")]
    PassedAction { expected: String, actual: String },

    #[error("response does not contain '{0}'")]
    TextNotFound(String),

    #[error("quick replies do not contain '{0}'")]
    QuickReplyMissing(String),

    #[error("expected pass thread to '{expected}', got '{actual}'")]
    PassThread { expected: String, actual: String },

    #[error("wrong intent: expected {expected}, got {actual}")]
    Intent { expected: String, actual: String },
}

/// Errors that abort a whole group rather than a single case.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("failed to build agent replica: {0}")]
    ReplicaBuild(HarnessError),

    #[error("failed to open session: {0}")]
    Session(HarnessError),

    #[error("no classifier configured for text test cases")]
    MissingClassifier,

    #[error("no agent replica available for conversation text test cases")]
    MissingReplica,
}
