//! Error classification by message text.
use serde::Serialize;

/// The error taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// The operation exceeded a deadline.
    Timeout,
    /// The connection was refused, reset or closed.
    Connection,
    /// The network path to the backend failed.
    Network,
    /// Credentials were rejected.
    Authentication,
    /// The backend throttled the client.
    RateLimit,
    /// A transient backend condition.
    Temporary,
    /// A failure that will not go away on retry.
    Permanent,
    /// Nothing matched.
    Unknown,
}

/// How bad an error is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Expected noise.
    Low,
    /// Degraded but functioning.
    Medium,
    /// Backend likely unavailable.
    High,
    /// Requires operator action.
    Critical,
}

/// Classification of one failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    /// The error type.
    pub kind: ErrorType,
    /// Whether retrying the same call may succeed.
    pub retryable: bool,
    /// Whether the client can recover, e.g. by reconnecting or re-authenticating.
    pub recoverable: bool,
    /// Severity of the error.
    pub severity: Severity,
}

impl ErrorInfo {
    /// Creates a classification.
    pub const fn new(kind: ErrorType, retryable: bool, recoverable: bool, severity: Severity) -> Self {
        Self { kind, retryable, recoverable, severity }
    }

    /// The classification used when no rule matches.
    pub const UNKNOWN: Self = Self::new(ErrorType::Unknown, false, false, Severity::Medium);
}

/// A predicate over the lowercased error message and the classification it yields.
pub struct ClassifierRule {
    matches: Box<dyn Fn(&str) -> bool + Send + Sync>,
    info: ErrorInfo,
}

impl ClassifierRule {
    /// Creates a rule from an arbitrary predicate.
    pub fn new(info: ErrorInfo, matches: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self { matches: Box::new(matches), info }
    }

    /// Creates a rule that matches when the message contains any of `needles`.
    ///
    /// Needles are compared against the lowercased message, so they should be lowercase.
    pub fn contains_any(info: ErrorInfo, needles: &'static [&'static str]) -> Self {
        Self::new(info, move |msg| needles.iter().any(|n| msg.contains(n)))
    }
}

impl std::fmt::Debug for ClassifierRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierRule").field("info", &self.info).finish_non_exhaustive()
    }
}

/// An ordered list of rules; the first matching rule wins.
#[derive(Debug)]
pub struct ErrorClassifier {
    rules: Vec<ClassifierRule>,
}

impl ErrorClassifier {
    /// A classifier with no rules: everything is [`ErrorInfo::UNKNOWN`].
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Appends a rule after the existing ones.
    pub fn push_rule(&mut self, rule: ClassifierRule) {
        self.rules.push(rule);
    }

    /// Appends a rule, builder style.
    pub fn with_rule(mut self, rule: ClassifierRule) -> Self {
        self.push_rule(rule);
        self
    }

    /// Classifies a message.
    pub fn classify_message(&self, msg: &str) -> ErrorInfo {
        let msg = msg.to_lowercase();
        self.rules
            .iter()
            .find(|rule| (rule.matches)(&msg))
            .map_or(ErrorInfo::UNKNOWN, |rule| rule.info)
    }

    /// Classifies an error using its full context chain.
    pub fn classify(&self, err: &anyhow::Error) -> ErrorInfo {
        self.classify_message(&format!("{err:#}"))
    }
}

impl Default for ErrorClassifier {
    /// The built-in rules, in order: timeout, connection, network, authentication, rate limit.
    fn default() -> Self {
        use ErrorType::*;
        use Severity::*;

        Self::empty()
            .with_rule(ClassifierRule::contains_any(
                ErrorInfo::new(Timeout, true, false, Medium),
                &["timeout", "timed out", "deadline exceeded"],
            ))
            .with_rule(ClassifierRule::contains_any(
                ErrorInfo::new(Connection, true, true, High),
                &["connection refused", "connection reset", "connection closed", "broken pipe", "unexpected eof"],
            ))
            .with_rule(ClassifierRule::contains_any(
                ErrorInfo::new(Network, true, true, High),
                &["network", "unreachable", "no route to host", "dns"],
            ))
            .with_rule(ClassifierRule::contains_any(
                ErrorInfo::new(Authentication, false, true, Critical),
                &["auth", "unauthorized", "forbidden", "permission denied", "invalid password"],
            ))
            .with_rule(ClassifierRule::contains_any(
                ErrorInfo::new(RateLimit, true, false, Medium),
                &["rate limit", "too many requests", "throttl"],
            ))
    }
}
