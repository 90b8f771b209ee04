//! Structured reporting of rollback violations.
//!
//! Conditions the simulation core cannot silently continue from (a validation without full
//! input coverage, a checksum mismatch) are returned as [`RollbackError`]s. In addition, every
//! such condition and every degraded path (an input for a player that has no entity yet, a
//! broken track invariant) is reported as a [`RuleViolation`] to a [`ViolationObserver`]:
//!
//! - [`TracingObserver`] (the default) logs through `tracing`,
//! - [`CollectingObserver`] keeps violations in memory so tests can assert on them.
//!
//! # Example
//!
//! ```
//! use paddle_rollback::telemetry::{CollectingObserver, ViolationKind};
//! use paddle_rollback::{GameConfig, RollbackManager};
//! use std::sync::Arc;
//!
//! let observer = Arc::new(CollectingObserver::new());
//! let manager = RollbackManager::new(GameConfig::default())
//!     .unwrap()
//!     .with_observer(observer.clone());
//!
//! assert!(!observer.has_violation(ViolationKind::ChecksumMismatch));
//! # drop(manager);
//! ```
//!
//! [`RollbackError`]: crate::RollbackError

use crate::Frame;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Severity of a violation, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Unexpected but recoverable; the operation continued on a fallback path.
    Warning,
    /// The operation was refused; state is unchanged.
    Error,
    /// Nodes disagree or an invariant is broken; the match cannot be trusted any more.
    Critical,
}

impl ViolationSeverity {
    /// Returns a string representation suitable for logging/metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subsystem a violation originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// Frame bookkeeping: validating without input coverage, validating the future.
    FrameSync,
    /// Input history: input older than the ring buffer, unknown player.
    InputHistory,
    /// Entity store: player without entity, inconsistent component tables.
    EntityStore,
    /// Local and authoritative physics states differ.
    ChecksumMismatch,
    /// Configuration constraint violated.
    Configuration,
    /// Runtime invariant check failed.
    Invariant,
}

impl ViolationKind {
    /// Returns a string representation suitable for logging/metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FrameSync => "frame_sync",
            Self::InputHistory => "input_history",
            Self::EntityStore => "entity_store",
            Self::ChecksumMismatch => "checksum_mismatch",
            Self::Configuration => "configuration",
            Self::Invariant => "invariant",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded violation with its context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RuleViolation {
    /// The severity level of this violation.
    pub severity: ViolationSeverity,
    /// The subsystem where the violation occurred.
    pub kind: ViolationKind,
    /// Human-readable description of what went wrong.
    pub message: String,
    /// Source location where the violation was detected (file:line).
    pub location: &'static str,
    /// The frame at which the violation occurred, if applicable.
    pub frame: Option<Frame>,
    /// Additional structured context as key-value pairs.
    pub context: BTreeMap<String, String>,
}

impl RuleViolation {
    /// Creates a new violation.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
            frame: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the frame at which this violation occurred.
    #[must_use]
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Adds a context key-value pair.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Serializes this violation to a JSON string.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    /// Serializes this violation to a pretty-printed JSON string.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json_pretty(&self) -> Option<String> {
        serde_json::to_string_pretty(self).ok()
    }
}

impl std::fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}] {} (at {}",
            self.severity, self.kind, self.message, self.location
        )?;
        if let Some(frame) = self.frame {
            write!(f, ", frame={frame}")?;
        }
        if !self.context.is_empty() {
            write!(f, ", context={:?}", self.context)?;
        }
        write!(f, ")")
    }
}

/// Receives violations.
///
/// Observers must be `Send + Sync` so a [`RollbackManager`](crate::RollbackManager) holding one
/// can be moved to the thread that dispatches network events.
pub trait ViolationObserver: Send + Sync {
    /// Called when a violation is detected. Keep it quick: it runs inside the simulation call.
    fn on_violation(&self, violation: &RuleViolation);
}

/// Default observer: logs violations via `tracing`.
///
/// `Warning` maps to `tracing::warn!`, `Error` and `Critical` to `tracing::error!`.
#[derive(Debug, Default, Clone)]
pub struct TracingObserver;

impl TracingObserver {
    /// Creates a new tracing observer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &RuleViolation) {
        let severity = violation.severity.as_str();
        let kind = violation.kind.as_str();
        let location = violation.location;
        let frame = violation
            .frame
            .map_or_else(|| "null".to_owned(), |f| f.to_string());
        let context = format!("{:?}", violation.context);

        match violation.severity {
            ViolationSeverity::Warning => {
                tracing::warn!(
                    severity,
                    kind,
                    location,
                    frame = %frame,
                    context = %context,
                    "{}",
                    violation.message
                );
            },
            ViolationSeverity::Error | ViolationSeverity::Critical => {
                tracing::error!(
                    severity,
                    kind,
                    location,
                    frame = %frame,
                    context = %context,
                    "{}",
                    violation.message
                );
            },
        }
    }
}

/// Observer that stores violations for later inspection, mostly for tests.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    violations: Mutex<Vec<RuleViolation>>,
}

impl CollectingObserver {
    /// Creates a new collecting observer with an empty violation list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            violations: Mutex::new(Vec::new()),
        }
    }

    /// Returns a copy of all collected violations.
    #[must_use]
    pub fn violations(&self) -> Vec<RuleViolation> {
        self.violations.lock().clone()
    }

    /// Returns the number of collected violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.lock().len()
    }

    /// Returns true if no violations have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.lock().is_empty()
    }

    /// Checks if any violation of the specified kind has been collected.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.violations.lock().iter().any(|v| v.kind == kind)
    }

    /// Returns all violations matching the specified kind.
    #[must_use]
    pub fn violations_of_kind(&self, kind: ViolationKind) -> Vec<RuleViolation> {
        self.violations
            .lock()
            .iter()
            .filter(|v| v.kind == kind)
            .cloned()
            .collect()
    }

    /// Clears all collected violations.
    pub fn clear(&self) {
        self.violations.lock().clear();
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &RuleViolation) {
        self.violations.lock().push(violation.clone());
    }
}

/// Sends `violation` to `observer`, or to [`TracingObserver`] when there is none.
pub fn report_to_observer(observer: Option<&Arc<dyn ViolationObserver>>, violation: &RuleViolation) {
    match observer {
        Some(obs) => obs.on_violation(violation),
        None => TracingObserver.on_violation(violation),
    }
}

/// Reports a violation to the default [`TracingObserver`], recording the call site.
///
/// ```
/// use paddle_rollback::{report_violation, telemetry::{ViolationKind, ViolationSeverity}};
///
/// report_violation!(ViolationSeverity::Warning, ViolationKind::InputHistory,
///     "input for player {} arrived late", 1);
/// ```
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $msg:literal) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::RuleViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};

    ($severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::RuleViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};
}

/// Reports a fully built [`RuleViolation`] through an optional observer, filling in the call
/// site.
///
/// ```
/// use paddle_rollback::report_violation_to;
/// use paddle_rollback::telemetry::{
///     CollectingObserver, RuleViolation, ViolationKind, ViolationObserver, ViolationSeverity,
/// };
/// use std::sync::Arc;
///
/// let collector = Arc::new(CollectingObserver::new());
/// let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
/// report_violation_to!(&observer, ViolationSeverity::Warning, ViolationKind::EntityStore,
///     "no entity for player {}", 1);
/// assert_eq!(collector.len(), 1);
/// ```
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, $severity:expr, $kind:expr, $msg:literal) => {{
        let violation = $crate::telemetry::RuleViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};

    ($observer:expr, $severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        let violation = $crate::telemetry::RuleViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};
}

/// Asserts that an observer collected no violations, printing them otherwise.
#[macro_export]
macro_rules! assert_no_violations {
    ($observer:expr) => {{
        let violations = $observer.violations();
        assert!(
            violations.is_empty(),
            "Expected no violations, but found {}:\n{:#?}",
            violations.len(),
            violations
        );
    }};
}

// ==========================================
// Runtime Invariant Checking
// ==========================================

/// Description of a broken invariant.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InvariantViolation {
    /// Name of the type whose invariant was violated.
    pub type_name: &'static str,
    /// Description of the violated invariant.
    pub invariant: String,
    /// Additional diagnostic context.
    pub details: Option<String>,
}

impl InvariantViolation {
    /// Creates a new invariant violation.
    #[must_use]
    pub fn new(type_name: &'static str, invariant: impl Into<String>) -> Self {
        Self {
            type_name,
            invariant: invariant.into(),
            details: None,
        }
    }

    /// Adds additional details to the violation.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.type_name, self.invariant)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// Types that maintain internal invariants.
pub trait InvariantChecker {
    /// Returns `Ok(())` if all invariants hold, or the first broken one.
    fn check_invariants(&self) -> Result<(), InvariantViolation>;
}

/// Checks invariants in debug builds (or with the `paranoid` feature) and reports failures as
/// critical violations. Compiles to nothing otherwise.
#[macro_export]
#[cfg(any(debug_assertions, feature = "paranoid"))]
macro_rules! debug_check_invariants {
    ($expr:expr, $context:expr) => {{
        use $crate::telemetry::InvariantChecker as _;
        if let Err(violation) = $expr.check_invariants() {
            $crate::report_violation!(
                $crate::telemetry::ViolationSeverity::Critical,
                $crate::telemetry::ViolationKind::Invariant,
                "{} [context: {}]",
                violation,
                $context
            );
        }
    }};
}

/// No-op version for release builds without `paranoid` feature.
#[macro_export]
#[cfg(not(any(debug_assertions, feature = "paranoid")))]
macro_rules! debug_check_invariants {
    ($expr:expr, $context:expr) => {{}};
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(ViolationSeverity::Warning < ViolationSeverity::Error);
        assert!(ViolationSeverity::Error < ViolationSeverity::Critical);
    }

    #[test]
    fn kind_labels() {
        assert_eq!(ViolationKind::FrameSync.as_str(), "frame_sync");
        assert_eq!(ViolationKind::InputHistory.as_str(), "input_history");
        assert_eq!(ViolationKind::EntityStore.as_str(), "entity_store");
        assert_eq!(ViolationKind::ChecksumMismatch.as_str(), "checksum_mismatch");
    }

    #[test]
    fn violation_display_includes_frame_and_context() {
        let violation = RuleViolation::new(
            ViolationSeverity::Critical,
            ViolationKind::ChecksumMismatch,
            "physics state differs",
            "rollback.rs:1",
        )
        .with_frame(Frame::new(12))
        .with_context("player", 1);
        let text = violation.to_string();
        assert!(text.contains("[critical/checksum_mismatch]"));
        assert!(text.contains("frame=12"));
        assert!(text.contains("player"));
    }

    #[test]
    fn collecting_observer_filters_by_kind() {
        let observer = CollectingObserver::new();
        observer.on_violation(&RuleViolation::new(
            ViolationSeverity::Warning,
            ViolationKind::EntityStore,
            "a",
            "x:1",
        ));
        observer.on_violation(&RuleViolation::new(
            ViolationSeverity::Error,
            ViolationKind::FrameSync,
            "b",
            "x:2",
        ));
        assert_eq!(observer.len(), 2);
        assert!(observer.has_violation(ViolationKind::FrameSync));
        assert_eq!(observer.violations_of_kind(ViolationKind::EntityStore).len(), 1);
        observer.clear();
        assert!(observer.is_empty());
    }

    #[test]
    fn report_to_observer_uses_given_observer() {
        let collector = Arc::new(CollectingObserver::new());
        let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
        report_violation_to!(
            &observer,
            ViolationSeverity::Warning,
            ViolationKind::InputHistory,
            "late input for frame {}",
            4
        );
        let violations = collector.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "late input for frame 4");
        assert!(violations[0].location.contains("telemetry.rs"));
    }

    #[test]
    fn report_without_observer_falls_back_to_tracing() {
        let observer: Option<Arc<dyn ViolationObserver>> = None;
        report_violation_to!(
            &observer,
            ViolationSeverity::Warning,
            ViolationKind::Configuration,
            "logged only"
        );
    }

    #[test]
    fn invariant_violation_display() {
        let violation = InvariantViolation::new("SimulationTrack", "tables out of sync")
            .with_details("entity=3");
        assert_eq!(
            violation.to_string(),
            "SimulationTrack: tables out of sync (entity=3)"
        );
    }

    #[cfg(feature = "json")]
    #[test]
    fn violation_serializes_to_json() {
        let violation = RuleViolation::new(
            ViolationSeverity::Warning,
            ViolationKind::FrameSync,
            "test",
            "test.rs:1",
        )
        .with_frame(Frame::new(42));
        let json = violation.to_json().unwrap();
        assert!(json.contains(r#""frame":42"#));
        assert!(json.contains(r#""kind":"frame_sync""#));
    }
}
