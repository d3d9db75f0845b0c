//! Testsuite/testcase execution state.
//!
//! `testsuite` and `testcase` statements produce first-class work items
//! executed in source order by the test driver when the testing flag is
//! set. Filters select by name regex, by source path and by node span.
//! Failures are recorded on the results, never propagated to the host
//! thread.

use parking_lot::Mutex;
use rill_ir::Span;

use crate::errors::EvalError;

/// Filters selecting which suites/cases run.
#[derive(Default)]
pub struct TestFilters {
    /// Regex over the suite/case name.
    pub name: Option<regex::Regex>,
    /// Exact source (chunk) path.
    pub source_path: Option<String>,
    /// A span the item's node must intersect.
    pub span: Option<Span>,
}

impl TestFilters {
    pub fn selects(&self, name: &str, chunk_name: &str, span: Span) -> bool {
        if let Some(filter) = &self.name {
            if !filter.is_match(name) {
                return false;
            }
        }
        if let Some(path) = &self.source_path {
            if path != chunk_name {
                return false;
            }
        }
        if let Some(target) = &self.span {
            let intersects = span.start < target.end && target.start < span.end;
            if !intersects {
                return false;
            }
        }
        true
    }
}

/// Kind of a recorded test item.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TestItemKind {
    Suite,
    Case,
}

/// One executed suite or case.
#[derive(Clone, Debug)]
pub struct TestResult {
    pub kind: TestItemKind,
    pub name: String,
    pub error: Option<EvalError>,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-module testing state.
#[derive(Default)]
pub struct TestingState {
    enabled: std::sync::atomic::AtomicBool,
    filters: Mutex<TestFilters>,
    results: Mutex<Vec<TestResult>>,
}

impl TestingState {
    /// Arm the testing flag; testsuite/testcase statements execute only
    /// while it is set.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled
            .store(enabled, std::sync::atomic::Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn set_filters(&self, filters: TestFilters) {
        *self.filters.lock() = filters;
    }

    /// Whether the filters select this suite/case.
    pub fn selects(&self, name: &str, chunk_name: &str, span: Span) -> bool {
        self.filters.lock().selects(name, chunk_name, span)
    }

    pub fn record(&self, result: TestResult) {
        self.results.lock().push(result);
    }

    /// Results in execution (source) order.
    pub fn results(&self) -> Vec<TestResult> {
        self.results.lock().clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn name_filter_selects_by_regex() {
        let filters = TestFilters {
            name: Some(regex::Regex::new("^auth").unwrap()),
            ..TestFilters::default()
        };
        assert!(filters.selects("auth basics", "mod", Span::new(0, 1)));
        assert!(!filters.selects("db basics", "mod", Span::new(0, 1)));
    }

    #[test]
    fn span_filter_requires_intersection() {
        let filters = TestFilters {
            span: Some(Span::new(10, 20)),
            ..TestFilters::default()
        };
        assert!(filters.selects("x", "mod", Span::new(15, 16)));
        assert!(!filters.selects("x", "mod", Span::new(20, 25)));
    }
}
