//! Per-test results and the aggregate run report

use std::fmt::Write as _;
use std::path::PathBuf;
use svrun_sim::{RunOutcome, SimulatorKind};
use svrun_timescale::Timescale;

/// Terminal classification of one test execution
#[derive(Debug)]
pub enum TestOutcome {
    /// A declared source file does not exist; no subprocess was spawned
    Resolution(String),
    /// Timeout or timescale specification could not be converted
    Conversion(String),
    /// The toolchain itself failed (binary missing, artifact vanished)
    Simulator(String),
    /// Compile phase failed; run phase was not attempted
    CompileFailed { stdout: String, stderr: String },
    /// Both phases ran to a classification
    Completed(RunOutcome),
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, TestOutcome::Completed(RunOutcome::Passed { .. }))
    }

    pub fn label(&self) -> &'static str {
        match self {
            TestOutcome::Resolution(_) => "unresolved",
            TestOutcome::Conversion(_) => "bad-timeout",
            TestOutcome::Simulator(_) => "sim-error",
            TestOutcome::CompileFailed { .. } => "compile-failed",
            TestOutcome::Completed(run) => run.label(),
        }
    }
}

/// Immutable record of one test execution
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub simulator: SimulatorKind,
    pub timescale: Option<Timescale>,
    pub timeout_units: Option<u64>,
    pub executable: Option<PathBuf>,
    pub wave_file: Option<PathBuf>,
    pub outcome: TestOutcome,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.outcome.passed()
    }

    /// Diagnostics worth surfacing for a non-passing test, verbatim
    fn diagnostics(&self) -> Option<String> {
        match &self.outcome {
            TestOutcome::Resolution(msg)
            | TestOutcome::Conversion(msg)
            | TestOutcome::Simulator(msg) => Some(msg.clone()),
            TestOutcome::CompileFailed { stdout, stderr } => {
                Some(join_streams(stdout, stderr))
            }
            TestOutcome::Completed(RunOutcome::Failed { stdout, stderr })
            | TestOutcome::Completed(RunOutcome::Crashed { stdout, stderr, .. }) => {
                Some(join_streams(stdout, stderr))
            }
            TestOutcome::Completed(RunOutcome::TimedOut { limit }) => Some(format!(
                "exceeded the {limit:?} wall-clock execution timeout; process terminated"
            )),
            TestOutcome::Completed(RunOutcome::Passed { .. }) => None,
        }
    }
}

fn join_streams(stdout: &str, stderr: &str) -> String {
    match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (true, true) => String::from("(no output captured)"),
        (false, true) => stdout.trim_end().to_string(),
        (true, false) => stderr.trim_end().to_string(),
        (false, false) => format!("{}\n{}", stdout.trim_end(), stderr.trim_end()),
    }
}

/// Ordered results of one orchestrator invocation
#[derive(Debug, Default)]
pub struct RunReport {
    pub results: Vec<TestResult>,
}

impl RunReport {
    pub fn push(&mut self, result: TestResult) {
        self.results.push(result);
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    /// Render the summary table, one line per test in execution order,
    /// followed by diagnostics for anything that did not pass
    pub fn render(&self) -> String {
        let bar = "=".repeat(70);
        let mut out = String::new();
        let _ = writeln!(out, "{bar}");
        let _ = writeln!(out, "  TEST SUMMARY");
        let _ = writeln!(out, "{bar}");

        for result in &self.results {
            let mark = if result.passed() { '✓' } else { '✗' };
            let _ = writeln!(
                out,
                "  {mark} {:<30} {:<14} [{}]",
                result.name,
                result.outcome.label(),
                result.simulator
            );
        }

        let _ = writeln!(out, "{}", "-".repeat(70));
        let _ = writeln!(
            out,
            "  Total: {}  |  Passed: {}  |  Failed: {}",
            self.results.len(),
            self.passed(),
            self.failed()
        );
        let _ = writeln!(out, "{bar}");

        for result in self.results.iter().filter(|r| !r.passed()) {
            if let Some(diag) = result.diagnostics() {
                let _ = writeln!(out, "\n--- {} ({}) ---", result.name, result.outcome.label());
                let _ = writeln!(out, "{diag}");
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, outcome: TestOutcome) -> TestResult {
        TestResult {
            name: name.to_string(),
            simulator: SimulatorKind::Verilator,
            timescale: None,
            timeout_units: None,
            executable: None,
            wave_file: None,
            outcome,
        }
    }

    #[test]
    fn counts_and_overall_verdict() {
        let mut report = RunReport::default();
        report.push(result(
            "a",
            TestOutcome::Completed(RunOutcome::Passed {
                stdout: String::new(),
            }),
        ));
        report.push(result(
            "b",
            TestOutcome::CompileFailed {
                stdout: String::new(),
                stderr: "%Error: syntax".into(),
            },
        ));

        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.all_passed());
    }

    #[test]
    fn render_preserves_order_and_shows_diagnostics() {
        let mut report = RunReport::default();
        report.push(result("first", TestOutcome::Resolution("rtl/x.sv missing".into())));
        report.push(result(
            "second",
            TestOutcome::Completed(RunOutcome::Passed {
                stdout: String::new(),
            }),
        ));

        let rendered = report.render();
        let first = rendered.find("first").unwrap();
        let second = rendered.find("second").unwrap();
        assert!(first < second);
        assert!(rendered.contains("unresolved"));
        assert!(rendered.contains("rtl/x.sv missing"));
    }
}
