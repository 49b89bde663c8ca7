//! Simulator back-end abstraction
//!
//! Every supported simulator exposes the same two-phase contract: compile
//! the sources into a runnable artifact, then run that artifact under a
//! wall-clock bound. The command-line syntax, flag names and artifact
//! layouts differ per toolchain; this crate hides that divergence behind
//! one [`Simulator`] trait so the orchestrator never branches on which
//! back-end is active.
//!
//! The back-end set is closed (Verilator and VCS); selection is a strict
//! priority chain resolved once per test by [`select_kind`].

pub mod exec;
mod verilator;
mod vcs;

pub use exec::{Bounded, CapturedOutput};
pub use verilator::VerilatorBackend;
pub use vcs::VcsBackend;

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Marker a self-checking testbench prints on success
pub const PASS_MARKER: &str = "TEST PASSED";
/// Marker a self-checking testbench prints on failure (including its own
/// simulated-time watchdog firing)
pub const FAIL_MARKER: &str = "TEST FAILED";

/// Wall-clock ceiling on a compile invocation. Builds are bounded even when
/// no execution timeout is configured: a wedged compiler must not hang the
/// whole batch.
pub const COMPILE_TIMEOUT: Duration = Duration::from_secs(600);

/// Errors from driving a simulator toolchain
#[derive(Debug, Error)]
pub enum SimError {
    /// The back-end's toolchain binary is not installed or not on PATH
    #[error("simulator toolchain `{0}` not found on PATH")]
    ToolNotFound(String),

    /// A previously compiled artifact has gone missing before the run phase
    #[error("compiled artifact not found: {0}")]
    MissingArtifact(PathBuf),

    /// Simulator name did not match any supported back-end
    #[error("unknown simulator `{0}`; available: verilator, vcs")]
    UnknownKind(String),

    /// I/O error spawning or supervising a subprocess
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for simulator operations
pub type Result<T> = std::result::Result<T, SimError>;

/// The closed set of supported back-ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulatorKind {
    Verilator,
    Vcs,
}

impl SimulatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulatorKind::Verilator => "verilator",
            SimulatorKind::Vcs => "vcs",
        }
    }
}

impl FromStr for SimulatorKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "verilator" => Ok(SimulatorKind::Verilator),
            "vcs" => Ok(SimulatorKind::Vcs),
            other => Err(SimError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for SimulatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve which back-end drives a test.
///
/// Strict priority: command-line override, then the per-test override from
/// configuration, then the project default, then Verilator as the hard-coded
/// fallback. Total and deterministic; exactly one back-end per test.
pub fn select_kind(
    cli_override: Option<SimulatorKind>,
    test_override: Option<SimulatorKind>,
    project_default: Option<SimulatorKind>,
) -> SimulatorKind {
    cli_override
        .or(test_override)
        .or(project_default)
        .unwrap_or(SimulatorKind::Verilator)
}

/// Absolute directory layout a back-end works against
#[derive(Debug, Clone)]
pub struct SimDirs {
    /// Project root; subprocesses run with this as their working directory
    pub project_root: PathBuf,
    /// RTL source directory (module search path for the compiler)
    pub rtl_dir: PathBuf,
    /// Root of per-test compilation work directories
    pub work_dir: PathBuf,
    /// Waveform output directory
    pub waves_dir: PathBuf,
}

impl SimDirs {
    /// Per-test work directory; keyed by test name so repeated or future
    /// concurrent tests never share build state
    pub fn test_work_dir(&self, test_name: &str) -> PathBuf {
        self.work_dir.join(test_name)
    }

    /// Waveform path the testbench is expected to write
    pub fn wave_file(&self, test_name: &str) -> PathBuf {
        self.waves_dir.join(format!("{test_name}.vcd"))
    }
}

/// Everything a back-end needs to compile one test, paths already resolved
/// and verified by the orchestrator
#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub test_name: String,
    pub top_module: String,
    pub testbench: PathBuf,
    pub rtl_files: Vec<PathBuf>,
    pub common_flags: Vec<String>,
    pub extra_flags: Vec<String>,
    pub library_paths: Vec<PathBuf>,
    pub trace: bool,
    /// Simulated-time watchdog budget, already converted to timescale units
    pub sim_timeout_units: Option<u64>,
}

/// Handle to a compiled, runnable simulation
#[derive(Debug, Clone)]
pub struct Artifact {
    pub executable: PathBuf,
    pub wave_file: PathBuf,
    pub work_dir: PathBuf,
}

/// Result of the compile phase
#[derive(Debug)]
pub enum CompileOutcome {
    Success(Artifact),
    /// Toolchain reported failure; diagnostics captured verbatim
    Failure { stdout: String, stderr: String },
}

/// Classified result of the run phase
#[derive(Debug)]
pub enum RunOutcome {
    /// Exited cleanly and printed the pass marker
    Passed { stdout: String },
    /// Printed the fail marker, or exited cleanly without any verdict
    Failed { stdout: String, stderr: String },
    /// Exceeded the wall-clock execution bound; process group reaped
    TimedOut { limit: Duration },
    /// Exited non-zero (or on a signal) without declaring failure itself
    Crashed {
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Passed { .. } => "passed",
            RunOutcome::Failed { .. } => "failed",
            RunOutcome::TimedOut { .. } => "timed-out",
            RunOutcome::Crashed { .. } => "crashed",
        }
    }
}

/// Classify a completed simulation process.
///
/// The testbench's own verdict wins: an explicit fail marker is a test
/// failure even if the process exited zero (and vice versa a watchdog
/// `$fatal` that prints the marker before dying non-zero is still `Failed`,
/// not `Crashed`). A clean exit with no marker at all violates the
/// self-checking contract and counts as failed.
pub fn classify_run(output: CapturedOutput) -> RunOutcome {
    let verdict_fail =
        output.stdout.contains(FAIL_MARKER) || output.stderr.contains(FAIL_MARKER);
    let verdict_pass = output.stdout.contains(PASS_MARKER);

    if verdict_fail {
        RunOutcome::Failed {
            stdout: output.stdout,
            stderr: output.stderr,
        }
    } else if !output.status.success() {
        RunOutcome::Crashed {
            status: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    } else if verdict_pass {
        RunOutcome::Passed {
            stdout: output.stdout,
        }
    } else {
        RunOutcome::Failed {
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Capability contract every back-end implements
#[async_trait]
pub trait Simulator: Send + Sync {
    /// Which back-end this is
    fn kind(&self) -> SimulatorKind;

    /// Deterministic artifact paths for a test name; usable before any
    /// compile (for cleaning and waveform viewing)
    fn artifact(&self, test_name: &str) -> Artifact;

    /// Invoke the build toolchain as a bounded subprocess
    async fn compile(&self, request: &CompileRequest) -> Result<CompileOutcome>;

    /// Run the compiled artifact bounded by `wall_timeout`
    async fn run(&self, artifact: &Artifact, wall_timeout: Option<Duration>)
        -> Result<RunOutcome>;

    /// Idempotently remove this test's build and waveform artifacts
    fn clean(&self, test_name: &str) -> Result<()>;
}

/// Instantiate the concrete back-end for a kind
pub fn create_simulator(kind: SimulatorKind, dirs: SimDirs) -> Box<dyn Simulator> {
    match kind {
        SimulatorKind::Verilator => Box::new(VerilatorBackend::new(dirs)),
        SimulatorKind::Vcs => Box::new(VcsBackend::new(dirs)),
    }
}

/// Map a spawn failure to [`SimError::ToolNotFound`] when the binary is
/// simply absent, keeping genuine I/O errors distinct
pub(crate) fn spawn_error(tool: &str, err: std::io::Error) -> SimError {
    if err.kind() == std::io::ErrorKind::NotFound {
        SimError::ToolNotFound(tool.to_string())
    } else {
        SimError::Io(err)
    }
}

/// Remove a file or directory tree if present; absence is not an error
pub(crate) fn remove_quiet(path: &std::path::Path) -> Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if meta.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    tracing::info!(path = %path.display(), "removed artifact");
    Ok(())
}
