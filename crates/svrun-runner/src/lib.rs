//! Test orchestration
//!
//! The runner drives each selected test through a fixed sequence: resolve
//! declared source paths on disk, pick the simulator back-end, resolve the
//! effective timescale and convert the simulated-time timeout, compile,
//! run, record. Failures are isolated per test: a missing file, a compile
//! error or a hung simulation is recorded in the report and the batch moves
//! on. Only configuration errors (caught before the runner exists) abort
//! the whole invocation. Nothing is ever retried; a hung or crashing
//! simulation indicates a design or testbench defect, not a transient
//! fault.

pub mod report;

pub use report::{RunReport, TestOutcome, TestResult};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use svrun_config::{ProjectConfig, TestDefinition};
use svrun_sim::{
    create_simulator, select_kind, CompileOutcome, CompileRequest, SimDirs, Simulator,
    SimulatorKind,
};
use svrun_timescale::{
    convert_timeout, detect_timescale, parse_wall_timeout, validate_consistency, TimeUnit,
    TimeValue, Timescale, TimescaleError,
};
use thiserror::Error;

/// Errors that abort an orchestrator entry point (as opposed to per-test
/// failures, which are recorded in the report)
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("test `{name}` not found; available tests: {available}")]
    UnknownTest { name: String, available: String },
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Indirection over back-end construction so tests can substitute a spy
pub trait BackendFactory: Send + Sync {
    fn create(&self, kind: SimulatorKind, dirs: SimDirs) -> Box<dyn Simulator>;
}

/// Production factory: the real toolchain back-ends
pub struct ToolchainFactory;

impl BackendFactory for ToolchainFactory {
    fn create(&self, kind: SimulatorKind, dirs: SimDirs) -> Box<dyn Simulator> {
        create_simulator(kind, dirs)
    }
}

/// Sequential test orchestrator; one instance per harness invocation
pub struct Runner {
    project_root: PathBuf,
    config: ProjectConfig,
    cli_override: Option<SimulatorKind>,
    factory: Box<dyn BackendFactory>,
    /// Effective timescale per test, resolved at most once per invocation
    timescale_cache: HashMap<String, Timescale>,
}

impl Runner {
    pub fn new(
        project_root: impl Into<PathBuf>,
        config: ProjectConfig,
        cli_override: Option<SimulatorKind>,
    ) -> Self {
        Self::with_factory(project_root, config, cli_override, Box::new(ToolchainFactory))
    }

    pub fn with_factory(
        project_root: impl Into<PathBuf>,
        config: ProjectConfig,
        cli_override: Option<SimulatorKind>,
        factory: Box<dyn BackendFactory>,
    ) -> Self {
        Runner {
            project_root: project_root.into(),
            config,
            cli_override,
            factory,
            timescale_cache: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Run every enabled test in declaration order
    pub async fn run_all(&mut self, view: bool) -> RunReport {
        let tests: Vec<TestDefinition> = self.config.enabled_tests().cloned().collect();
        self.run_batch(&tests, view).await
    }

    /// Run exactly one test by name, enabled or not
    pub async fn run_one(&mut self, name: &str, view: bool) -> Result<RunReport> {
        let test = self.lookup(name)?.clone();
        if !test.enabled {
            tracing::warn!(test = name, "test is disabled in config; running anyway");
        }
        Ok(self.run_batch(&[test], view).await)
    }

    async fn run_batch(&mut self, tests: &[TestDefinition], view: bool) -> RunReport {
        let mut report = RunReport::default();
        for test in tests {
            tracing::info!(test = %test.name, "starting test");
            let result = self.execute(test, view).await;
            tracing::info!(test = %test.name, outcome = result.outcome.label(), "test finished");
            report.push(result);
        }
        report
    }

    /// Remove build and waveform artifacts for one test
    pub fn clean_one(&self, name: &str) -> Result<()> {
        let test = self.lookup(name)?;
        self.clean_test(test);
        Ok(())
    }

    /// Remove build and waveform artifacts for every declared test
    pub fn clean_all(&self) {
        for test in &self.config.tests {
            self.clean_test(test);
        }
    }

    fn clean_test(&self, test: &TestDefinition) {
        let kind = self.resolve_kind(test);
        let backend = self.factory.create(kind, self.sim_dirs());
        if let Err(e) = backend.clean(&test.name) {
            tracing::warn!(test = %test.name, error = %e, "failed to clean artifacts");
        }
    }

    fn lookup(&self, name: &str) -> Result<&TestDefinition> {
        self.config.test(name).ok_or_else(|| RunnerError::UnknownTest {
            name: name.to_string(),
            available: self
                .config
                .tests
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    fn sim_dirs(&self) -> SimDirs {
        let paths = &self.config.project;
        SimDirs {
            project_root: self.project_root.clone(),
            rtl_dir: self.project_root.join(&paths.rtl_dir),
            work_dir: self.project_root.join(&paths.obj_dir),
            waves_dir: self.project_root.join(&paths.waves_dir),
        }
    }

    fn resolve_kind(&self, test: &TestDefinition) -> SimulatorKind {
        // Config validation already vetted these names, so parse failures
        // cannot reach this point; an override that somehow does not parse
        // simply drops out of the chain.
        let test_override = test.simulator.as_deref().and_then(|s| s.parse().ok());
        let project_default = self.config.default_simulator.parse().ok();
        select_kind(self.cli_override, test_override, project_default)
    }

    /// Drive one test through resolve → compile → run, recording the first
    /// terminal failure. Path resolution strictly precedes back-end
    /// construction, so a test with missing sources never spawns anything.
    async fn execute(&mut self, test: &TestDefinition, view: bool) -> TestResult {
        let kind = self.resolve_kind(test);
        let dirs = self.sim_dirs();

        let mut result = TestResult {
            name: test.name.clone(),
            simulator: kind,
            timescale: None,
            timeout_units: None,
            executable: None,
            wave_file: None,
            outcome: TestOutcome::Resolution(String::new()),
        };

        // Path resolution comes first; nothing is spawned for a test whose
        // declared sources are absent.
        let testbench = dirs.project_root.join(&self.config.project.tb_dir).join(&test.testbench_file);
        let (testbench, rtl_files) = match resolve_sources(&testbench, &dirs.rtl_dir, &test.rtl_files) {
            Ok(resolved) => resolved,
            Err(message) => {
                result.outcome = TestOutcome::Resolution(message);
                return result;
            }
        };

        let timescale = match self.effective_timescale(test, &testbench, &rtl_files) {
            Ok(timescale) => timescale,
            Err(e) => {
                result.outcome = TestOutcome::Conversion(e.to_string());
                return result;
            }
        };
        result.timescale = Some(timescale);

        for mismatch in validate_consistency(&testbench, &rtl_files) {
            tracing::warn!(test = %test.name, "mixed timescales: {mismatch}");
        }

        let timeout_units = match &test.sim_timeout {
            Some(spec) => match convert_timeout(spec, &timescale.unit) {
                Ok(units) => {
                    tracing::info!(
                        test = %test.name,
                        "simulation timeout {spec} → {units} time units (timescale {timescale})"
                    );
                    Some(units)
                }
                Err(e) => {
                    result.outcome = TestOutcome::Conversion(e.to_string());
                    return result;
                }
            },
            None => None,
        };
        result.timeout_units = timeout_units;

        let settings = self
            .config
            .simulator_settings(kind.as_str())
            .cloned()
            .unwrap_or_default();
        let wall_timeout = match &settings.execution_timeout {
            Some(spec) => match parse_wall_timeout(spec) {
                Ok(limit) => Some(limit),
                Err(e) => {
                    result.outcome = TestOutcome::Conversion(e.to_string());
                    return result;
                }
            },
            None => None,
        };

        let backend = self.factory.create(kind, dirs);
        let request = CompileRequest {
            test_name: test.name.clone(),
            top_module: test.top_module.clone(),
            testbench,
            rtl_files,
            common_flags: settings.common_flags.clone(),
            extra_flags: test.extra_flags.clone(),
            library_paths: settings.library_paths.clone(),
            trace: settings.trace,
            sim_timeout_units: timeout_units,
        };

        tracing::info!(test = %test.name, simulator = %kind, "compiling");
        let artifact = match backend.compile(&request).await {
            Ok(CompileOutcome::Success(artifact)) => artifact,
            Ok(CompileOutcome::Failure { stdout, stderr }) => {
                result.outcome = TestOutcome::CompileFailed { stdout, stderr };
                return result;
            }
            Err(e) => {
                result.outcome = TestOutcome::Simulator(e.to_string());
                return result;
            }
        };
        result.executable = Some(artifact.executable.clone());
        result.wave_file = Some(artifact.wave_file.clone());

        tracing::info!(test = %test.name, "running simulation");
        result.outcome = match backend.run(&artifact, wall_timeout).await {
            Ok(run) => TestOutcome::Completed(run),
            Err(e) => TestOutcome::Simulator(e.to_string()),
        };

        if view && result.passed() {
            launch_viewer(&artifact.wave_file);
        }

        result
    }

    /// Effective timescale: explicit config override, else the testbench's
    /// declaration, else the first declaring RTL file, else 1 ns / 1 ps.
    fn effective_timescale(
        &mut self,
        test: &TestDefinition,
        testbench: &Path,
        rtl_files: &[PathBuf],
    ) -> std::result::Result<Timescale, TimescaleError> {
        if let Some(cached) = self.timescale_cache.get(&test.name) {
            return Ok(*cached);
        }

        let timescale = if let Some(unit) = &test.timescale {
            // Config overrides carry only the unit; pair it with the
            // conventional 1 ps precision.
            let unit: TimeValue = unit.parse()?;
            Timescale::new(unit, TimeValue::new(1.0, TimeUnit::Ps))
        } else if let Some(detected) = detect_timescale(testbench)? {
            detected
        } else if let Some((rtl, detected)) = first_rtl_timescale(rtl_files)? {
            tracing::warn!(
                test = %test.name,
                "testbench declares no timescale; using {detected} from RTL file {}",
                rtl.display()
            );
            detected
        } else {
            tracing::warn!(test = %test.name, "no timescale found, defaulting to 1ns/1ps");
            Timescale::default()
        };

        self.timescale_cache.insert(test.name.clone(), timescale);
        Ok(timescale)
    }
}

fn first_rtl_timescale(
    rtl_files: &[PathBuf],
) -> std::result::Result<Option<(&PathBuf, Timescale)>, TimescaleError> {
    for rtl in rtl_files {
        if let Some(timescale) = detect_timescale(rtl)? {
            return Ok(Some((rtl, timescale)));
        }
    }
    Ok(None)
}

/// Check every declared source on disk, resolving against its base
/// directory. Bare filenames and subdirectory-relative paths both resolve
/// through a plain join.
fn resolve_sources(
    testbench: &Path,
    rtl_dir: &Path,
    rtl_files: &[String],
) -> std::result::Result<(PathBuf, Vec<PathBuf>), String> {
    let mut missing = Vec::new();
    if !testbench.is_file() {
        missing.push(format!("testbench not found: {}", testbench.display()));
    }

    let mut resolved = Vec::with_capacity(rtl_files.len());
    for rtl in rtl_files {
        let path = rtl_dir.join(rtl);
        if path.is_file() {
            resolved.push(path);
        } else {
            missing.push(format!("RTL file not found: {}", path.display()));
        }
    }

    if missing.is_empty() {
        Ok((testbench.to_path_buf(), resolved))
    } else {
        Err(missing.join("\n"))
    }
}

/// Fire-and-forget waveform viewer launch; never an error
fn launch_viewer(wave_file: &Path) {
    if !wave_file.exists() {
        tracing::warn!(wave = %wave_file.display(), "waveform file not generated, skipping viewer");
        return;
    }
    match std::process::Command::new("gtkwave")
        .arg(wave_file)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(_) => tracing::info!(wave = %wave_file.display(), "launched gtkwave"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("gtkwave not found on PATH; install gtkwave to view waveforms");
        }
        Err(e) => tracing::warn!(error = %e, "failed to launch gtkwave"),
    }
}
