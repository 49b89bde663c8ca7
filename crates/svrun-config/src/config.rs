//! Configuration structure definitions

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Simulator identifiers the harness can drive. The back-end set is closed;
/// declaring anything else in a configuration is rejected at load time.
pub const KNOWN_SIMULATORS: &[&str] = &["verilator", "vcs"];

/// Complete project configuration: directory layout, simulator settings and
/// the declared test list. Immutable after [`crate::from_path`] returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Directory layout relative to the project root
    #[serde(default)]
    pub project: ProjectPaths,

    /// Simulator used when neither the CLI nor the test says otherwise
    pub default_simulator: String,

    /// Per-simulator settings, keyed by simulator name
    #[serde(default)]
    pub simulators: HashMap<String, SimulatorSettings>,

    /// Declared tests, in execution order
    #[serde(default)]
    pub tests: Vec<TestDefinition>,
}

/// Directory layout for sources and build artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectPaths {
    /// RTL source directory
    #[serde(default = "default_rtl_dir")]
    pub rtl_dir: PathBuf,

    /// Testbench source directory
    #[serde(default = "default_tb_dir")]
    pub tb_dir: PathBuf,

    /// Waveform output directory
    #[serde(default = "default_waves_dir")]
    pub waves_dir: PathBuf,

    /// Compilation work directory
    #[serde(default = "default_obj_dir")]
    pub obj_dir: PathBuf,
}

fn default_rtl_dir() -> PathBuf {
    PathBuf::from("rtl")
}
fn default_tb_dir() -> PathBuf {
    PathBuf::from("tb")
}
fn default_waves_dir() -> PathBuf {
    PathBuf::from("sim/waves")
}
fn default_obj_dir() -> PathBuf {
    PathBuf::from("sim/obj_dir")
}

impl Default for ProjectPaths {
    fn default() -> Self {
        ProjectPaths {
            rtl_dir: default_rtl_dir(),
            tb_dir: default_tb_dir(),
            waves_dir: default_waves_dir(),
            obj_dir: default_obj_dir(),
        }
    }
}

/// Per-back-end settings from the `[simulators.<name>]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorSettings {
    /// Flags passed to every compile invocation of this simulator
    #[serde(default)]
    pub common_flags: Vec<String>,

    /// Wall-clock bound on a simulation run, e.g. "30s" (freeze protection)
    #[serde(default)]
    pub execution_timeout: Option<String>,

    /// Extra library search paths handed to the compile step
    #[serde(default)]
    pub library_paths: Vec<PathBuf>,

    /// Request waveform tracing support at compile time
    #[serde(default = "default_true")]
    pub trace: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        SimulatorSettings {
            common_flags: Vec::new(),
            execution_timeout: None,
            library_paths: Vec::new(),
            trace: true,
        }
    }
}

/// One declared test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Unique name; artifact and waveform filenames derive from it
    pub name: String,

    /// Disabled tests are skipped by batch runs but stay individually
    /// invocable with `--test`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Human description shown by `--list`
    #[serde(default)]
    pub description: Option<String>,

    /// Top-level module handed to the simulator
    pub top_module: String,

    /// Testbench source, relative to the testbench directory
    pub testbench_file: String,

    /// RTL sources relative to the RTL directory; subdirectory paths such
    /// as `tx/tx_ffe.sv` mix freely with bare filenames
    #[serde(default)]
    pub rtl_files: Vec<String>,

    /// Per-test simulator override
    #[serde(default)]
    pub simulator: Option<String>,

    /// Extra compiler flags for this test only
    #[serde(default)]
    pub extra_flags: Vec<String>,

    /// Simulated-time watchdog budget, e.g. "50us"; converted into
    /// timescale units before being handed to the testbench
    #[serde(default)]
    pub sim_timeout: Option<String>,

    /// Explicit timescale unit override, e.g. "1ns"; skips auto-detection
    #[serde(default)]
    pub timescale: Option<String>,
}

impl ProjectConfig {
    /// Validate cross-references and invariants the type system cannot
    /// express. Runs eagerly at load so configuration mistakes surface
    /// before any subprocess is spawned.
    pub fn validate(&self) -> Result<()> {
        self.check_simulator_name(&self.default_simulator, "default_simulator")?;

        let mut seen = HashSet::new();
        for test in &self.tests {
            for (field, value) in [
                ("name", &test.name),
                ("top_module", &test.top_module),
                ("testbench_file", &test.testbench_file),
            ] {
                if value.trim().is_empty() {
                    return Err(ConfigError::EmptyField {
                        test: test.name.clone(),
                        field: field.to_string(),
                    });
                }
            }

            if !seen.insert(test.name.as_str()) {
                return Err(ConfigError::DuplicateTest(test.name.clone()));
            }

            if let Some(simulator) = &test.simulator {
                self.check_simulator_name(simulator, &format!("test `{}`", test.name))?;
            }
        }

        Ok(())
    }

    fn check_simulator_name(&self, name: &str, context: &str) -> Result<()> {
        if !KNOWN_SIMULATORS.contains(&name) {
            return Err(ConfigError::UnknownSimulator {
                name: name.to_string(),
                context: context.to_string(),
                available: KNOWN_SIMULATORS.join(", "),
            });
        }
        if !self.simulators.contains_key(name) {
            return Err(ConfigError::UndeclaredSimulator {
                name: name.to_string(),
                context: context.to_string(),
            });
        }
        Ok(())
    }

    /// Tests eligible for a batch run, in declaration order
    pub fn enabled_tests(&self) -> impl Iterator<Item = &TestDefinition> {
        self.tests.iter().filter(|t| t.enabled)
    }

    /// Look up a test by name
    pub fn test(&self, name: &str) -> Option<&TestDefinition> {
        self.tests.iter().find(|t| t.name == name)
    }

    /// Settings for a simulator name, if declared
    pub fn simulator_settings(&self, name: &str) -> Option<&SimulatorSettings> {
        self.simulators.get(name)
    }
}
