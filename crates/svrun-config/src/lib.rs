//! svrun configuration parsing and validation
//!
//! This crate handles parsing and validation of the harness configuration
//! file, which declares the project directory layout, the available
//! simulators with their settings, and the ordered test list. Validation is
//! eager: a configuration that names a simulator the harness cannot drive,
//! or declares two tests with the same name, is rejected at load time
//! rather than mid-batch.

pub mod config;
pub mod error;

pub use config::{
    ProjectConfig, ProjectPaths, SimulatorSettings, TestDefinition, KNOWN_SIMULATORS,
};
pub use error::{ConfigError, Result};

use std::path::Path;

/// Load and validate a configuration from a file path
pub fn from_path(path: impl AsRef<Path>) -> Result<ProjectConfig> {
    let contents =
        std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
    from_str(&contents)
}

/// Load and validate a configuration from a string
pub fn from_str(s: &str) -> Result<ProjectConfig> {
    let config: ProjectConfig = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        default_simulator = "verilator"

        [simulators.verilator]
        common_flags = ["--cc", "--exe", "--build", "--trace"]
        execution_timeout = "30s"

        [[tests]]
        name = "counter"
        description = "8-bit counter rollover"
        top_module = "tb_counter"
        testbench_file = "tb_counter.sv"
        rtl_files = ["counter.sv"]
        sim_timeout = "50us"
    "#;

    #[test]
    fn parses_minimal_config() {
        let config = from_str(MINIMAL).unwrap();
        assert_eq!(config.default_simulator, "verilator");
        assert_eq!(config.tests.len(), 1);

        let test = &config.tests[0];
        assert!(test.enabled);
        assert_eq!(test.top_module, "tb_counter");
        assert_eq!(test.sim_timeout.as_deref(), Some("50us"));
        assert_eq!(config.project.rtl_dir.to_str(), Some("rtl"));
        assert_eq!(config.project.waves_dir.to_str(), Some("sim/waves"));
    }

    #[test]
    fn missing_required_field_is_a_parse_error() {
        let toml = r#"
            default_simulator = "verilator"
            [simulators.verilator]
            [[tests]]
            name = "counter"
            testbench_file = "tb_counter.sv"
        "#;
        // top_module absent
        assert!(matches!(from_str(toml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn duplicate_test_names_are_rejected() {
        let toml = r#"
            default_simulator = "verilator"
            [simulators.verilator]

            [[tests]]
            name = "counter"
            top_module = "tb_counter"
            testbench_file = "tb_counter.sv"

            [[tests]]
            name = "counter"
            top_module = "tb_counter2"
            testbench_file = "tb_counter2.sv"
        "#;
        assert!(matches!(
            from_str(toml),
            Err(ConfigError::DuplicateTest(name)) if name == "counter"
        ));
    }

    #[test]
    fn unknown_default_simulator_is_rejected() {
        let toml = r#"
            default_simulator = "xsim"
            [simulators.xsim]
        "#;
        assert!(matches!(
            from_str(toml),
            Err(ConfigError::UnknownSimulator { name, .. }) if name == "xsim"
        ));
    }

    #[test]
    fn per_test_override_must_be_declared() {
        let toml = r#"
            default_simulator = "verilator"
            [simulators.verilator]

            [[tests]]
            name = "counter"
            top_module = "tb_counter"
            testbench_file = "tb_counter.sv"
            simulator = "vcs"
        "#;
        // vcs is a known back-end but has no [simulators.vcs] entry
        assert!(matches!(
            from_str(toml),
            Err(ConfigError::UndeclaredSimulator { name, .. }) if name == "vcs"
        ));
    }

    #[test]
    fn disabled_tests_are_filtered_but_addressable() {
        let toml = r#"
            default_simulator = "verilator"
            [simulators.verilator]

            [[tests]]
            name = "counter"
            top_module = "tb_counter"
            testbench_file = "tb_counter.sv"

            [[tests]]
            name = "fifo"
            enabled = false
            top_module = "tb_fifo"
            testbench_file = "tb_fifo.sv"
        "#;
        let config = from_str(toml).unwrap();
        let enabled: Vec<_> = config.enabled_tests().map(|t| t.name.as_str()).collect();
        assert_eq!(enabled, ["counter"]);
        assert!(config.test("fifo").is_some());
    }

    #[test]
    fn empty_name_is_rejected() {
        let toml = r#"
            default_simulator = "verilator"
            [simulators.verilator]

            [[tests]]
            name = "  "
            top_module = "tb"
            testbench_file = "tb.sv"
        "#;
        assert!(matches!(from_str(toml), Err(ConfigError::EmptyField { .. })));
    }
}
