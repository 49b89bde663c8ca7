//! Verilator back-end
//!
//! Verilator compiles SystemVerilog to a native executable. The build runs
//! with a per-test `-Mdir` work directory and an `-o` executable named after
//! the test (not the top module, so two tests sharing a top never collide),
//! and the simulated-time watchdog budget is injected as a `-G` parameter
//! override on the testbench's `SIM_TIMEOUT` parameter.

use crate::exec::{run_bounded, Bounded};
use crate::{
    classify_run, spawn_error, Artifact, CompileOutcome, CompileRequest, Result, RunOutcome,
    SimDirs, SimError, Simulator, SimulatorKind, COMPILE_TIMEOUT,
};
use async_trait::async_trait;
use std::ffi::OsString;
use std::time::Duration;
use tokio::process::Command;

const TOOL: &str = "verilator";

pub struct VerilatorBackend {
    dirs: SimDirs,
}

impl VerilatorBackend {
    pub fn new(dirs: SimDirs) -> Self {
        Self { dirs }
    }

    fn compile_args(&self, request: &CompileRequest) -> Vec<OsString> {
        let artifact = self.artifact(&request.test_name);
        let mut args: Vec<OsString> = Vec::new();

        args.extend(request.common_flags.iter().map(Into::into));
        args.extend(request.extra_flags.iter().map(Into::into));
        if request.trace && !request.common_flags.iter().any(|f| f == "--trace") {
            args.push("--trace".into());
        }

        args.push("-Mdir".into());
        args.push(artifact.work_dir.clone().into());
        args.push("--top-module".into());
        args.push(request.top_module.clone().into());

        // Module search paths: project RTL dir plus any configured libraries
        args.push("-y".into());
        args.push(self.dirs.rtl_dir.clone().into());
        for lib in &request.library_paths {
            args.push("-y".into());
            args.push(lib.clone().into());
        }

        if let Some(units) = request.sim_timeout_units {
            args.push(format!("-GSIM_TIMEOUT={units}").into());
        }

        args.push("-o".into());
        args.push(artifact.executable.clone().into());

        for rtl in &request.rtl_files {
            args.push(rtl.clone().into());
        }
        args.push(request.testbench.clone().into());

        args
    }
}

#[async_trait]
impl Simulator for VerilatorBackend {
    fn kind(&self) -> SimulatorKind {
        SimulatorKind::Verilator
    }

    fn artifact(&self, test_name: &str) -> Artifact {
        let work_dir = self.dirs.test_work_dir(test_name);
        Artifact {
            executable: work_dir.join(test_name),
            wave_file: self.dirs.wave_file(test_name),
            work_dir,
        }
    }

    async fn compile(&self, request: &CompileRequest) -> Result<CompileOutcome> {
        let artifact = self.artifact(&request.test_name);
        std::fs::create_dir_all(&artifact.work_dir)?;

        let args = self.compile_args(request);
        tracing::debug!(test = %request.test_name, ?args, "verilator compile");

        let mut cmd = Command::new(TOOL);
        cmd.args(&args).current_dir(&self.dirs.project_root);

        let bounded = run_bounded(cmd, Some(COMPILE_TIMEOUT))
            .await
            .map_err(|e| spawn_error(TOOL, e))?;
        let output = match bounded {
            Bounded::Completed(output) => output,
            Bounded::TimedOut { limit, .. } => {
                return Ok(CompileOutcome::Failure {
                    stdout: String::new(),
                    stderr: format!("verilator exceeded the {limit:?} compile ceiling"),
                })
            }
        };

        if output.status.success() {
            Ok(CompileOutcome::Success(artifact))
        } else {
            Ok(CompileOutcome::Failure {
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
    }

    async fn run(
        &self,
        artifact: &Artifact,
        wall_timeout: Option<Duration>,
    ) -> Result<RunOutcome> {
        if !artifact.executable.exists() {
            return Err(SimError::MissingArtifact(artifact.executable.clone()));
        }
        // The testbench writes its VCD here; make sure the directory exists
        std::fs::create_dir_all(&self.dirs.waves_dir)?;

        let mut cmd = Command::new(&artifact.executable);
        cmd.current_dir(&self.dirs.project_root);

        match run_bounded(cmd, wall_timeout).await? {
            Bounded::Completed(output) => Ok(classify_run(output)),
            Bounded::TimedOut { limit, .. } => Ok(RunOutcome::TimedOut { limit }),
        }
    }

    fn clean(&self, test_name: &str) -> Result<()> {
        let artifact = self.artifact(test_name);
        crate::remove_quiet(&artifact.work_dir)?;
        crate::remove_quiet(&artifact.wave_file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> VerilatorBackend {
        VerilatorBackend::new(SimDirs {
            project_root: "/proj".into(),
            rtl_dir: "/proj/rtl".into(),
            work_dir: "/proj/sim/obj_dir".into(),
            waves_dir: "/proj/sim/waves".into(),
        })
    }

    fn request() -> CompileRequest {
        CompileRequest {
            test_name: "counter".into(),
            top_module: "tb_counter".into(),
            testbench: "/proj/tb/tb_counter.sv".into(),
            rtl_files: vec!["/proj/rtl/counter.sv".into(), "/proj/rtl/tx/tx_ffe.sv".into()],
            common_flags: vec!["--cc".into(), "--exe".into(), "--build".into()],
            extra_flags: vec!["-Wall".into()],
            library_paths: vec![],
            trace: true,
            sim_timeout_units: Some(50_000),
        }
    }

    #[test]
    fn argv_covers_flags_paths_and_timeout() {
        let args = backend().compile_args(&request());
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(&args[..3], &["--cc", "--exe", "--build"]);
        assert!(args.contains(&"-Wall".to_string()));
        assert!(args.contains(&"--trace".to_string()));
        assert!(args.contains(&"-GSIM_TIMEOUT=50000".to_string()));

        let mdir = args.iter().position(|a| a == "-Mdir").unwrap();
        assert_eq!(args[mdir + 1], "/proj/sim/obj_dir/counter");
        let top = args.iter().position(|a| a == "--top-module").unwrap();
        assert_eq!(args[top + 1], "tb_counter");

        // testbench comes last, after the RTL files
        assert_eq!(args.last().unwrap(), "/proj/tb/tb_counter.sv");
        assert!(args.contains(&"/proj/rtl/tx/tx_ffe.sv".to_string()));
    }

    #[test]
    fn trace_flag_is_not_duplicated() {
        let mut req = request();
        req.common_flags.push("--trace".into());
        let args = backend().compile_args(&req);
        let count = args.iter().filter(|a| *a == "--trace").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn no_sim_timeout_means_no_parameter_override() {
        let mut req = request();
        req.sim_timeout_units = None;
        let args = backend().compile_args(&req);
        assert!(!args
            .iter()
            .any(|a| a.to_string_lossy().starts_with("-GSIM_TIMEOUT")));
    }
}
