//! Synopsys VCS back-end
//!
//! VCS shares the compile-then-run shape but none of the syntax: the
//! executable is named with `-o`, parameter overrides travel as `+define+`
//! macros, and compilation scatters side artifacts (`csrc/`, `*.daidir`,
//! `ucli.key`) into the working directory that cleaning must also remove.

use crate::exec::{run_bounded, Bounded};
use crate::{
    classify_run, spawn_error, Artifact, CompileOutcome, CompileRequest, Result, RunOutcome,
    SimDirs, SimError, Simulator, SimulatorKind, COMPILE_TIMEOUT,
};
use async_trait::async_trait;
use std::ffi::OsString;
use std::time::Duration;
use tokio::process::Command;

const TOOL: &str = "vcs";

pub struct VcsBackend {
    dirs: SimDirs,
}

impl VcsBackend {
    pub fn new(dirs: SimDirs) -> Self {
        Self { dirs }
    }

    fn compile_args(&self, request: &CompileRequest) -> Vec<OsString> {
        let artifact = self.artifact(&request.test_name);
        let mut args: Vec<OsString> = Vec::new();

        args.extend(request.common_flags.iter().map(Into::into));
        args.extend(request.extra_flags.iter().map(Into::into));
        if request.trace {
            args.push("-debug_access+all".into());
        }

        args.push("-top".into());
        args.push(request.top_module.clone().into());
        args.push("-o".into());
        args.push(artifact.executable.clone().into());

        for lib in &request.library_paths {
            args.push("-y".into());
            args.push(lib.clone().into());
        }

        if let Some(units) = request.sim_timeout_units {
            args.push(format!("+define+SIM_TIMEOUT={units}").into());
        }

        for rtl in &request.rtl_files {
            args.push(rtl.clone().into());
        }
        args.push(request.testbench.clone().into());

        args
    }
}

#[async_trait]
impl Simulator for VcsBackend {
    fn kind(&self) -> SimulatorKind {
        SimulatorKind::Vcs
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
        tracing::debug!(test = %request.test_name, ?args, "vcs compile");

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
                    stderr: format!("vcs exceeded the {limit:?} compile ceiling"),
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
        // VCS litters the invocation directory with these
        for side in ["csrc", "simv.daidir", "ucli.key"] {
            crate::remove_quiet(&self.dirs.project_root.join(side))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> VcsBackend {
        VcsBackend::new(SimDirs {
            project_root: "/proj".into(),
            rtl_dir: "/proj/rtl".into(),
            work_dir: "/proj/sim/vcs".into(),
            waves_dir: "/proj/sim/waves".into(),
        })
    }

    #[test]
    fn argv_uses_vcs_conventions() {
        let request = CompileRequest {
            test_name: "fifo_stress".into(),
            top_module: "tb_fifo".into(),
            testbench: "/proj/tb/tb_fifo.sv".into(),
            rtl_files: vec!["/proj/rtl/fifo.sv".into()],
            common_flags: vec!["-full64".into(), "-sverilog".into()],
            extra_flags: vec![],
            library_paths: vec![],
            trace: true,
            sim_timeout_units: Some(100_000_000),
        };
        let args: Vec<String> = backend()
            .compile_args(&request)
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(&args[..2], &["-full64", "-sverilog"]);
        assert!(args.contains(&"+define+SIM_TIMEOUT=100000000".to_string()));
        assert!(args.contains(&"-debug_access+all".to_string()));

        let o = args.iter().position(|a| a == "-o").unwrap();
        // executable derives from the test name, not the top module
        assert_eq!(args[o + 1], "/proj/sim/vcs/fifo_stress/fifo_stress");
        assert_eq!(args.last().unwrap(), "/proj/tb/tb_fifo.sv");
    }

    #[test]
    fn clean_is_idempotent_on_missing_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = VcsBackend::new(SimDirs {
            project_root: tmp.path().to_path_buf(),
            rtl_dir: tmp.path().join("rtl"),
            work_dir: tmp.path().join("sim/vcs"),
            waves_dir: tmp.path().join("sim/waves"),
        });
        backend.clean("fifo_stress").unwrap();
        backend.clean("fifo_stress").unwrap();
    }

    #[test]
    fn clean_removes_side_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("csrc")).unwrap();
        std::fs::create_dir_all(tmp.path().join("simv.daidir")).unwrap();
        std::fs::write(tmp.path().join("ucli.key"), "key").unwrap();

        let backend = VcsBackend::new(SimDirs {
            project_root: tmp.path().to_path_buf(),
            rtl_dir: tmp.path().join("rtl"),
            work_dir: tmp.path().join("sim/vcs"),
            waves_dir: tmp.path().join("sim/waves"),
        });
        backend.clean("anything").unwrap();

        assert!(!tmp.path().join("csrc").exists());
        assert!(!tmp.path().join("simv.daidir").exists());
        assert!(!tmp.path().join("ucli.key").exists());
    }
}
