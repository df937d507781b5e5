use assert_cmd::Command;
use std::ffi::OsStr;
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(Debug)]
pub struct GltRun {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
}

impl GltRun {
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// An isolated working directory that doubles as `$HOME`.
pub struct GltWorkspace {
    pub temp_dir: TempDir,
    pub root: PathBuf,
}

impl GltWorkspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let root = temp_dir.path().to_path_buf();
        Self { temp_dir, root }
    }

    pub fn prefix(&self) -> PathBuf {
        self.root.join("stage")
    }
}

pub fn run_glt<I, S>(workspace: &GltWorkspace, args: I) -> GltRun
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("glt"));
    cmd.current_dir(&workspace.root);
    cmd.args(args);
    cmd.env("RUST_LOG", "off");
    for (key, _) in std::env::vars() {
        if key.starts_with("GLT_") {
            cmd.env_remove(key);
        }
    }
    cmd.env("NO_COLOR", "1");
    cmd.env("HOME", &workspace.root);

    let output = cmd.output().expect("run glt");
    GltRun {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        status: output.status,
    }
}
