//! Shared test infrastructure for integration tests.
//!
//! Each test gets its own temp dir holding a copy of `fake-aws.sh`, so
//! the calls it records never mix with other tests running in parallel.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const SCRUBBED_ENV: [&str; 7] = [
    "AWS_REGION",
    "AWS_DEFAULT_REGION",
    "AMI_AUTOMATION_CONFIG",
    "AMI_AUTOMATION_AWS_COMMAND",
    "AMI_AUTOMATION_POLL_INTERVAL_SECS",
    "AMI_AUTOMATION_TIMEOUT_SECS",
    "AMI_AUTOMATION_LOG",
];

fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub struct FakeAws {
    dir: TempDir,
    envs: Vec<(String, String)>,
}

impl FakeAws {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let script = dir.path().join("aws");
        fs::copy(manifest_dir().join("tests/fake-aws.sh"), &script).expect("copy fake aws");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");
        fs::write(dir.path().join("config.json"), "{}").expect("write config");
        Self {
            dir,
            envs: Vec::new(),
        }
    }

    /// Environment passed to the fake (e.g. `FAKE_AWS_STATUS`).
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.envs.push((key.to_string(), value.to_string()));
        self
    }

    fn script(&self) -> PathBuf {
        self.dir.path().join("aws")
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("config.json")
    }

    /// Run the binary against the fake with an isolated config and env.
    pub fn run(&self, args: &[&str]) -> Output {
        let mut command = Command::new(env!("CARGO_BIN_EXE_ami-automation"));
        for key in SCRUBBED_ENV {
            command.env_remove(key);
        }
        command
            .envs(self.envs.iter().map(|(key, value)| (key, value)))
            .arg("--aws-command")
            .arg(self.script())
            .arg("--config")
            .arg(self.config())
            .arg("--no-color")
            .args(args)
            .output()
            .expect("run ami-automation")
    }

    /// Calls recorded by the fake, one argument string per call.
    pub fn calls(&self) -> Vec<String> {
        read_lines(&self.dir.path().join("calls.log"))
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(text) => text.lines().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
