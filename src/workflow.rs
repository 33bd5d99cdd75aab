//! Command orchestration.
//!
//! A `Session` carries everything one invocation needs (service backend,
//! home region, poll policy, clock, progress sink) so components receive
//! their collaborators explicitly instead of reading ambient state.
mod start;
mod util;
mod watch;

use start::{run_start, StartPlan};
use util::{run_copy, run_share, run_wait};
use watch::run_watch;

use crate::aws::AwsCli;
use crate::cli::{Command, GlobalArgs, RootArgs, UtilCommand};
use crate::config;
use crate::execution::ExecutionObserver;
use crate::poll::{Clock, PollPolicy, Poller, SystemClock};
use crate::progress::Progress;
use crate::propagation::{validate_region, Propagator};
use crate::render::RendererRegistry;
use crate::services::{AccessService, ImageService, ObjectStore, WorkflowService};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

/// How a command finished when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The automation reached a terminal status other than `Success`.
    Unsuccessful,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => ExitCode::SUCCESS,
            Outcome::Unsuccessful => ExitCode::from(1),
        }
    }
}

pub struct Backend {
    pub workflow: Arc<dyn WorkflowService>,
    pub images: Arc<dyn ImageService>,
    pub access: Arc<dyn AccessService>,
    pub objects: Arc<dyn ObjectStore>,
}

impl Backend {
    pub fn aws(cli: AwsCli) -> Self {
        let cli = Arc::new(cli);
        Self {
            workflow: cli.clone(),
            images: cli.clone(),
            access: cli.clone(),
            objects: cli,
        }
    }
}

pub struct Session {
    backend: Backend,
    renderers: RendererRegistry,
    /// `None` when the command never needed one and none was configured.
    source_region: Option<String>,
    poll: PollPolicy,
    clock: Arc<dyn Clock>,
    progress: Progress,
    program: String,
}

impl Session {
    pub fn new(
        backend: Backend,
        source_region: Option<String>,
        poll: PollPolicy,
        clock: Arc<dyn Clock>,
        progress: Progress,
        program: String,
    ) -> Self {
        let renderers = RendererRegistry::standard(backend.objects.clone());
        Self {
            backend,
            renderers,
            source_region,
            poll,
            clock,
            progress,
            program,
        }
    }

    /// Resolve settings and build the AWS CLI backend.
    ///
    /// The AWS CLI configuration is only asked for a region when none is
    /// set and `discover_region` is true.
    pub fn connect(global: &GlobalArgs, discover_region: bool) -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let file = config::load_for_run(global.config.as_deref(), &env)?;
        let settings = config::resolve_settings(global, &env, &file)?;
        let mut cli = AwsCli::from_command(&settings.aws_command)?;
        let source_region = match settings.region {
            Some(region) => Some(region),
            None if discover_region => Some(cli.configured_region().ok_or_else(no_region)?),
            None => None,
        };
        if let Some(region) = source_region.as_deref() {
            validate_region(region)?;
            cli = cli.with_region(region);
        }
        tracing::debug!(
            region = source_region.as_deref(),
            aws_command = %settings.aws_command,
            interval_secs = settings.poll.interval.as_secs(),
            timeout_secs = settings.poll.timeout.map(|timeout| timeout.as_secs()),
            "session settings"
        );
        Ok(Self::new(
            Backend::aws(cli),
            source_region,
            settings.poll,
            Arc::new(SystemClock),
            Progress::stderr(!global.no_color),
            program_name(),
        ))
    }

    pub fn observer(&self) -> ExecutionObserver<'_> {
        ExecutionObserver::new(
            self.backend.workflow.as_ref(),
            &self.renderers,
            Poller::new(self.clock.as_ref(), self.poll),
            &self.progress,
        )
    }

    pub fn propagator(&self) -> Propagator<'_> {
        Propagator::new(
            self.backend.images.as_ref(),
            self.backend.access.as_ref(),
            self.clock.as_ref(),
            self.poll,
            &self.progress,
        )
    }

    pub fn source_region(&self) -> Result<&str> {
        self.source_region.as_deref().ok_or_else(no_region)
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn workflow(&self) -> &dyn WorkflowService {
        self.backend.workflow.as_ref()
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

/// Route a parsed command line to its command.
pub fn dispatch(args: RootArgs) -> Result<Outcome> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match args.command {
        Command::Version => {
            print_version(&mut out)?;
            Ok(Outcome::Success)
        }
        Command::Start(start) => {
            // Policy checks run before any AWS call, including region discovery.
            let plan = StartPlan::from_args(&start)?;
            let session = Session::connect(&args.global, true)?;
            run_start(&session, &plan, &mut out)
        }
        Command::Watch(watch) => {
            let session = Session::connect(&args.global, true)?;
            run_watch(&session, &watch, &mut out)
        }
        Command::Util(util) => {
            // Every image in `util wait` names its own region.
            let discover_region = !matches!(util.command, UtilCommand::Wait(_));
            let session = Session::connect(&args.global, discover_region)?;
            match util.command {
                UtilCommand::Copy(copy) => run_copy(&session, &copy, &mut out),
                UtilCommand::Wait(wait) => run_wait(&session, &wait),
                UtilCommand::Share(share) => run_share(&session, &share),
            }
        }
    }
}

fn print_version(out: &mut dyn Write) -> Result<()> {
    writeln!(
        out,
        "Version: {}\nBuild Date: {}",
        env!("CARGO_PKG_VERSION"),
        option_env!("AMI_AUTOMATION_BUILD_DATE").unwrap_or("unknown")
    )?;
    Ok(())
}

fn no_region() -> anyhow::Error {
    anyhow!("no AWS region configured; pass --source-region or set AWS_REGION")
}

fn program_name() -> String {
    std::env::args()
        .next()
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}

pub(crate) fn write_json<T: Serialize>(out: &mut dyn Write, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize report")?;
    writeln!(out, "{json}").context("write report")?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::testing::{ManualClock, MemoryImages, MemoryObjects, ScriptedWorkflow, SharedBuffer};

    pub(crate) struct Fixture {
        pub(crate) workflow: Arc<ScriptedWorkflow>,
        pub(crate) images: Arc<MemoryImages>,
        pub(crate) buffer: SharedBuffer,
        pub(crate) session: Session,
    }

    pub(crate) fn fixture(workflow: ScriptedWorkflow) -> Fixture {
        fixture_in(Some("us-east-1"), workflow)
    }

    pub(crate) fn fixture_in(source_region: Option<&str>, workflow: ScriptedWorkflow) -> Fixture {
        let workflow = Arc::new(workflow);
        let images = Arc::new(MemoryImages::default().with_image("ami-1", "golden"));
        let buffer = SharedBuffer::default();
        let backend = Backend {
            workflow: workflow.clone(),
            images: images.clone(),
            access: images.clone(),
            objects: Arc::new(MemoryObjects::default()),
        };
        let session = Session::new(
            backend,
            source_region.map(str::to_string),
            PollPolicy::default(),
            Arc::new(ManualClock::new()),
            Progress::to_writer(buffer.clone(), false),
            "ami-automation".to_string(),
        );
        Fixture {
            workflow,
            images,
            buffer,
            session,
        }
    }
}
