//! CLI argument parsing for the image-build workflow.
//!
//! Arguments only carry values; policy checks (such as sharing requiring a
//! wait) live with the commands so they can be tested without clap.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "ami-automation",
    version,
    about = "Run SSM Automation image builds, then copy and share the resulting AMI",
    after_help = "Examples:\n  ami-automation start --name BuildGoldenImage -p SourceAmiId=ami-0abc -r us-west-2 -w -a 123456789012\n  ami-automation watch --execution-id 5f2c...\n  ami-automation util copy --image-id ami-0abc -r eu-west-1 -w\n  ami-automation util wait -i ami-0abc -r us-east-1 -i ami-0def -r eu-west-1\n  ami-automation util share --image-id ami-0abc -a 123456789012",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Region that runs the automation and holds the source image
    #[arg(long, global = true, value_name = "REGION")]
    pub source_region: Option<String>,

    /// AWS CLI command prefix, e.g. "aws --profile build"
    #[arg(long, global = true, value_name = "CMD")]
    pub aws_command: Option<String>,

    /// Config file (defaults to <config dir>/ami-automation/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Seconds between status polls
    #[arg(long, global = true, value_name = "SECS")]
    pub poll_interval: Option<u64>,

    /// Give up waiting after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Disable colored progress output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit debug logs to stderr
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Start(StartArgs),
    Watch(WatchArgs),
    Util(UtilArgs),
    /// Output version information
    Version,
}

/// Start an automation execution and propagate the image it builds.
#[derive(Args, Debug, Clone, Default)]
#[command(about = "Start an SSM automation execution")]
pub struct StartArgs {
    /// SSM Automation document name
    #[arg(long = "name", value_name = "NAME")]
    pub document_name: String,

    /// Document version (defaults to the document's default version)
    #[arg(long, value_name = "VERSION")]
    pub document_version: Option<String>,

    /// Document input parameter, repeatable
    #[arg(short = 'p', long = "parameter", value_name = "KEY=VALUE")]
    pub parameters: Vec<String>,

    /// Region to copy the image to, repeatable
    #[arg(short = 'r', long = "region", value_name = "REGION", value_delimiter = ',')]
    pub regions: Vec<String>,

    /// Account to share images with, repeatable (requires --copy-wait)
    #[arg(short = 'a', long = "account", value_name = "ACCOUNT", value_delimiter = ',')]
    pub accounts: Vec<String>,

    /// Wait for copied images to be available
    #[arg(short = 'w', long)]
    pub copy_wait: bool,
}

#[derive(Args, Debug, Clone)]
#[command(about = "Follow an existing automation execution until it finishes")]
pub struct WatchArgs {
    /// Execution id printed by `start`
    #[arg(long, value_name = "ID")]
    pub execution_id: String,
}

#[derive(Args, Debug)]
#[command(about = "Image utilities")]
pub struct UtilArgs {
    #[command(subcommand)]
    pub command: UtilCommand,
}

#[derive(Subcommand, Debug)]
pub enum UtilCommand {
    Copy(CopyArgs),
    Wait(WaitArgs),
    Share(ShareArgs),
}

#[derive(Args, Debug, Clone)]
#[command(about = "Copy an image to other regions")]
pub struct CopyArgs {
    /// Source image id in the source region
    #[arg(long, value_name = "AMI")]
    pub image_id: String,

    /// Region to copy the image to, repeatable
    #[arg(short = 'r', long = "region", value_name = "REGION", value_delimiter = ',')]
    pub regions: Vec<String>,

    /// Wait for copied images to be available
    #[arg(short = 'w', long)]
    pub wait: bool,
}

#[derive(Args, Debug, Clone)]
#[command(about = "Wait for one or more images to be available")]
pub struct WaitArgs {
    /// Image id, repeatable; paired with --region by position
    #[arg(short = 'i', long = "image-id", value_name = "AMI", value_delimiter = ',')]
    pub image_ids: Vec<String>,

    /// Region hosting the image at the same position
    #[arg(short = 'r', long = "region", value_name = "REGION", value_delimiter = ',')]
    pub regions: Vec<String>,
}

#[derive(Args, Debug, Clone)]
#[command(about = "Share an image in the source region with other accounts")]
pub struct ShareArgs {
    /// Image id in the source region
    #[arg(long, value_name = "AMI")]
    pub image_id: String,

    /// Account to share with, repeatable
    #[arg(short = 'a', long = "account", value_name = "ACCOUNT", value_delimiter = ',')]
    pub accounts: Vec<String>,
}

/// Drop empty entries from a repeatable list flag.
pub fn non_empty_values(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}
