//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod config;
pub mod diff;
pub mod locate;
pub mod manifest;
pub mod run;

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::core::job::{TargetIdentity, TargetPlatform};

/// Identity of the app being built
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Application name
    #[arg(short, long)]
    pub name: String,

    /// Organization id (preferred over the name for install paths)
    #[arg(long)]
    pub org_id: Option<String>,

    /// Organization name
    #[arg(long)]
    pub org_name: Option<String>,

    /// Target platform (windows, macos, linux); repeatable, defaults to the host
    #[arg(short, long = "platform")]
    pub platforms: Vec<TargetPlatform>,
}

impl TargetArgs {
    pub fn identity(&self) -> TargetIdentity {
        let mut target = TargetIdentity::new(&self.name);
        if let Some(id) = &self.org_id {
            target = target.with_organization_id(id);
        }
        if let Some(name) = &self.org_name {
            target = target.with_organization_name(name);
        }
        if self.platforms.is_empty() {
            return target.with_platform(TargetPlatform::current());
        }
        self.platforms
            .iter()
            .fold(target, |target, platform| target.with_platform(*platform))
    }

    /// Platform used to look up a prior installation
    pub fn lookup_platform(&self) -> TargetPlatform {
        self.platforms
            .first()
            .copied()
            .unwrap_or_else(TargetPlatform::current)
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fingerprint a source tree
    Manifest {
        /// Source directory
        dir: PathBuf,

        /// Application name
        #[arg(short, long)]
        name: String,

        /// Application version
        #[arg(long = "app-version")]
        app_version: String,

        /// Write the manifest here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare a source tree with the installed or a given previous build
    Diff {
        /// Source directory
        dir: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// Application version
        #[arg(long = "app-version")]
        app_version: String,

        /// Compare against this manifest instead of looking up an installation
        #[arg(long)]
        previous: Option<PathBuf>,
    },

    /// Find the installed build of an app
    Locate {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Extract an archive and build installers for it
    Run {
        /// Source archive or directory
        #[arg(short, long)]
        archive: PathBuf,

        /// Upload session the archive belongs to
        #[arg(short, long)]
        session: String,

        #[command(flatten)]
        target: TargetArgs,

        /// Application version
        #[arg(long = "app-version")]
        app_version: String,

        /// Dispatch priority; lower runs first
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        priority: i32,
    },

    /// Show the effective configuration
    Config {
        /// Print only the config file path
        #[arg(long)]
        path: bool,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self) -> Result<()> {
        match self {
            Self::Manifest {
                dir,
                name,
                app_version,
                output,
            } => manifest::execute(&dir, &name, &app_version, output.as_deref()).await,
            Self::Diff {
                dir,
                target,
                app_version,
                previous,
            } => diff::execute(&dir, &target, &app_version, previous.as_deref()).await,
            Self::Locate { target } => locate::execute(&target).await,
            Self::Run {
                archive,
                session,
                target,
                app_version,
                priority,
            } => {
                let options = run::RunOptions {
                    archive,
                    session,
                    target: target.identity(),
                    app_version,
                    priority,
                };
                run::execute(options).await
            }
            Self::Config { path } => config::execute(path).await,
        }
    }
}
