//! Prior installation lookup
//!
//! Finds where a previous build of a target was installed by probing the
//! platform's conventional install locations, in a fixed order, for the
//! reserved manifest file. The first hit wins.
//!
//! Candidate order:
//!
//! - Windows: per-user `Programs` (packaged `resources/app`, then the
//!   install root), per-user organization folder, `Program Files`
//!   organization folder, `Program Files`
//! - macOS: `/Applications` bundle, `~/Applications` bundle, Application
//!   Support organization folder, Application Support
//! - Linux: `/opt` organization folder, `/opt`, data-dir organization
//!   folder, data dir, `/usr/share`
//!
//! Organization folders use the organization id when present, else its name.

use std::env;
use std::path::{Path, PathBuf};

use crate::config::defaults::MANIFEST_FILE_NAME;
use crate::core::job::{TargetIdentity, TargetPlatform};

/// Environment variable that confines every install root to one directory
pub const ENV_INSTALL_ROOT: &str = "BUNDLESMITH_INSTALL_ROOT";

/// Base directories candidates are built from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallRoots {
    /// User home directory
    pub home: Option<PathBuf>,
    /// Per-user local data (`%LOCALAPPDATA%` on Windows)
    pub local_data: Option<PathBuf>,
    /// Per-user data (`~/Library/Application Support`, `~/.local/share`)
    pub data: Option<PathBuf>,
    /// `%ProgramFiles%`
    pub program_files: Option<PathBuf>,
    /// Filesystem root for system-wide locations (`/opt`, `/Applications`)
    pub system_root: PathBuf,
}

impl InstallRoots {
    /// Roots of the running machine
    pub fn detect() -> Self {
        Self {
            home: dirs::home_dir(),
            local_data: dirs::data_local_dir(),
            data: dirs::data_dir(),
            program_files: env::var_os("ProgramFiles").map(PathBuf::from),
            system_root: PathBuf::from("/"),
        }
    }

    /// [`under`](Self::under) `BUNDLESMITH_INSTALL_ROOT` if set, else [`detect`](Self::detect)
    pub fn from_env() -> Self {
        match env::var_os(ENV_INSTALL_ROOT) {
            Some(base) => Self::under(Path::new(&base)),
            None => Self::detect(),
        }
    }

    /// All roots under a single directory (for sandboxes and tests)
    pub fn under(base: &Path) -> Self {
        Self {
            home: Some(base.join("home")),
            local_data: Some(base.join("local")),
            data: Some(base.join("data")),
            program_files: Some(base.join("program-files")),
            system_root: base.to_path_buf(),
        }
    }
}

/// Searches candidate install locations for a target's manifest
#[derive(Debug, Clone)]
pub struct InstallationLocator {
    roots: InstallRoots,
    platform: TargetPlatform,
}

impl Default for InstallationLocator {
    fn default() -> Self {
        Self::new(InstallRoots::from_env(), TargetPlatform::current())
    }
}

impl InstallationLocator {
    pub fn new(roots: InstallRoots, platform: TargetPlatform) -> Self {
        Self { roots, platform }
    }

    pub fn platform(&self) -> TargetPlatform {
        self.platform
    }

    /// Ordered install-root candidates for `target`
    pub fn candidates(&self, target: &TargetIdentity) -> Vec<PathBuf> {
        let app = target.app_name.as_str();
        let org = target.organization_segment();
        let roots = &self.roots;
        let mut out = Vec::new();

        match self.platform {
            TargetPlatform::Windows => {
                if let Some(local) = &roots.local_data {
                    let programs = local.join("Programs").join(app);
                    out.push(programs.join("resources").join("app"));
                    out.push(programs);
                    if let Some(org) = org {
                        out.push(local.join(org).join(app));
                    }
                }
                if let Some(program_files) = &roots.program_files {
                    if let Some(org) = org {
                        out.push(program_files.join(org).join(app));
                    }
                    out.push(program_files.join(app));
                }
            }
            TargetPlatform::Macos => {
                let bundle = format!("{app}.app");
                out.push(app_bundle_resources(&roots.system_root.join("Applications"), &bundle));
                if let Some(home) = &roots.home {
                    out.push(app_bundle_resources(&home.join("Applications"), &bundle));
                }
                if let Some(data) = &roots.data {
                    if let Some(org) = org {
                        out.push(data.join(org).join(app));
                    }
                    out.push(data.join(app));
                }
            }
            TargetPlatform::Linux => {
                let opt = roots.system_root.join("opt");
                if let Some(org) = org {
                    out.push(opt.join(org).join(app));
                }
                out.push(opt.join(app));
                if let Some(data) = &roots.data {
                    if let Some(org) = org {
                        out.push(data.join(org).join(app));
                    }
                    out.push(data.join(app));
                }
                out.push(roots.system_root.join("usr").join("share").join(app));
            }
        }

        out
    }

    /// First candidate that holds a manifest, if any
    ///
    /// Not finding one is a normal outcome: the target is built fresh.
    pub fn locate(&self, target: &TargetIdentity) -> Option<PathBuf> {
        let found = self
            .candidates(target)
            .into_iter()
            .find(|dir| manifest_path(dir).is_file());

        match &found {
            Some(dir) => tracing::debug!("Found prior installation of {target} at {}", dir.display()),
            None => tracing::debug!("No prior installation of {target}"),
        }
        found
    }
}

/// Path of the manifest inside an install root
pub fn manifest_path(install_dir: &Path) -> PathBuf {
    install_dir.join(MANIFEST_FILE_NAME)
}

fn app_bundle_resources(apps_dir: &Path, bundle: &str) -> PathBuf {
    apps_dir
        .join(bundle)
        .join("Contents")
        .join("Resources")
        .join("app")
}
