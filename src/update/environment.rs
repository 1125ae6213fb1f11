//! Install type detection

use crate::config::UpdateConfig;
use std::path::{Path, PathBuf};

/// Prefixes of system-wide installs managed by a package manager
const SYSTEM_PREFIXES: [&str; 2] = ["/usr/", "/opt/"];

/// How the running program is installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEnvironment {
    /// Single-file AppImage at `path`
    AppImageBinary { path: PathBuf },

    /// Installed system-wide, updated through the package manager
    SystemInstalled { exec_path: PathBuf },

    /// Anything else
    Unknown { exec_path: PathBuf },
}

impl InstallEnvironment {
    /// Classify the install described by `config`
    pub fn detect(config: &UpdateConfig) -> Self {
        if let Some(path) = config
            .appimage_path
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty())
        {
            return Self::AppImageBinary { path: path.clone() };
        }

        let exec_path = config.exec_path.clone();
        if config.is_linux && is_system_path(&exec_path) {
            Self::SystemInstalled { exec_path }
        } else {
            Self::Unknown { exec_path }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::AppImageBinary { .. } => "AppImage",
            Self::SystemInstalled { .. } => "system install",
            Self::Unknown { .. } => "unknown install",
        }
    }
}

fn is_system_path(path: &Path) -> bool {
    let path = path.to_string_lossy();
    SYSTEM_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}
