//! Implementation of `magnifyfs unmount` subcommand.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use clap::Args;
use tracing::info;

use crate::{Error, Result};

#[derive(Debug, Clone, Args)]
pub struct UnmountArgs {
    /// Path to an existing magnifyfs mount point
    #[arg(long = "mount-path")]
    pub mount_path: Option<PathBuf>,
}

pub fn execute(args: UnmountArgs) -> Result<()> {
    let mount_path = args
        .mount_path
        .ok_or_else(|| Error::Cli("mount_path is required".into()))?;

    perform_unmount(&mount_path)
}

/// Validate the mount point and detach it.
pub fn perform_unmount(mount_path: &Path) -> Result<()> {
    if !mount_path.is_dir() {
        return Err(Error::InvalidTargetDir(mount_path.display().to_string()).into());
    }

    system_unmount(mount_path)?;
    info!(mount_path = %mount_path.display(), "unmounted");
    Ok(())
}

/// Execute an OS-level unmount. Tries `fusermount -u` first, then `umount`.
pub fn system_unmount(mount_path: &Path) -> Result<()> {
    let path_string = mount_path.to_string_lossy().to_string();
    let candidates = [
        ("fusermount", vec!["-u", path_string.as_str()]),
        ("umount", vec![path_string.as_str()]),
    ];

    let mut saw_not_mounted = false;
    let mut last_stderr: Option<String> = None;

    for (cmd, args) in candidates {
        match Command::new(cmd).args(args).output() {
            Ok(output) => {
                if output.status.success() {
                    return Ok(());
                }

                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let stderr_lower = stderr.to_lowercase();

                if stderr_lower.contains("not mounted")
                    || stderr_lower.contains("not found in /etc/mtab")
                {
                    saw_not_mounted = true;
                    last_stderr = Some(stderr);
                    continue;
                }

                if stderr_lower.contains("device or resource busy")
                    || stderr_lower.contains("target is busy")
                {
                    return Err(Error::Cli(format!(
                        "target is busy: {} ({cmd} failed: {})",
                        mount_path.display(),
                        stderr.trim()
                    ))
                    .into());
                }

                last_stderr = Some(stderr);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(Error::Io(err).into()),
        }
    }

    if saw_not_mounted {
        return Err(Error::NotMounted(mount_path.display().to_string()).into());
    }

    if let Some(stderr) = last_stderr {
        return Err(Error::Cli(format!(
            "failed to unmount {}: {}",
            mount_path.display(),
            stderr.trim()
        ))
        .into());
    }

    Err(Error::NotMounted(mount_path.display().to_string()).into())
}
