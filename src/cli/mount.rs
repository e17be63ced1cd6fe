//! Implementation of `magnifyfs mount` subcommand.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::mpsc,
    time::Duration,
};

use clap::Args;
use tracing::{info, instrument, warn};

use crate::{
    fs::{fuse, Config, MagnifyFs, MountSession, MountTarget},
    Error, Result,
};

#[derive(Debug, Clone, Args)]
pub struct MountArgs {
    /// Target real directory path
    #[arg(long = "real-path")]
    pub real_path: Option<PathBuf>,

    /// The directory the mirror will be mounted on
    #[arg(long = "mount-path")]
    pub mount_path: Option<PathBuf>,

    /// The magnification coefficient, multiplied into every regular file size
    #[arg(long = "coefficient", default_value_t = 1.0)]
    pub coefficient: f64,
}

#[derive(Debug)]
pub struct MountContext {
    pub fs: MagnifyFs,
    pub session: MountSession,
    pub fuse_handle: Option<fuse::MountHandle>,
}

pub fn execute(args: MountArgs) -> Result<()> {
    // Execute the mount and hold it until a termination signal is received.
    let mut ctx = mount(args)?;

    if let Some(handle) = ctx.fuse_handle.take() {
        info!("magnifyfs mount active; press Ctrl+C to unmount");

        #[derive(Debug)]
        enum Event {
            Signal,
            Unmounted,
        }

        let (tx, rx) = mpsc::channel();

        // Handle SIGINT/SIGTERM.
        ctrlc::set_handler({
            let tx = tx.clone();
            move || {
                let _ = tx.send(Event::Signal);
            }
        })
        .map_err(|e| Error::Cli(format!("failed to install signal handler: {e}")))?;

        // Watch for external unmounts.
        let mount_path = ctx.session.mount_path.clone();
        std::thread::spawn(move || loop {
            std::thread::sleep(Duration::from_millis(500));
            if !is_mounted(&mount_path) {
                let _ = tx.send(Event::Unmounted);
                break;
            }
        });

        match rx.recv() {
            Ok(Event::Signal) => {
                info!(
                    "signal received; unmounting {}",
                    ctx.session.mount_path.display()
                );
            }
            Ok(Event::Unmounted) => {
                info!(
                    "detected external unmount; exiting for {}",
                    ctx.session.mount_path.display()
                );
            }
            Err(_) => {}
        }
        // Joining also reaps the background session after an external unmount.
        handle.unmount();
        ctx.session.mark_unmounted();
        info!(mount_id = %ctx.session.mount_id, "mount closed");
    }

    Ok(())
}

/// Check if a path is currently mounted (Linux-only, /proc/mounts).
fn is_mounted(path: &Path) -> bool {
    if let Ok(contents) = fs::read_to_string("/proc/mounts") {
        let target = path.to_string_lossy();
        return contents
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .any(|p| p == target);
    }
    false
}

/// Validate the arguments and start the FUSE session. Used by both the CLI
/// and tests.
#[instrument(skip(args), fields(real = ?args.real_path, mnt = ?args.mount_path, coefficient = args.coefficient))]
pub fn mount(args: MountArgs) -> Result<MountContext> {
    let real_path = args
        .real_path
        .ok_or_else(|| Error::Cli("real_path is required".into()))?;
    let mount_path = args
        .mount_path
        .ok_or_else(|| Error::Cli("mount_path is required".into()))?;

    if !real_path.is_dir() {
        return Err(Error::InvalidRealPath(real_path.display().to_string()).into());
    }
    let real_path = fs::canonicalize(&real_path)?;
    let config = Config::new(&real_path, args.coefficient)?;

    let target = MountTarget::new(&mount_path);
    target.validate_dir()?;
    let mount_path = fs::canonicalize(&mount_path)?;
    info!("validated real and target directories");

    let magnify = MagnifyFs::new(config);
    let mut session = MountSession::new(&real_path, &mount_path);

    let fuse_handle = match fuse::spawn_mount(&magnify, &mount_path) {
        Ok(handle) => handle,
        Err(err) => {
            session.mark_failed(err.to_string());
            warn!(mount_id = %session.mount_id, error = ?session.error, "mount failed");
            return Err(err);
        }
    };
    info!(mountpoint = fuse_handle.mountpoint(), "fuse mounted");

    session.mark_ready();
    info!(mount_id = %session.mount_id, "mount ready");

    Ok(MountContext {
        fs: magnify,
        session,
        fuse_handle: Some(fuse_handle),
    })
}
