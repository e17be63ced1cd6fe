//! CLI contract tests for magnifyfs argument validation.

use magnifyfs::Error;
use tempfile::tempdir;

fn expect_error(args: &[&str], expected: Error) {
    let err = magnifyfs::run(args.iter().copied()).expect_err("command should fail");
    let actual = err
        .downcast_ref::<Error>()
        .unwrap_or_else(|| panic!("unexpected error type: {err:?}"));
    match expected {
        Error::Cli(ref expected_msg) => {
            assert!(matches!(actual, Error::Cli(msg) if msg == expected_msg));
        }
        _ => {
            assert_eq!(
                std::mem::discriminant(actual),
                std::mem::discriminant(&expected)
            );
        }
    }
}

#[test]
fn mount_requires_real_and_mount_paths() {
    expect_error(
        &["magnifyfs", "mount"],
        Error::Cli("real_path is required".into()),
    );

    let real = tempdir().unwrap();
    expect_error(
        &[
            "magnifyfs",
            "mount",
            "--real-path",
            real.path().to_str().unwrap(),
        ],
        Error::Cli("mount_path is required".into()),
    );
}

#[test]
fn mount_rejects_missing_real_directory() {
    let target = tempdir().unwrap();
    expect_error(
        &[
            "magnifyfs",
            "mount",
            "--real-path",
            "/no/such/real/path",
            "--mount-path",
            target.path().to_str().unwrap(),
        ],
        Error::InvalidRealPath(String::new()),
    );
}

#[test]
fn mount_rejects_non_positive_coefficient() {
    let real = tempdir().unwrap();
    let target = tempdir().unwrap();
    for coefficient in ["--coefficient=0", "--coefficient=-2.5"] {
        expect_error(
            &[
                "magnifyfs",
                "mount",
                "--real-path",
                real.path().to_str().unwrap(),
                "--mount-path",
                target.path().to_str().unwrap(),
                coefficient,
            ],
            Error::InvalidCoefficient(String::new()),
        );
    }
}

#[test]
fn mount_rejects_missing_target_directory() {
    let real = tempdir().unwrap();
    expect_error(
        &[
            "magnifyfs",
            "--debug",
            "mount",
            "--real-path",
            real.path().to_str().unwrap(),
            "--mount-path",
            "/no/such/mount/path",
        ],
        Error::InvalidTargetDir(String::new()),
    );
}

#[test]
fn unmount_requires_mount_path() {
    expect_error(
        &["magnifyfs", "unmount"],
        Error::Cli("mount_path is required".into()),
    );

    let err = magnifyfs::run(["magnifyfs", "unmount", "--mount-path", "/no/such/path"])
        .expect_err("invalid path should fail");
    let actual = err
        .downcast_ref::<Error>()
        .expect("should downcast to magnifyfs::Error");
    assert!(matches!(actual, Error::InvalidTargetDir(_)));
}

#[test]
fn help_lists_subcommands_and_flags() {
    let mut cmd = magnifyfs::cli::clap_command();
    let help = cmd.render_long_help().to_string();
    assert!(help.contains("mount"));
    assert!(help.contains("unmount"));
    assert!(help.contains("--debug"));
    assert!(help.contains("--log-format"));

    let mount = cmd
        .find_subcommand_mut("mount")
        .expect("mount subcommand");
    let mount_help = mount.render_long_help().to_string();
    assert!(mount_help.contains("--real-path"));
    assert!(mount_help.contains("--mount-path"));
    assert!(mount_help.contains("--coefficient"));
}
