use std::{
    os::unix::fs::MetadataExt,
    time::{Duration, UNIX_EPOCH},
};

use magnifyfs::fs::attr::{magnify_size, translate, NodeKind, RealMetadata};
use magnifyfs::fs::NodeError;

fn real(kind: NodeKind, size: u64) -> RealMetadata {
    RealMetadata {
        kind,
        size,
        mode: 0o100644,
        dev: 64_769,
        ino: 4242,
        nlink: 1,
        uid: 1000,
        gid: 1000,
        atime: UNIX_EPOCH + Duration::from_secs(10),
        mtime: UNIX_EPOCH + Duration::from_secs(20),
        ctime: UNIX_EPOCH + Duration::from_secs(30),
    }
}

#[test]
fn file_sizes_are_multiplied_and_truncated() -> magnifyfs::Result<()> {
    assert_eq!(15, translate(&real(NodeKind::File, 10), 1.5)?.size);
    assert_eq!(10, translate(&real(NodeKind::File, 7), 1.5)?.size);
    assert_eq!(200, translate(&real(NodeKind::File, 100), 2.0)?.size);
    assert_eq!(3, translate(&real(NodeKind::File, 7), 0.5)?.size);
    assert_eq!(0, translate(&real(NodeKind::File, 0), 3.0)?.size);
    Ok(())
}

#[test]
fn coefficient_of_one_is_identity() -> magnifyfs::Result<()> {
    let attr = translate(&real(NodeKind::File, 123_456), 1.0)?;
    assert_eq!(123_456, attr.size);
    Ok(())
}

#[test]
fn directory_sizes_pass_through() -> magnifyfs::Result<()> {
    let attr = translate(&real(NodeKind::Directory, 4096), 2.0)?;
    assert_eq!(4096, attr.size);
    assert_eq!(NodeKind::Directory, attr.kind);
    Ok(())
}

#[test]
fn other_fields_are_copied_verbatim() -> magnifyfs::Result<()> {
    let meta = real(NodeKind::File, 100);
    let attr = translate(&meta, 2.0)?;

    assert_eq!((meta.dev, meta.ino), (attr.dev, attr.ino));
    assert_eq!(meta.mode, attr.mode);
    assert_eq!(0o644, attr.perm());
    assert_eq!(meta.mtime, attr.mtime);
    assert_eq!(meta.ctime, attr.ctime);
    assert_eq!(meta.atime, attr.atime);
    assert_eq!((meta.uid, meta.gid, meta.nlink), (attr.uid, attr.gid, attr.nlink));
    Ok(())
}

#[test]
fn blocks_follow_the_reported_size() -> magnifyfs::Result<()> {
    assert_eq!(2, translate(&real(NodeKind::File, 300), 2.0)?.blocks);
    assert_eq!(0, translate(&real(NodeKind::File, 0), 2.0)?.blocks);
    Ok(())
}

#[test]
fn missing_inode_is_unsupported_metadata() {
    let mut meta = real(NodeKind::File, 1);
    meta.ino = 0;
    let err = translate(&meta, 1.0).expect_err("inode 0 must be rejected");
    assert!(matches!(err, NodeError::UnsupportedMetadata(_)));
}

#[test]
fn oversized_products_saturate() {
    assert_eq!(u64::MAX, magnify_size(u64::MAX, 4.0));
    assert_eq!(0, magnify_size(10, -1.0));
}

#[test]
fn probe_reads_real_metadata() -> magnifyfs::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("f");
    std::fs::write(&path, b"0123456789")?;

    let meta = RealMetadata::probe(&path)?;
    assert_eq!(NodeKind::File, meta.kind);
    assert_eq!(10, meta.size);
    assert_ne!(0, meta.ino);
    assert_eq!(std::fs::metadata(&path)?.dev(), meta.dev);

    let dir_meta = RealMetadata::probe(dir.path())?;
    assert_eq!(NodeKind::Directory, dir_meta.kind);

    let err = RealMetadata::probe(&dir.path().join("missing")).expect_err("missing path");
    assert!(err.is_not_found());
    Ok(())
}
