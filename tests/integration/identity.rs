//! Identity round trips against real extended attributes.
//!
//! Each test checks the scratch filesystem first and returns early when it
//! rejects user attributes (tmpfs on older kernels, some containers).

use filetime::FileTime;
use mediacache::error::ApiError;
use mediacache::hasher;
use mediacache::xstat::codec::{AttributeStore, XattrStore};
use mediacache::{EntryType, IdentityResolver};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const TEST_ATTRIBUTE: &str = "user.mediacache.test";

fn xattrs_supported(dir: &Path) -> bool {
    let marker = "user.mediacache.support";
    match XattrStore.set(dir, marker, b"1") {
        Ok(()) => {
            let _ = XattrStore.remove(dir, marker);
            true
        }
        Err(_) => {
            eprintln!("skipping: user xattrs unsupported under {}", dir.display());
            false
        }
    }
}

fn raw_attribute(path: &Path) -> Option<serde_json::Value> {
    XattrStore
        .get(path, TEST_ATTRIBUTE)
        .unwrap()
        .map(|raw| serde_json::from_slice(&raw).unwrap())
}

fn set_mtime(path: &Path, secs: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

#[test]
fn test_identity_persists_across_resolvers() {
    let temp = TempDir::new().unwrap();
    if !xattrs_supported(temp.path()) {
        return;
    }
    let file = temp.path().join("photo.jpg");
    fs::write(&file, b"pixels").unwrap();

    let first = IdentityResolver::new(TEST_ATTRIBUTE).read_identity(&file).unwrap();
    // a new resolver has no in-memory state: the attribute is the source of truth
    let second = IdentityResolver::new(TEST_ATTRIBUTE).read_identity(&file).unwrap();
    assert_eq!(first, second);

    let raw = raw_attribute(&file).unwrap();
    assert_eq!(raw["uuid"], first.uuid.to_string());
    assert_eq!(raw["type"], "file");
    assert_eq!(raw["mtime"], first.mtime);
    assert!(raw.get("hash").is_none());
}

#[test]
fn test_modification_invalidates_identity() {
    let temp = TempDir::new().unwrap();
    if !xattrs_supported(temp.path()) {
        return;
    }
    let file = temp.path().join("doc.txt");
    fs::write(&file, b"v1").unwrap();
    set_mtime(&file, 1_700_000_000);
    let resolver = IdentityResolver::new(TEST_ATTRIBUTE);

    let before = resolver.read_identity(&file).unwrap();
    let hashed = resolver
        .update_hash(&file, &before, hasher::hash_file(&file).unwrap(), None)
        .unwrap();
    assert_eq!(raw_attribute(&file).unwrap()["hash"], hashed.hash.unwrap().to_hex());

    fs::write(&file, b"v2").unwrap();
    set_mtime(&file, 1_700_000_060);
    let after = resolver.read_identity(&file).unwrap();

    assert_ne!(before.uuid, after.uuid);
    assert_eq!(after.mtime, 1_700_000_060_000);
    assert!(after.hash.is_none());
    assert_eq!(raw_attribute(&file).unwrap()["uuid"], after.uuid.to_string());
}

#[test]
fn test_corrupt_attribute_is_replaced() {
    let temp = TempDir::new().unwrap();
    if !xattrs_supported(temp.path()) {
        return;
    }
    let dir = temp.path().join("album");
    fs::create_dir(&dir).unwrap();
    XattrStore.set(&dir, TEST_ATTRIBUTE, b"hello").unwrap();

    let identity = IdentityResolver::new(TEST_ATTRIBUTE).read_identity(&dir).unwrap();
    assert_eq!(identity.entry_type, EntryType::Directory);
    assert_eq!(identity.name, "album");
    assert_eq!(raw_attribute(&dir).unwrap()["uuid"], identity.uuid.to_string());
}

#[test]
fn test_rename_keeps_uuid_and_refreshes_name() {
    let temp = TempDir::new().unwrap();
    if !xattrs_supported(temp.path()) {
        return;
    }
    let old = temp.path().join("old.png");
    let new = temp.path().join("new.png");
    fs::write(&old, b"data").unwrap();
    let resolver = IdentityResolver::new(TEST_ATTRIBUTE);

    let before = resolver.read_identity(&old).unwrap();
    fs::rename(&old, &new).unwrap();
    let after = resolver.read_identity(&new).unwrap();

    assert_eq!(before.uuid, after.uuid);
    assert_eq!(after.name, "new.png");
}

#[test]
fn test_symlink_not_supported() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    fs::write(&target, b"x").unwrap();
    let link = temp.path().join("link");
    std::os::unix::fs::symlink(&target, &link).unwrap();

    let err = IdentityResolver::new(TEST_ATTRIBUTE)
        .read_identity(&link)
        .unwrap_err();
    assert!(matches!(err, ApiError::NotSupportedType(_)));
}
