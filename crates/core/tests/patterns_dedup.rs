use std::fs;
use std::path::PathBuf;

use libid_core::patterns::{list_pattern_files, Deduplicator};
use tempfile::tempdir;

const BODY_A: &str = "AA 00 0000 0010 :0000 memcpy\n---\n";
const BODY_B: &str = "BB 00 0000 0010 :0000 memset\n---\n";

fn populate(dir: &std::path::Path) -> Vec<PathBuf> {
    fs::write(dir.join("_libc_one.pat"), BODY_A).unwrap();
    fs::write(dir.join("_libc_two.pat"), BODY_A).unwrap();
    fs::write(dir.join("_libc_three.pat"), BODY_B).unwrap();
    fs::write(dir.join("_libc_four.pat"), "CC 00 0000 0010 :0000 strlen :0004 x\n---\n").unwrap();
    list_pattern_files(dir).unwrap()
}

#[test]
fn identical_files_become_redirect_stubs() {
    let dir = tempdir().expect("tempdir");
    let files = populate(dir.path());
    let mut dedup = Deduplicator::new();
    let outcome = dedup.dedup(&files).unwrap();

    let one = dir.path().join("_libc_one.pat");
    let two = dir.path().join("_libc_two.pat");
    assert_eq!(outcome.redirects.len(), 1);
    assert_eq!(outcome.redirects.get(&two), Some(&one));
    assert_eq!(outcome.canonical.len(), 3);
    assert!(!outcome.canonical.contains(&two));
    assert_eq!(fs::read_to_string(&two).unwrap(), "_libc_one\n");
    assert_eq!(fs::read_to_string(&one).unwrap(), BODY_A);
}

#[test]
fn only_same_size_files_are_hashed() {
    let dir = tempdir().expect("tempdir");
    let files = populate(dir.path());
    let mut dedup = Deduplicator::new();
    dedup.dedup(&files).unwrap();
    // four (unique size) is never hashed; one, three, two share a size.
    assert_eq!(dedup.hashes_computed(), 3);
}

#[test]
fn second_run_is_a_no_op() {
    let dir = tempdir().expect("tempdir");
    let files = populate(dir.path());
    let mut dedup = Deduplicator::new();
    let first = dedup.dedup(&files).unwrap();
    let hashed = dedup.hashes_computed();
    let snapshot: Vec<String> =
        files.iter().map(|f| fs::read_to_string(f).unwrap()).collect();

    let second = dedup.dedup(&files).unwrap();
    assert_eq!(first, second);
    assert_eq!(dedup.hashes_computed(), hashed, "digests are memoized");
    let after: Vec<String> = files.iter().map(|f| fs::read_to_string(f).unwrap()).collect();
    assert_eq!(snapshot, after);

    let mut fresh = Deduplicator::new();
    assert_eq!(fresh.dedup(&files).unwrap(), first);
}

#[test]
fn rewritten_file_is_rehashed() {
    let dir = tempdir().expect("tempdir");
    let a = dir.path().join("_libc_a.pat");
    let b = dir.path().join("_libc_b.pat");
    fs::write(&a, BODY_A).unwrap();
    fs::write(&b, BODY_B).unwrap();
    let files = vec![a.clone(), b.clone()];
    let mut dedup = Deduplicator::new();
    assert!(dedup.dedup(&files).unwrap().redirects.is_empty());

    std::thread::sleep(std::time::Duration::from_millis(20));
    fs::write(&b, BODY_A).unwrap();
    let outcome = dedup.dedup(&files).unwrap();
    assert_eq!(outcome.redirects.get(&b), Some(&a));
}

#[test]
fn incomplete_files_are_skipped_but_stubs_are_kept() {
    let dir = tempdir().expect("tempdir");
    let mut files = populate(dir.path());
    let partial = dir.path().join("_libc_partial.pat");
    fs::write(&partial, "AA 00 0000 0010 :0000 half\n").unwrap();
    files.push(partial.clone());

    let mut dedup = Deduplicator::new();
    let first = dedup.dedup(&files).unwrap();
    assert!(!first.canonical.contains(&partial));
    assert!(!first.redirects.contains_key(&partial));

    // The stub written on the first run has no sentinel and is still reported.
    let second = Deduplicator::new().dedup(&files).unwrap();
    assert_eq!(second, first);
    assert_eq!(second.redirects.len(), 1);
}
