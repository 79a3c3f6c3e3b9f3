use std::fs;

use libid::commands::TriageFlags;
use libid::{absolute_path, canonicalize_or_current};
use libid_core::services::triage::TriagePolicy;
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_resolves_existing_path() {
    let tmp = tempdir().expect("tempdir");
    let nested = tmp.path().join("nested");
    fs::create_dir_all(&nested).expect("create nested");
    let result = canonicalize_or_current(nested.to_str().unwrap()).expect("canonicalize");
    assert_eq!(result, nested.canonicalize().unwrap());
}

#[test]
fn canonicalize_or_current_joins_missing_relative_path() {
    let result = canonicalize_or_current("does-not-exist-libid").expect("fallback");
    assert!(result.is_absolute());
    assert!(result.ends_with("does-not-exist-libid"));
}

#[test]
fn absolute_path_keeps_absolute_input() {
    let tmp = tempdir().expect("tempdir");
    assert_eq!(absolute_path(tmp.path().to_str().unwrap()).unwrap(), tmp.path());
    assert!(absolute_path("fw.bin").unwrap().is_absolute());
}

#[test]
fn triage_flags_only_disable_checks() {
    let configured = TriagePolicy { ignore_strip: true, ..TriagePolicy::default() };
    let flags = TriageFlags { ignore_entropy: true, ..TriageFlags::default() };
    let policy = flags.apply(configured);
    assert!(policy.ignore_strip);
    assert!(policy.ignore_entropy);
    assert!(!policy.ignore_machine);
}

#[test]
fn ignore_flag_disables_every_check() {
    let flags = TriageFlags { ignore_all: true, ..TriageFlags::default() };
    let policy = flags.apply(TriagePolicy::default());
    assert!(policy.ignore_machine && policy.ignore_strip && policy.ignore_entropy);
    assert_eq!(policy.entropy_threshold, TriagePolicy::default().entropy_threshold);
}
