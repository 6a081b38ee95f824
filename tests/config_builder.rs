use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use selfie::{Mode, SelfieConfig, SelfieError};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let base = std::env::temp_dir();
    base.join(format!("selfietest-builder-{prefix}-{pid}-{t}-{id}"))
}

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |k| map.get(k).cloned()
}

#[test]
fn defaults_follow_manifest_dir_and_ci() -> Result<()> {
    let cfg = SelfieConfig::from_lookup(env_of(&[("CARGO_MANIFEST_DIR", "/work/crate")]))?;
    assert_eq!(cfg.mode, Mode::Interactive);
    assert_eq!(cfg.root_folder, PathBuf::from("/work/crate"));
    assert_eq!(cfg.snapshot_folder_name, None);
    assert!(cfg.allow_multiple_equivalent_writes);
    assert_eq!(cfg.unix_newlines, None);

    // CI без явного режима => readonly
    let cfg = SelfieConfig::from_lookup(env_of(&[("CI", "true"), ("CARGO_MANIFEST_DIR", "/w")]))?;
    assert_eq!(cfg.mode, Mode::Readonly);

    // явный режим сильнее CI
    let cfg = SelfieConfig::from_lookup(env_of(&[
        ("CI", "1"),
        ("selfie", "OVERWRITE"),
        ("CARGO_MANIFEST_DIR", "/w"),
    ]))?;
    assert_eq!(cfg.mode, Mode::Overwrite);
    Ok(())
}

#[test]
fn explicit_variables_override_defaults() -> Result<()> {
    let cfg = SelfieConfig::from_lookup(env_of(&[
        ("SELFIE", "readonly"),
        ("SELFIE_ROOT", "/repo"),
        ("CARGO_MANIFEST_DIR", "/ignored"),
        ("SELFIE_SNAPSHOT_FOLDER", "__snapshots__"),
        ("SELFIE_ALLOW_EQUIVALENT_WRITES", "0"),
        ("SELFIE_UNIX_NEWLINES", "false"),
    ]))?;
    assert_eq!(cfg.mode, Mode::Readonly);
    assert_eq!(cfg.root_folder, PathBuf::from("/repo"));
    assert_eq!(cfg.snapshot_folder_name.as_deref(), Some("__snapshots__"));
    assert!(!cfg.allow_multiple_equivalent_writes);
    assert_eq!(cfg.unix_newlines, Some(false));

    let shown = cfg.to_string();
    assert!(shown.contains("mode: readonly"), "{}", shown);
    assert!(shown.contains("unix_newlines: false"), "{}", shown);
    Ok(())
}

#[test]
fn unknown_mode_is_rejected() {
    let err = SelfieConfig::from_lookup(env_of(&[("SELFIE", "sometimes"), ("CARGO_MANIFEST_DIR", "/w")]))
        .unwrap_err();
    match err.downcast_ref::<SelfieError>() {
        Some(SelfieError::InvalidArgument(msg)) => assert!(msg.contains("sometimes"), "{}", msg),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn build_infers_newlines_from_project_files() -> Result<()> {
    let root = unique_root("newlines");
    fs::create_dir_all(root.join("src"))?;
    fs::write(root.join("src/lib.rs"), "pub fn a() {}\r\npub fn b() {}\r\n")?;
    // скрытые каталоги не учитываются
    fs::create_dir_all(root.join(".git"))?;
    fs::write(root.join(".git/HEAD"), "ref: refs/heads/main\n")?;

    let cfg = SelfieConfig::default().with_root_folder(&root).build();
    assert_eq!(cfg.unix_newlines, Some(false));

    // явное значение не перезаписывается
    let cfg = SelfieConfig::default()
        .with_root_folder(&root)
        .with_unix_newlines(Some(true))
        .build();
    assert_eq!(cfg.unix_newlines, Some(true));

    let empty = unique_root("empty");
    fs::create_dir_all(&empty)?;
    let cfg = SelfieConfig::default().with_root_folder(&empty).build();
    assert_eq!(cfg.unix_newlines, Some(true));

    let _ = fs::remove_dir_all(&root);
    let _ = fs::remove_dir_all(&empty);
    Ok(())
}
