use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use selfie::lock::{acquire_exclusive_lock, try_acquire_exclusive_lock, LOCK_FILE};
use selfie::metrics;
use selfie::{expect_selfie, Mode, SelfieConfig, SnapshotSystem};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("selfietest-lock-{prefix}-{pid}-{t}-{id}"))
}

#[test]
fn rewrite_lock_is_exclusive() -> Result<()> {
    let root = unique_root("excl");
    let guard = acquire_exclusive_lock(&root)?;
    assert_eq!(guard.path(), root.join(LOCK_FILE).as_path());
    assert!(try_acquire_exclusive_lock(&root).is_err());
    drop(guard);

    // после Drop лок снова свободен
    let again = try_acquire_exclusive_lock(&root)?;
    drop(again);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn counters_move_with_the_engine() -> Result<()> {
    // счётчики глобальные: сравниваем только приращения
    let before = metrics::snapshot();

    let root = unique_root("metrics");
    let cfg = SelfieConfig::default()
        .with_root_folder(&root)
        .with_mode(Mode::Overwrite)
        .with_unix_newlines(Some(true));
    let system = SnapshotSystem::open(cfg)?;
    system.run_test("tests/counted.rs", "one", |disk| {
        expect_selfie(disk, "1").to_match_disk()?;
        expect_selfie(disk, "2").to_match_disk_sub("two")?;
        Ok(())
    })?;
    system.finished_all_tests()?;
    system.close()?;

    let after = metrics::snapshot();
    assert!(after.disk_writes_recorded >= before.disk_writes_recorded + 2);
    assert!(after.snapshot_files_written >= before.snapshot_files_written + 1);
    assert!(root.join("tests/counted.ss").exists());
    let _ = fs::remove_dir_all(&root);
    Ok(())
}
