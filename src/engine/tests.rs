use super::*;
use crate::cancel::{CancelReason, CancelSignal};
use crate::mode::WriteMode;
use crate::pool::{FileHandle, PoolError};
use crate::results::NULL_TARGET_KEY;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

fn paths(dir: &TempDir, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| dir.path().join(format!("target_{i}.txt")))
        .collect()
}

fn engine_for(paths: &[PathBuf], mode: WriteMode, message: &str) -> WriteEngine {
    WriteEngine::new(
        Some(targets_from_paths(paths.iter().cloned())),
        Some(mode),
        Some(message.to_string()),
        16,
        3,
        1,
    )
}

#[test]
fn test_append_to_every_target() -> Result<(), WriteError> {
    let dir = tempdir().unwrap();
    let files = paths(&dir, 2);
    let engine = WriteEngine::new(
        Some(targets_from_paths(files.iter().cloned())),
        Some(WriteMode::Append),
        Some("Hello, World!".to_string()),
        16,
        3,
        100,
    );

    let results = engine.write(2)?;
    assert_eq!(results.total, 2);
    assert_eq!(results.success, 2);
    assert_eq!(results.failure, 0);
    assert_eq!(results.success_rate, 1.0);
    assert!(results.info.is_empty());
    for file in &files {
        assert_eq!(fs::read_to_string(file).unwrap(), "Hello, World!");
    }
    Ok(())
}

#[test]
fn test_null_target_is_counted_as_failure() -> Result<(), WriteError> {
    let dir = tempdir().unwrap();
    let files = paths(&dir, 2);
    let targets = vec![
        Some(Target::new(&files[0])),
        None,
        Some(Target::new(&files[1])),
    ];
    let engine = WriteEngine::new(
        Some(targets),
        Some(WriteMode::Append),
        Some("x".to_string()),
        16,
        3,
        1,
    );

    let results = engine.write(0)?;
    assert_eq!(results.total, 3);
    assert_eq!(results.success, 2);
    assert_eq!(results.failure, 1);
    assert_eq!(
        results.info.get(NULL_TARGET_KEY).map(String::as_str),
        Some("received null target")
    );
    assert_eq!(results.failures.len(), 1);
    assert_eq!(results.failures[0].target, None);
    Ok(())
}

#[test]
fn test_pre_cancelled_signal_touches_nothing() {
    let dir = tempdir().unwrap();
    let files = paths(&dir, 3);
    let engine = engine_for(&files, WriteMode::Append, "never");

    let signal = CancelSignal::new();
    signal.cancel();
    engine.set_cancel_signal(signal);

    let err = engine.write(0).unwrap_err();
    assert!(matches!(err, WriteError::Cancelled(CancelReason::Cancelled)));
    assert!(files.iter().all(|f| !f.exists()));
    assert!(engine.pool().is_empty());
}

#[test]
fn test_unconfigured_engine_fails_fast() {
    let engine = WriteEngine::new(
        Some(Vec::new()),
        None,
        Some("msg".to_string()),
        4,
        0,
        0,
    );
    assert_eq!(engine.state(), EngineState::Unconfigured);
    assert!(matches!(engine.write(1), Err(WriteError::NotConfigured("mode"))));
    assert!(matches!(
        engine.set_mode(WriteMode::Append),
        Err(WriteError::NotConfigured("mode"))
    ));
    assert!(matches!(engine.set_retries(5), Err(WriteError::NotConfigured(_))));
    assert_eq!(engine.retries(), 0);
    assert_eq!(engine.state(), EngineState::Unconfigured);
}

#[test]
fn test_empty_target_set_is_rejected() {
    let engine = WriteEngine::new(
        Some(Vec::new()),
        Some(WriteMode::Append),
        Some("msg".to_string()),
        4,
        0,
        0,
    );
    assert_eq!(engine.state(), EngineState::Ready);
    assert!(matches!(engine.write(1), Err(WriteError::EmptyTargets)));
}

#[test]
fn test_repeated_writes_return_to_ready() -> Result<(), WriteError> {
    let dir = tempdir().unwrap();
    let files = paths(&dir, 4);
    let engine = engine_for(&files, WriteMode::Append, "ab");

    let first = engine.write(2)?;
    assert_eq!(engine.state(), EngineState::Ready);
    let second = engine.write(2)?;

    assert_eq!(first.total, 4);
    assert_eq!(second.total, 4);
    assert_eq!(second.success, 4);
    for file in &files {
        assert_eq!(fs::read_to_string(file).unwrap(), "abab");
    }
    Ok(())
}

#[test]
fn test_truncate_mode_replaces_contents() -> Result<(), WriteError> {
    let dir = tempdir().unwrap();
    let files = paths(&dir, 2);
    for file in &files {
        fs::write(file, "previous contents").unwrap();
    }

    let results = engine_for(&files, WriteMode::Truncate, "new").write(0)?;
    assert!(results.is_complete_success());
    for file in &files {
        assert_eq!(fs::read_to_string(file).unwrap(), "new");
    }
    Ok(())
}

#[test]
fn test_open_failure_is_isolated() -> Result<(), WriteError> {
    let dir = tempdir().unwrap();
    let mut files = paths(&dir, 3);
    let unreachable = dir.path().join("missing-dir").join("target.txt");
    files.push(unreachable.clone());

    let engine = engine_for(&files, WriteMode::Append, "ok");
    let results = engine.write(4)?;
    assert_eq!(results.total, 4);
    assert_eq!(results.success, 3);
    assert_eq!(results.failure, 1);
    assert_eq!(results.failures[0].target.as_deref(), Some(unreachable.as_path()));
    assert!(results.failures[0]
        .error
        .starts_with("exhausted retries after 3 attempts"));
    assert!(results.info[&unreachable.display().to_string()].starts_with("error opening file"));
    assert!(!unreachable.exists());
    assert!(!engine.pool().contains(&unreachable));
    Ok(())
}

#[test]
fn test_open_is_retried_until_parent_appears() -> Result<(), WriteError> {
    let dir = tempdir().unwrap();
    let late_dir = dir.path().join("late");
    let target = late_dir.join("f");

    let engine = WriteEngine::new(
        Some(targets_from_paths([&target])),
        Some(WriteMode::Append),
        Some("eventually".to_string()),
        4,
        3,
        300,
    );
    let creator = std::thread::spawn({
        let late_dir = late_dir.clone();
        move || {
            std::thread::sleep(Duration::from_millis(100));
            fs::create_dir(&late_dir).unwrap();
        }
    });

    let results = engine.write(1)?;
    creator.join().unwrap();

    assert_eq!(results.success, 1);
    assert_eq!(results.failure, 0);
    // The failed first attempt still leaves its diagnostic
    assert!(results.info[&target.display().to_string()].starts_with("error opening file"));
    assert_eq!(fs::read_to_string(&target).unwrap(), "eventually");
    assert!(engine.check_conn(&target).is_ok());
    Ok(())
}

#[test]
fn test_deadline_cuts_backoff_short() -> Result<(), WriteError> {
    let dir = tempdir().unwrap();
    let unreachable: Vec<PathBuf> = (0..4)
        .map(|i| dir.path().join("never").join(format!("t{i}")))
        .collect();

    // Four 1 s backoff steps per target would take far longer than the timeout
    let engine = WriteEngine::new(
        Some(targets_from_paths(unreachable.iter().cloned())),
        Some(WriteMode::Append),
        Some("x".to_string()),
        4,
        5,
        1000,
    );
    let start = std::time::Instant::now();
    let results = engine.write_with_timeout(1, Duration::from_millis(50))?;

    assert!(start.elapsed() < Duration::from_secs(2), "{:?}", start.elapsed());
    assert_eq!(results.total, 4);
    assert_eq!(results.failure, 4);
    assert_eq!(results.success, 0);
    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn test_write_failures_are_retried_then_recorded() -> Result<(), WriteError> {
    let full = Path::new("/dev/full");
    if !full.exists() {
        return Ok(());
    }
    let engine = WriteEngine::new(
        Some(vec![Some(Target::new(full))]),
        Some(WriteMode::Append),
        Some("no space".to_string()),
        4,
        2,
        1,
    );

    let results = engine.write(1)?;
    assert_eq!(results.failure, 1);
    let error = &results.failures[0].error;
    assert!(error.starts_with("exhausted retries after 2 attempts"), "{error}");
    assert!(results.info.contains_key("/dev/full"));
    Ok(())
}

#[test]
fn test_timeout_does_not_touch_attached_signal() -> Result<(), WriteError> {
    let dir = tempdir().unwrap();
    let files = paths(&dir, 2);
    let engine = engine_for(&files, WriteMode::Append, "late");

    let err = engine.write_with_timeout(1, Duration::ZERO).unwrap_err();
    assert!(matches!(
        err,
        WriteError::Cancelled(CancelReason::DeadlineExceeded)
    ));
    assert!(!engine.cancel_signal().is_cancelled());

    let results = engine.write_with_timeout(1, Duration::from_secs(60))?;
    assert_eq!(results.success, 2);
    Ok(())
}

#[test]
fn test_start_with_cancel_completes() {
    let dir = tempdir().unwrap();
    let files = paths(&dir, 8);
    let engine = Arc::new(engine_for(&files, WriteMode::Append, "bg"));

    let pending = engine.start_with_cancel(2);
    let results = pending.wait().unwrap();
    assert_eq!(results.success, 8);
    assert_eq!(engine.state(), EngineState::Ready);
}

#[test]
fn test_start_with_cancel_reports_precondition_errors() {
    let dir = tempdir().unwrap();
    let engine = Arc::new(engine_for(&paths(&dir, 2), WriteMode::Append, "bg"));
    let signal = CancelSignal::new();
    signal.cancel();
    engine.set_cancel_signal(signal);

    let pending = engine.start_with_cancel(1);
    let err = pending.errors().recv().unwrap();
    assert!(matches!(err, WriteError::Cancelled(CancelReason::Cancelled)));
    assert!(pending.results().try_recv().is_err());
}

#[test]
fn test_cancelling_a_pending_write_keeps_counts_consistent() {
    let dir = tempdir().unwrap();
    let files = paths(&dir, 64);
    let engine = Arc::new(engine_for(&files, WriteMode::Append, "maybe"));

    let pending = engine.start_with_cancel(1);
    pending.cancel();
    match pending.wait() {
        Ok(results) => {
            assert_eq!(results.total, 64);
            assert_eq!(results.success + results.failure, 64);
        }
        Err(err) => assert!(matches!(err, WriteError::Cancelled(_))),
    }
    // Only the pending write was cancelled
    assert!(!engine.cancel_signal().is_cancelled());
}

#[test]
fn test_pool_stays_bounded_during_write() -> Result<(), WriteError> {
    let dir = tempdir().unwrap();
    let files = paths(&dir, 20);
    let engine = WriteEngine::new(
        Some(targets_from_paths(files.iter().cloned())),
        Some(WriteMode::Append),
        Some("bounded".to_string()),
        2,
        3,
        1,
    );

    for _ in 0..2 {
        let results = engine.write(4)?;
        assert_eq!(results.success, 20);
        assert!(engine.pool().len() <= 2);
    }
    for file in &files {
        assert_eq!(fs::read_to_string(file).unwrap(), "boundedbounded");
    }
    Ok(())
}

#[test]
fn test_caller_supplied_handles_are_used() -> Result<(), WriteError> {
    let dir = tempdir().unwrap();
    let path = dir.path().join("opened.txt");
    let target = Target::open(&path, WriteMode::Append).unwrap();
    let handle = Arc::clone(target.handle().unwrap());

    let engine = WriteEngine::new(
        Some(vec![Some(target)]),
        Some(WriteMode::Append),
        Some("via handle".to_string()),
        4,
        1,
        1,
    );
    engine.write(1)?;

    let pooled = engine.pool().get(&path).unwrap();
    assert!(Arc::ptr_eq(&pooled, &handle));
    assert_eq!(fs::read_to_string(&path).unwrap(), "via handle");
    Ok(())
}

#[test]
fn test_pool_surface() {
    let dir = tempdir().unwrap();
    let files = paths(&dir, 2);
    let engine = WriteEngine::new(
        Some(targets_from_paths(files.iter().cloned())),
        Some(WriteMode::Append),
        Some("m".to_string()),
        1,
        0,
        0,
    );

    // Capacity one: acquiring b evicts a
    engine.acquire(&Target::new(&files[0])).unwrap();
    let b = engine.acquire(&Target::new(&files[1])).unwrap();
    assert!(matches!(engine.check_conn(&files[0]), Err(PoolError::NotFound(_))));
    assert!(engine.check_conn(&files[1]).is_ok());

    engine.remove_conn(&files[1]).unwrap();
    assert!(b.is_open());
    assert!(matches!(engine.remove_conn(&files[1]), Err(PoolError::NotFound(_))));
    assert!(matches!(engine.close_conn(&files[1]), Err(PoolError::NotFound(_))));

    engine.add_conn(&Target::from_handle(Arc::clone(&b))).unwrap();
    engine.close_conn(&files[1]).unwrap();
    assert!(!b.is_open());

    let closed = Target::from_handle(Arc::new(FileHandle::closed(&files[0])));
    assert!(matches!(
        engine.add_conn(&closed),
        Err(WriteError::HandleClosed(ref p)) if p == &files[0]
    ));

    engine.add_conn(&Target::new(&files[0])).unwrap();
    assert!(engine.check_conn(&files[0]).is_ok());
    engine.close_all_conns().unwrap();
    assert!(engine.pool().is_empty());
}

#[test]
fn test_factory_reset() -> Result<(), WriteError> {
    let dir = tempdir().unwrap();
    let files = paths(&dir, 3);
    let engine = engine_for(&files, WriteMode::Append, "r");
    engine.write(0)?;
    assert!(!engine.pool().is_empty());

    engine.factory_reset()?;
    assert!(engine.pool().is_empty());
    assert_eq!(engine.targets().map(|t| t.len()), Some(0));
    assert!(matches!(engine.write(0), Err(WriteError::EmptyTargets)));

    engine.set_targets(targets_from_paths(files.iter().cloned()))?;
    assert_eq!(engine.write(0)?.success, 3);
    Ok(())
}

#[test]
fn test_setters_and_getters() -> Result<(), WriteError> {
    let dir = tempdir().unwrap();
    let files = paths(&dir, 3);
    let engine = engine_for(&files[..1], WriteMode::Append, "one");

    engine.add_targets(targets_from_paths(files[1..].iter().cloned()))?;
    engine.set_mode(WriteMode::Truncate)?;
    engine.set_message("two")?;
    engine.set_retries(5)?;
    engine.set_backoff_ms(7)?;
    engine.set_max_pool(2)?;

    assert_eq!(engine.targets().map(|t| t.len()), Some(3));
    assert_eq!(engine.mode(), Some(WriteMode::Truncate));
    assert_eq!(engine.message().as_deref(), Some("two"));
    assert_eq!(engine.retries(), 5);
    assert_eq!(engine.backoff_ms(), 7);
    assert_eq!(engine.max_pool(), 2);
    assert_eq!(engine.pool().capacity(), 2);

    engine.write(0)?;
    assert!(engine.pool().len() <= 2);
    for file in &files {
        assert_eq!(fs::read_to_string(file).unwrap(), "two");
    }

    engine.set_max_pool(1)?;
    assert!(engine.pool().len() <= 1);
    Ok(())
}

#[test]
fn test_clear_targets_and_pool() -> Result<(), WriteError> {
    let dir = tempdir().unwrap();
    let files = paths(&dir, 2);
    let engine = engine_for(&files, WriteMode::Append, "c");
    engine.write(0)?;

    engine.clear_pool();
    assert!(engine.pool().is_empty());
    engine.clear_targets();
    assert_eq!(engine.state(), EngineState::Ready);
    assert!(matches!(engine.write(0), Err(WriteError::EmptyTargets)));
    Ok(())
}

#[test]
fn test_construction_from_config() -> Result<(), ConfigError> {
    let dir = tempdir().unwrap();
    let files = paths(&dir, 2);
    let json = serde_json::json!({
        "files": files,
        "mode": "a",
        "message": "json",
        "maxPool": 10,
        "retries": 3,
        "backoff": 100
    })
    .to_string();

    let engine = WriteEngine::from_json(&json)?;
    assert_eq!(engine.max_pool(), 10);
    assert_eq!(engine.retries(), 3);
    assert_eq!(engine.backoff_ms(), 100);
    assert_eq!(engine.write(0).unwrap().success, 2);

    let missing = WriterConfig {
        message: None,
        ..WriterConfig::from_json(&json)?
    };
    assert!(matches!(
        WriteEngine::from_config(missing),
        Err(ConfigError::MissingField("message"))
    ));
    Ok(())
}

#[test]
fn test_construction_from_map() -> Result<(), ConfigError> {
    let dir = tempdir().unwrap();
    let files = paths(&dir, 1);
    let mut map = ConfigMap::new();
    map.insert(
        "files".to_string(),
        ConfigValue::Targets(targets_from_paths(files.iter().cloned())),
    );
    map.insert("mode".to_string(), ConfigValue::mode("w")?);
    map.insert("message".to_string(), ConfigValue::Message("map".to_string()));
    map.insert("retries".to_string(), ConfigValue::UInt(1));
    map.insert("backoff".to_string(), ConfigValue::UInt(1));
    map.insert("maxPool".to_string(), ConfigValue::UInt(1));

    let engine = WriteEngine::from_map(map.clone())?;
    assert_eq!(engine.mode(), Some(WriteMode::Truncate));
    assert_eq!(engine.write(1).unwrap().success, 1);

    map.insert("maxPool".to_string(), ConfigValue::Message("1".to_string()));
    assert!(matches!(
        WriteEngine::from_map(map),
        Err(ConfigError::TypeMismatch { key: "maxPool", .. })
    ));
    Ok(())
}

#[test]
fn test_default_engine() {
    let engine = default_engine();
    assert!(std::ptr::eq(engine, default_engine()));
    assert_eq!(engine.mode(), Some(WriteMode::Append));
    assert_eq!(engine.message().as_deref(), Some(DEFAULT_MESSAGE));
    assert_eq!(engine.retries(), DEFAULT_RETRIES);
    assert_eq!(engine.backoff_ms(), DEFAULT_BACKOFF_MS);
    assert_eq!(engine.max_pool(), default_max_pool());
    assert_eq!(engine.targets().map(|t| t.len()), Some(0));
    assert!(matches!(engine.write(0), Err(WriteError::EmptyTargets)));
}
