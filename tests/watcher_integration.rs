#![cfg(target_os = "linux")]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tail_core::{
    CancellationToken, ChangeEvent, ChangeEventStream, FileWatcher, Termination, WatchError,
    WatchRegistry, WatchScope, WatcherConfig,
};
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn append(path: &Path, content: &str) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
}

async fn next(stream: &mut ChangeEventStream) -> Option<ChangeEvent> {
    timeout(WAIT, stream.recv())
        .await
        .expect("timed out waiting for change event")
}

#[tokio::test]
async fn native_backend_is_inotify() {
    let registry = WatchRegistry::new(WatcherConfig::default()).unwrap();
    assert_eq!(registry.backend_name(), "inotify");
}

#[tokio::test]
async fn appends_are_reported_as_modified() {
    init_tracing();
    let tmpdir = TempDir::new().unwrap();
    let log = tmpdir.path().join("app.log");
    fs::write(&log, "first line\n").unwrap();

    let registry = WatchRegistry::new(WatcherConfig::default()).unwrap();
    let watcher = FileWatcher::new(&log, &registry).unwrap();
    let mut changes = watcher
        .change_events(fs::metadata(&log).unwrap().len(), CancellationToken::new())
        .unwrap();

    append(&log, "second line\n");
    assert_eq!(next(&mut changes).await, Some(ChangeEvent::Modified));
}

#[tokio::test]
async fn truncate_in_place_is_reported() {
    init_tracing();
    let tmpdir = TempDir::new().unwrap();
    let log = tmpdir.path().join("app.log");
    fs::write(&log, "a fairly long line that will be truncated\n").unwrap();

    let registry = WatchRegistry::new(WatcherConfig::default()).unwrap();
    let watcher = FileWatcher::new(&log, &registry).unwrap();
    let size = fs::metadata(&log).unwrap().len();
    let mut changes = watcher
        .change_events(size, CancellationToken::new())
        .unwrap();

    OpenOptions::new()
        .write(true)
        .open(&log)
        .unwrap()
        .set_len(0)
        .unwrap();
    assert_eq!(next(&mut changes).await, Some(ChangeEvent::Truncated));

    append(&log, "fresh\n");
    assert_eq!(next(&mut changes).await, Some(ChangeEvent::Modified));
}

#[tokio::test]
async fn removal_emits_single_deleted_and_closes() {
    init_tracing();
    let tmpdir = TempDir::new().unwrap();
    let log = tmpdir.path().join("app.log");
    fs::write(&log, "line\n").unwrap();

    let registry = WatchRegistry::new(WatcherConfig::default()).unwrap();
    let watcher = FileWatcher::new(&log, &registry).unwrap();
    let mut changes = watcher.change_events(5, CancellationToken::new()).unwrap();

    fs::remove_file(&log).unwrap();
    fs::write(&log, "recreated\n").unwrap();

    assert_eq!(next(&mut changes).await, Some(ChangeEvent::Deleted));
    assert_eq!(next(&mut changes).await, None);
    assert_eq!(changes.termination(), Some(Termination::Deleted));
    assert_eq!(registry.ref_count(&log), 0);
}

#[tokio::test]
async fn unlink_while_held_open_is_deleted() {
    init_tracing();
    let tmpdir = TempDir::new().unwrap();
    let log = tmpdir.path().join("app.log");
    fs::write(&log, "line\n").unwrap();
    let _held_open = fs::File::open(&log).unwrap();

    let registry = WatchRegistry::new(WatcherConfig::default()).unwrap();
    let watcher = FileWatcher::new(&log, &registry).unwrap();
    let mut changes = watcher.change_events(5, CancellationToken::new()).unwrap();

    fs::remove_file(&log).unwrap();

    assert_eq!(next(&mut changes).await, Some(ChangeEvent::Deleted));
    assert_eq!(next(&mut changes).await, None);
}

#[tokio::test]
async fn rotation_by_rename_is_deleted() {
    init_tracing();
    let tmpdir = TempDir::new().unwrap();
    let log = tmpdir.path().join("app.log");
    fs::write(&log, "line\n").unwrap();

    let registry = WatchRegistry::new(WatcherConfig::default()).unwrap();
    let watcher = FileWatcher::new(&log, &registry).unwrap();
    let mut changes = watcher.change_events(5, CancellationToken::new()).unwrap();

    fs::rename(&log, tmpdir.path().join("app.log.1")).unwrap();

    assert_eq!(next(&mut changes).await, Some(ChangeEvent::Deleted));
    assert_eq!(next(&mut changes).await, None);
}

#[tokio::test]
async fn two_watchers_both_see_changes() {
    init_tracing();
    let tmpdir = TempDir::new().unwrap();
    let log = tmpdir.path().join("app.log");
    fs::write(&log, "line\n").unwrap();

    let registry = WatchRegistry::new(WatcherConfig::default()).unwrap();
    let first = FileWatcher::new(&log, &registry).unwrap();
    let second = FileWatcher::new(&log, &registry).unwrap();
    let token = CancellationToken::new();
    let mut a = first.change_events(5, token.clone()).unwrap();
    let mut b = second.change_events(5, CancellationToken::new()).unwrap();
    assert_eq!(registry.ref_count(&log), 2);

    append(&log, "more\n");
    assert_eq!(next(&mut a).await, Some(ChangeEvent::Modified));
    assert_eq!(next(&mut b).await, Some(ChangeEvent::Modified));

    token.cancel();
    assert_eq!(next(&mut a).await, None);
    assert_eq!(registry.ref_count(&log), 1);

    append(&log, "even more\n");
    assert_eq!(next(&mut b).await, Some(ChangeEvent::Modified));
}

#[tokio::test]
async fn block_until_exists_wakes_on_creation() {
    init_tracing();
    let tmpdir = TempDir::new().unwrap();
    let log = tmpdir.path().join("app.log");

    let registry = WatchRegistry::new(WatcherConfig::default()).unwrap();
    let watcher = FileWatcher::new(&log, &registry).unwrap();

    let waiter = {
        let watcher = watcher.clone();
        tokio::spawn(async move { watcher.block_until_exists(&CancellationToken::new()).await })
    };

    timeout(WAIT, async {
        while registry.ref_count(&log) != 1 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    fs::write(tmpdir.path().join("unrelated.log"), "x").unwrap();
    fs::write(&log, "hello\n").unwrap();

    timeout(WAIT, waiter).await.unwrap().unwrap().unwrap();
    assert_eq!(registry.ref_count(&log), 0);
}

#[tokio::test]
async fn block_until_exists_wakes_on_rename_into_place() {
    init_tracing();
    let tmpdir = TempDir::new().unwrap();
    let log = tmpdir.path().join("app.log");
    let staged = tmpdir.path().join("app.log.tmp");
    fs::write(&staged, "staged\n").unwrap();

    let registry = WatchRegistry::new(WatcherConfig::default()).unwrap();
    let watcher = FileWatcher::new(&log, &registry).unwrap();

    let waiter = {
        let watcher = watcher.clone();
        tokio::spawn(async move { watcher.block_until_exists(&CancellationToken::new()).await })
    };

    timeout(WAIT, async {
        while registry.ref_count(&log) != 1 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    fs::rename(&staged, &log).unwrap();

    timeout(WAIT, waiter).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn block_until_exists_cancelled() {
    init_tracing();
    let tmpdir = TempDir::new().unwrap();
    let log = tmpdir.path().join("never.log");

    let registry = WatchRegistry::new(WatcherConfig::default()).unwrap();
    let watcher = FileWatcher::new(&log, &registry).unwrap();
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            token.cancel();
        })
    };

    let err = timeout(WAIT, watcher.block_until_exists(&token))
        .await
        .expect("cancellation should end the wait")
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(registry.ref_count(&log), 0);
    canceller.await.unwrap();
}

#[tokio::test]
async fn block_until_exists_without_parent_directory_is_not_found() {
    let tmpdir = TempDir::new().unwrap();
    let log = tmpdir.path().join("missing-dir").join("app.log");

    let registry = WatchRegistry::new(WatcherConfig::default()).unwrap();
    let watcher = FileWatcher::new(&log, &registry).unwrap();

    let err = watcher
        .block_until_exists(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WatchError::NotFound(_)));
    assert_eq!(registry.ref_count(&log), 0);
}

#[tokio::test]
async fn retail_after_rotation_while_another_tailer_holds_the_watch() {
    init_tracing();
    let tmpdir = TempDir::new().unwrap();
    let log = tmpdir.path().join("app.log");
    fs::write(&log, "line\n").unwrap();

    let registry = WatchRegistry::new(WatcherConfig::default()).unwrap();
    // Another tailer on the same path that outlives the rotation.
    let holder = registry.acquire(&log, WatchScope::File).unwrap();

    let first = FileWatcher::new(&log, &registry).unwrap();
    let mut old = first.change_events(5, CancellationToken::new()).unwrap();

    fs::rename(&log, tmpdir.path().join("app.log.1")).unwrap();
    let mut last = None;
    while let Some(event) = next(&mut old).await {
        last = Some(event);
    }
    assert_eq!(last, Some(ChangeEvent::Deleted));
    assert_eq!(registry.ref_count(&log), 1);

    fs::write(&log, "").unwrap();
    let second = FileWatcher::new(&log, &registry).unwrap();
    let mut new = second.change_events(0, CancellationToken::new()).unwrap();

    append(&log, "after rotation\n");
    assert_eq!(next(&mut new).await, Some(ChangeEvent::Modified));

    registry.release(holder.handle()).unwrap();
}

#[tokio::test]
async fn append_next_to_a_creation_wait_is_reported_once() {
    init_tracing();
    let tmpdir = TempDir::new().unwrap();
    let log = tmpdir.path().join("app.log");
    fs::write(&log, "line\n").unwrap();

    let registry = WatchRegistry::new(WatcherConfig::default()).unwrap();
    let pending = registry.acquire(&log, WatchScope::Parent).unwrap();
    let sibling = FileWatcher::new(tmpdir.path().join("app.log.next"), &registry).unwrap();
    let token = CancellationToken::new();
    let waiter = {
        let sibling = sibling.clone();
        let token = token.clone();
        tokio::spawn(async move { sibling.block_until_exists(&token).await })
    };

    timeout(WAIT, async {
        while registry.ref_count(&log) != 2 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let watcher = FileWatcher::new(&log, &registry).unwrap();
    let mut changes = watcher.change_events(5, CancellationToken::new()).unwrap();

    append(&log, "one more\n");
    assert_eq!(next(&mut changes).await, Some(ChangeEvent::Modified));
    assert!(
        timeout(Duration::from_millis(300), changes.recv())
            .await
            .is_err()
    );

    token.cancel();
    let err = timeout(WAIT, waiter).await.unwrap().unwrap().unwrap_err();
    assert!(err.is_cancelled());
    registry.release(pending.handle()).unwrap();
    assert_eq!(registry.ref_count(&log), 1);
}
