//! Debounced filesystem watcher for a Spec-kit project tree.
//!
//! Watches `<root>/specs` (and `<root>/.specify` when present) for markdown
//! changes. Raw notify events are bridged onto a tokio channel, then squashed
//! per path: every event arms a timer for that path, replacing any timer
//! already pending, so a burst of writes to one file emits a single
//! [`FileChangeEvent`] once the path has been quiet for the debounce window.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use regex::Regex;
use std::sync::LazyLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::models::{ChangeKind, FileChangeEvent};

static FEATURE_SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-.+$").unwrap());

type TimerMap = Arc<Mutex<HashMap<PathBuf, JoinHandle<()>>>>;

/// Watches one project tree at a time. `start` on a running watcher restarts
/// it against the new path; `stop` returns it to idle.
pub struct SpecWatcher {
    debounce: Duration,
    inner: Option<WatchInner>,
}

struct WatchInner {
    root: PathBuf,
    // Held for its Drop; dropping the handle unregisters the OS watches.
    _watcher: RecommendedWatcher,
    loop_handle: JoinHandle<()>,
    timers: TimerMap,
}

impl SpecWatcher {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            inner: None,
        }
    }

    pub fn is_watching(&self) -> bool {
        self.inner.is_some()
    }

    pub fn watch_path(&self) -> Option<&Path> {
        self.inner.as_ref().map(|i| i.root.as_path())
    }

    /// Begin watching `root`. Returns the channel on which debounced change
    /// events arrive. Any previous watch is stopped first.
    ///
    /// `<root>/.specify` is registered only if it exists now; one created
    /// after this call is not picked up until the next `start`.
    pub fn start(&mut self, root: &Path) -> Result<mpsc::Receiver<FileChangeEvent>> {
        self.stop();

        let specs_dir = root.join("specs");
        if !specs_dir.is_dir() {
            anyhow::bail!("No specs directory at {}", specs_dir.display());
        }

        let (raw_tx, mut raw_rx) = mpsc::channel::<notify::Result<notify::Event>>(256);
        let (out_tx, out_rx) = mpsc::channel::<FileChangeEvent>(64);

        // notify delivers on its own thread; blocking_send hands the event
        // over to the tokio side.
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = raw_tx.blocking_send(res);
            },
            notify::Config::default(),
        )
        .context("Failed to create filesystem watcher")?;

        watcher
            .watch(&specs_dir, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", specs_dir.display()))?;
        let specify_dir = root.join(".specify");
        if specify_dir.is_dir() {
            watcher
                .watch(&specify_dir, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch {}", specify_dir.display()))?;
        }

        let timers: TimerMap = Arc::new(Mutex::new(HashMap::new()));
        let loop_timers = Arc::clone(&timers);
        let debounce = self.debounce;

        let loop_handle = tokio::spawn(async move {
            while let Some(res) = raw_rx.recv().await {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        error!(error = %e, "watch backend error");
                        continue;
                    }
                };
                let Some(kind) = change_kind(&event.kind) else {
                    continue;
                };
                for path in event.paths {
                    if !is_relevant(&path) {
                        continue;
                    }
                    arm_timer(&loop_timers, &out_tx, kind, path, debounce);
                }
            }
        });

        self.inner = Some(WatchInner {
            root: root.to_path_buf(),
            _watcher: watcher,
            loop_handle,
            timers,
        });
        Ok(out_rx)
    }

    /// Stop watching. Pending debounce timers are discarded, so changes still
    /// inside their quiet window never fire.
    pub fn stop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        inner.loop_handle.abort();
        let mut timers = inner.timers.lock().unwrap_or_else(|e| e.into_inner());
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }
}

impl Drop for SpecWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn arm_timer(
    timers: &TimerMap,
    out_tx: &mpsc::Sender<FileChangeEvent>,
    kind: ChangeKind,
    path: PathBuf,
    debounce: Duration,
) {
    let out_tx = out_tx.clone();
    let map = Arc::clone(timers);
    let timer_path = path.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(debounce).await;
        map.lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&timer_path);
        let event = FileChangeEvent {
            kind,
            feature_number: feature_number(&timer_path),
            path: timer_path,
        };
        debug!(path = %event.path.display(), kind = event.kind.as_str(), "change");
        let _ = out_tx.send(event).await;
    });

    let mut map = timers.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(previous) = map.insert(path, handle) {
        previous.abort();
    }
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Add),
        EventKind::Modify(_) => Some(ChangeKind::Change),
        EventKind::Remove(_) => Some(ChangeKind::Unlink),
        _ => None,
    }
}

/// Only markdown files outside hidden/vendored directories qualify. The
/// `.specify` root itself is watched, so it is exempt from the dot rule.
fn is_relevant(path: &Path) -> bool {
    if path.extension().map_or(true, |ext| ext != "md") {
        return false;
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name == "node_modules" || name == ".git" {
            return false;
        }
        if name.starts_with('.') && name != ".specify" && name != "." && name != ".." {
            return false;
        }
    }
    true
}

/// Feature number from a `specs/NNN-slug/` path segment, if the path has one.
fn feature_number(path: &Path) -> Option<String> {
    let mut components = path.components().peekable();
    while let Some(component) = components.next() {
        if component.as_os_str() != "specs" {
            continue;
        }
        if let Some(next) = components.peek() {
            let name = next.as_os_str().to_string_lossy();
            if let Some(caps) = FEATURE_SEGMENT_RE.captures(&name) {
                return Some(caps[1].to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[test]
    fn test_relevance_filter() {
        assert!(is_relevant(Path::new("/p/specs/001-login/spec.md")));
        assert!(is_relevant(Path::new("/p/.specify/memory/constitution.md")));
        assert!(!is_relevant(Path::new("/p/specs/001-login/notes.txt")));
        assert!(!is_relevant(Path::new("/p/specs/001-login/.draft.md")));
        assert!(!is_relevant(Path::new("/p/node_modules/pkg/README.md")));
        assert!(!is_relevant(Path::new("/p/.git/COMMIT_EDITMSG.md")));
    }

    #[test]
    fn test_feature_number_extraction() {
        assert_eq!(
            feature_number(Path::new("/p/specs/001-login/spec.md")),
            Some("001".to_string())
        );
        assert_eq!(
            feature_number(Path::new("/p/specs/042-search-index/tasks.md")),
            Some("042".to_string())
        );
        assert_eq!(feature_number(Path::new("/p/.specify/memory/x.md")), None);
        assert_eq!(feature_number(Path::new("/p/specs/notes/x.md")), None);
    }

    #[test]
    fn test_change_kind_mapping() {
        use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};
        assert_eq!(
            change_kind(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Add)
        );
        assert_eq!(
            change_kind(&EventKind::Modify(ModifyKind::Any)),
            Some(ChangeKind::Change)
        );
        assert_eq!(
            change_kind(&EventKind::Remove(RemoveKind::File)),
            Some(ChangeKind::Unlink)
        );
        assert_eq!(change_kind(&EventKind::Access(AccessKind::Any)), None);
    }

    #[tokio::test]
    async fn test_start_requires_specs_dir() {
        let tmp = TempDir::new().unwrap();
        let mut watcher = SpecWatcher::new(Duration::from_millis(50));
        assert!(watcher.start(tmp.path()).is_err());
        assert!(!watcher.is_watching());
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("specs")).unwrap();

        let mut watcher = SpecWatcher::new(Duration::from_millis(50));
        let _rx = watcher.start(tmp.path()).unwrap();
        assert!(watcher.is_watching());
        assert_eq!(watcher.watch_path(), Some(tmp.path()));

        watcher.stop();
        assert!(!watcher.is_watching());
        assert_eq!(watcher.watch_path(), None);
    }

    #[tokio::test]
    async fn test_burst_collapses_to_one_event() {
        let tmp = TempDir::new().unwrap();
        let feature_dir = tmp.path().join("specs/001-login");
        fs::create_dir_all(&feature_dir).unwrap();

        let mut watcher = SpecWatcher::new(Duration::from_millis(100));
        let mut rx = watcher.start(tmp.path()).unwrap();

        let spec = feature_dir.join("spec.md");
        fs::write(&spec, "# one").unwrap();
        fs::write(&spec, "# two").unwrap();
        fs::write(&spec, "# three").unwrap();

        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no event before timeout")
            .expect("channel closed");
        assert_eq!(event.path, spec);
        assert_eq!(event.feature_number.as_deref(), Some("001"));

        // Quiet window passed with no further writes: nothing else arrives.
        let extra = timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(extra.is_err(), "burst produced a second event: {:?}", extra);
    }
}
