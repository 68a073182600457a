use parking_lot::Mutex;
use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, error, info, warn};

/// Retry budget used when deleting a file that may still be held open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ReclaimPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Reference counts for downloaded media files.
///
/// Every queued entry holds one reference to its backing file. When the last
/// reference is released the file is deleted by a background task; the
/// releasing caller never waits for it and never sees its failures.
#[derive(Debug, Clone, Default)]
pub struct FileTracker {
    usage: Arc<Mutex<HashMap<PathBuf, usize>>>,
    policy: ReclaimPolicy,
}

impl FileTracker {
    pub fn new(policy: ReclaimPolicy) -> Self {
        Self {
            usage: Arc::new(Mutex::new(HashMap::new())),
            policy,
        }
    }

    /// Adds a reference to `path` and returns the new count.
    pub fn acquire(&self, path: &Path) -> usize {
        let mut usage = self.usage.lock();
        let count = usage.entry(path.to_path_buf()).or_insert(0);
        *count += 1;
        *count
    }

    /// Drops a reference to `path` and returns the remaining count.
    ///
    /// Reaching zero schedules a reclaim; releasing an untracked path does
    /// nothing.
    pub fn release(&self, path: &Path) -> usize {
        let remaining = {
            let mut usage = self.usage.lock();
            match usage.get_mut(path) {
                Some(count) => {
                    *count = count.saturating_sub(1);
                    *count
                }
                None => {
                    debug!("Release de archivo no rastreado: {}", path.display());
                    return 0;
                }
            }
        };

        if remaining == 0 {
            self.spawn_reclaim(path.to_path_buf());
        }

        remaining
    }

    /// Current reference count for `path`.
    pub fn count(&self, path: &Path) -> usize {
        self.usage.lock().get(path).copied().unwrap_or(0)
    }

    /// Number of paths currently tracked, including ones awaiting reclaim.
    pub fn tracked(&self) -> usize {
        self.usage.lock().len()
    }

    /// Schedules `path` for deletion unless a queue entry still references it.
    ///
    /// Used for downloads that never made it into a queue.
    pub fn discard(&self, path: &Path) {
        self.acquire(path);
        self.release(path);
    }

    fn spawn_reclaim(&self, path: PathBuf) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Sin runtime para reclamar {}", path.display());
            return;
        };

        let tracker = self.clone();
        // Detached on purpose: nobody awaits the deletion.
        runtime.spawn(async move {
            tracker.reclaim(&path).await;
        });
    }

    /// Deletes `path` if nothing references it any more.
    ///
    /// Each attempt claims the path under the usage lock and deletes it after
    /// the lock is released. A failed attempt puts the path back, so an
    /// enqueue that raced in meanwhile keeps the file and stops the retries.
    /// Returns `true` only when this call removed the file from disk.
    pub async fn reclaim(&self, path: &Path) -> bool {
        let attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            {
                let mut usage = self.usage.lock();
                match usage.get(path) {
                    None => return false,
                    Some(&count) if count > 0 => {
                        debug!("♻️ {} sigue en uso ({} refs), no se borra", path.display(), count);
                        return false;
                    }
                    Some(_) => {
                        usage.remove(path);
                    }
                }
            }

            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    if self.count(path) > 0 {
                        warn!("{} se volvió a usar mientras se eliminaba", path.display());
                    }
                    info!("🗑️ Archivo eliminado: {}", path.display());
                    return true;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Archivo ya no existe: {}", path.display());
                    return false;
                }
                Err(e) => {
                    warn!(
                        "Archivo {} en uso, reintentando en {:?} (intento {}/{}): {}",
                        path.display(),
                        self.policy.retry_delay,
                        attempt,
                        attempts,
                        e
                    );
                }
            }

            {
                let mut usage = self.usage.lock();
                let count = *usage.entry(path.to_path_buf()).or_insert(0);
                if count > 0 {
                    debug!("♻️ {} se volvió a encolar, se cancela el borrado", path.display());
                    return false;
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.policy.retry_delay).await;
            }
        }

        error!(
            "No se pudo eliminar {} tras {} intentos, se omite",
            path.display(),
            attempts
        );
        let mut usage = self.usage.lock();
        if usage.get(path) == Some(&0) {
            usage.remove(path);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy() -> ReclaimPolicy {
        ReclaimPolicy {
            max_attempts: 3,
            retry_delay: Duration::from_millis(1),
        }
    }

    async fn wait_until_gone(path: &Path) -> bool {
        for _ in 0..100 {
            if !path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_counts_never_go_negative() {
        let tracker = FileTracker::new(fast_policy());
        let path = Path::new("/nonexistent/song.m4a");

        assert_eq!(tracker.acquire(path), 1);
        assert_eq!(tracker.acquire(path), 2);
        assert_eq!(tracker.release(path), 1);
        assert_eq!(tracker.release(path), 0);
        assert_eq!(tracker.release(path), 0);
        assert_eq!(tracker.count(path), 0);
        assert_eq!(tracker.release(Path::new("/never/tracked.mp3")), 0);
    }

    #[tokio::test]
    async fn test_last_release_deletes_file_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.m4a");
        std::fs::write(&path, b"audio").unwrap();

        let tracker = FileTracker::new(fast_policy());
        tracker.acquire(&path);
        tracker.acquire(&path);

        tracker.release(&path);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(path.exists());

        tracker.release(&path);
        assert!(wait_until_gone(&path).await);
        assert_eq!(tracker.tracked(), 0);
    }

    #[tokio::test]
    async fn test_reacquired_file_survives_pending_reclaim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.m4a");
        std::fs::write(&path, b"audio").unwrap();

        let tracker = FileTracker::new(fast_policy());
        tracker.acquire(&path);
        // The reclaim task is queued but cannot run before the next await.
        tracker.release(&path);
        tracker.acquire(&path);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(path.exists());
        assert_eq!(tracker.count(&path), 1);
    }

    #[tokio::test]
    async fn test_discard_spares_referenced_files() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("kept.m4a");
        let orphan = dir.path().join("orphan.m4a");
        std::fs::write(&kept, b"audio").unwrap();
        std::fs::write(&orphan, b"audio").unwrap();

        let tracker = FileTracker::new(fast_policy());
        tracker.acquire(&kept);

        tracker.discard(&kept);
        tracker.discard(&orphan);

        assert!(wait_until_gone(&orphan).await);
        assert!(kept.exists());
        assert_eq!(tracker.count(&kept), 1);
    }

    #[tokio::test]
    async fn test_reclaim_of_untracked_path_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("untracked.m4a");
        std::fs::write(&path, b"audio").unwrap();

        let tracker = FileTracker::new(fast_policy());
        assert!(!tracker.reclaim(&path).await);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_forgotten() {
        let tracker = FileTracker::new(fast_policy());
        let path = Path::new("/nonexistent/gone.m4a");
        tracker.acquire(path);
        tracker.release(path);

        assert!(!tracker.reclaim(path).await);
        assert_eq!(tracker.tracked(), 0);
    }

    #[tokio::test]
    async fn test_reclaim_gives_up_after_budget() {
        let dir = tempfile::tempdir().unwrap();
        // Unlinking a directory fails every time.
        let path = dir.path().join("stubborn");
        std::fs::create_dir(&path).unwrap();

        let tracker = FileTracker::new(fast_policy());
        tracker.acquire(&path);
        {
            let mut usage = tracker.usage.lock();
            usage.insert(path.clone(), 0);
        }

        assert!(!tracker.reclaim(&path).await);
        assert!(path.exists());
        assert_eq!(tracker.count(&path), 0);
        assert_eq!(tracker.tracked(), 0);
    }

    #[tokio::test]
    async fn test_acquire_during_retries_cancels_reclaim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy");
        std::fs::create_dir(&path).unwrap();

        let tracker = FileTracker::new(ReclaimPolicy {
            max_attempts: 5,
            retry_delay: Duration::from_millis(50),
        });
        tracker.acquire(&path);
        {
            let mut usage = tracker.usage.lock();
            usage.insert(path.clone(), 0);
        }

        let reclaim = tokio::spawn({
            let tracker = tracker.clone();
            let path = path.clone();
            async move { tracker.reclaim(&path).await }
        });

        // Lands while the first failed attempt waits to retry.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(tracker.acquire(&path), 1);

        assert!(!reclaim.await.unwrap());
        assert!(path.exists());
        assert_eq!(tracker.count(&path), 1);
        assert_eq!(tracker.tracked(), 1);
    }
}
