use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::core::ChangeKind;
use crate::utils::path::normalize_path;

pub(super) const DEBOUNCE_MS: u64 = 300;
pub(super) const REBUILD_COOLDOWN_MS: u64 = 800;

/// Debounce window and minimum spacing between two released batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub debounce: Duration,
    pub cooldown: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEBOUNCE_MS),
            cooldown: Duration::from_millis(REBUILD_COOLDOWN_MS),
        }
    }
}

/// Pure debouncer: timing and per-path deduplication only.
///
/// Each path remembers the sequence number of its latest event so a released
/// batch keeps arrival order, newest last.
pub(super) struct Debouncer {
    pub(super) changes: FxHashMap<PathBuf, (u64, ChangeKind)>,
    pub(super) last_event: Option<Instant>,
    pub(super) last_release: Option<Instant>,
    timing: Timing,
    seq: u64,
}

impl Debouncer {
    pub(super) fn new(timing: Timing) -> Self {
        Self {
            changes: FxHashMap::default(),
            last_event: None,
            last_release: None,
            timing,
            seq: 0,
        }
    }

    /// Add a notify event, applying dedup rules:
    /// - Deleted + Added/Modified → Added/Modified (file was restored)
    /// - Modified + Deleted → Deleted
    /// - Added + Deleted → dropped
    /// - otherwise the first kind wins
    pub(super) fn add_event(&mut self, event: &notify::Event) {
        // Metadata-only modifies (mtime/chmod) would loop rebuilds forever.
        if matches!(
            event.kind,
            notify::EventKind::Modify(notify::event::ModifyKind::Metadata(_))
        ) {
            return;
        }
        let Some(kind) = ChangeKind::from_event(&event.kind) else {
            return;
        };

        crate::debug!("watch"; "raw notify: {:?} {:?}", event.kind, event.paths);

        for path in &event.paths {
            if is_temp_file(path) {
                continue;
            }
            let path = normalize_path(path);
            self.seq += 1;
            self.last_event = Some(Instant::now());

            let Some(&(_, existing)) = self.changes.get(&path) else {
                crate::debug!("watch"; "event {}: {}", kind.name(), path.display());
                self.changes.insert(path, (self.seq, kind));
                continue;
            };

            let merged = match (existing, kind) {
                (ChangeKind::Deleted, ChangeKind::Added | ChangeKind::Modified) => {
                    crate::debug!("watch"; "restore deleted->{}: {}", kind.name(), path.display());
                    Some(kind)
                }
                (ChangeKind::Modified, ChangeKind::Deleted) => {
                    crate::debug!("watch"; "upgrade modified->deleted: {}", path.display());
                    Some(ChangeKind::Deleted)
                }
                (ChangeKind::Added, ChangeKind::Deleted) => {
                    crate::debug!("watch"; "discard added+deleted: {}", path.display());
                    None
                }
                _ => Some(existing),
            };

            match merged {
                Some(kind) => {
                    self.changes.insert(path, (self.seq, kind));
                }
                None => {
                    self.changes.remove(&path);
                }
            }
        }
    }

    /// Take the pending changes, oldest first, once debounce and cooldown
    /// have elapsed.
    pub(super) fn take_if_ready(&mut self) -> Option<Vec<(PathBuf, ChangeKind)>> {
        if !self.is_ready() {
            return None;
        }

        let mut changes: Vec<_> = std::mem::take(&mut self.changes).into_iter().collect();
        self.last_event = None;
        if changes.is_empty() {
            return None;
        }

        changes.sort_by_key(|(_, (seq, _))| *seq);
        self.last_release = Some(Instant::now());
        Some(
            changes
                .into_iter()
                .map(|(path, (_, kind))| (path, kind))
                .collect(),
        )
    }

    pub(super) fn is_ready(&self) -> bool {
        let Some(last_event) = self.last_event else {
            return false;
        };

        if last_event.elapsed() < self.timing.debounce {
            return false;
        }

        if let Some(last_release) = self.last_release
            && last_release.elapsed() < self.timing.cooldown
        {
            return false;
        }

        !self.changes.is_empty()
    }

    /// Sleep until the next moment a batch could be released.
    pub(super) fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(86400);
        };

        let debounce_remaining = self.timing.debounce.saturating_sub(last_event.elapsed());
        let cooldown_remaining = self
            .last_release
            .map(|t| self.timing.cooldown.saturating_sub(t.elapsed()))
            .unwrap_or(Duration::ZERO);

        debounce_remaining
            .max(cooldown_remaining)
            .max(Duration::from_millis(1))
    }
}

/// Editor swap and backup files.
pub(super) fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}
