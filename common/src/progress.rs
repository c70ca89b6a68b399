//! Weighted hierarchical progress tracking.
//!
//! Grounded in `archive_agent/core/ProgressManager.py`'s `_Task` dataclass
//! and ratio computation. Only the state machine and roll-up arithmetic are
//! ported; the original's Rich `Tree`/`ProgressBar` rendering is a TUI
//! concern out of scope here (no CLI surface in this crate).

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use uuid::Uuid;

#[derive(Debug, Clone)]
struct Task {
    name: String,
    parent: Option<String>,
    weight: f64,
    total: Option<u64>,
    completed: u64,
    created_seq: Instant,
    children: Vec<String>,
    removed: bool,
}

impl Task {
    /// Own (non-rolled-up) completion ratio in `[0, 1]`.
    fn own_ratio(&self) -> f64 {
        match self.total {
            Some(0) => {
                if self.completed > 0 {
                    1.0
                } else {
                    0.0
                }
            }
            Some(total) => (self.completed as f64 / total as f64).clamp(0.0, 1.0),
            None => {
                // Indeterminate: contributes 0 until explicitly completed.
                if self.completed > 0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Snapshot of a task for display/inspection, independent of the manager's
/// internal locking.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub key: String,
    pub name: String,
    pub ratio: f64,
    pub children: Vec<ProgressSnapshot>,
}

/// How long a completed subtree is kept around before [`ProgressManager::sweep`]
/// removes it — mirrors the original's ~0.35s visual delay before a
/// finished row disappears from the tree.
pub const REMOVAL_DELAY: Duration = Duration::from_millis(350);

pub struct ProgressManager {
    tasks: Mutex<HashMap<String, Task>>,
    roots: Mutex<Vec<String>>,
    pending_removal: Mutex<Vec<(String, Instant)>>,
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressManager {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            roots: Mutex::new(Vec::new()),
            pending_removal: Mutex::new(Vec::new()),
        }
    }

    /// Creates a new task, optionally parented under `parent`. `weight`
    /// determines how much this task's ratio contributes to its parent's
    /// weighted roll-up relative to its siblings. `total` of `None` marks
    /// an indeterminate task.
    pub fn start_task(
        &self,
        name: impl Into<String>,
        parent: Option<&str>,
        weight: f64,
        total: Option<u64>,
    ) -> String {
        let key = Uuid::new_v4().to_string();
        let task = Task {
            name: name.into(),
            parent: parent.map(str::to_string),
            weight,
            total,
            completed: 0,
            created_seq: Instant::now(),
            children: Vec::new(),
            removed: false,
        };

        let mut tasks = self.tasks.lock().expect("lock poisoned");
        tasks.insert(key.clone(), task);

        match parent {
            Some(parent_key) => {
                if let Some(p) = tasks.get_mut(parent_key) {
                    p.children.push(key.clone());
                }
            }
            None => self.roots.lock().expect("lock poisoned").push(key.clone()),
        }

        key
    }

    pub fn advance(&self, key: &str, delta: u64) {
        let mut tasks = self.tasks.lock().expect("lock poisoned");
        if let Some(task) = tasks.get_mut(key) {
            task.completed = task.completed.saturating_add(delta);
        }
    }

    pub fn set_total(&self, key: &str, total: u64) {
        let mut tasks = self.tasks.lock().expect("lock poisoned");
        if let Some(task) = tasks.get_mut(key) {
            task.total = Some(total);
        }
    }

    /// Marks `key` complete and schedules its subtree for removal after
    /// [`REMOVAL_DELAY`].
    pub fn complete(&self, key: &str) {
        let mut tasks = self.tasks.lock().expect("lock poisoned");
        if let Some(task) = tasks.get_mut(key) {
            if let Some(total) = task.total {
                task.completed = total;
            } else {
                task.completed = task.completed.max(1);
            }
        }
        drop(tasks);
        self.pending_removal
            .lock()
            .expect("lock poisoned")
            .push((key.to_string(), Instant::now()));
    }

    /// Weighted roll-up ratio for `key`: leaves return their own ratio;
    /// internal nodes return the weight-normalized sum of their children's
    /// ratios (children with zero total weight are ignored).
    pub fn ratio(&self, key: &str) -> f64 {
        let tasks = self.tasks.lock().expect("lock poisoned");
        Self::ratio_locked(&tasks, key)
    }

    fn ratio_locked(tasks: &HashMap<String, Task>, key: &str) -> f64 {
        let Some(task) = tasks.get(key) else {
            return 0.0;
        };
        if task.children.is_empty() {
            return task.own_ratio();
        }

        let mut ordered: Vec<&String> = task.children.iter().collect();
        ordered.sort_by(|a, b| {
            let ta = tasks.get(*a).map(|t| t.created_seq);
            let tb = tasks.get(*b).map(|t| t.created_seq);
            ta.cmp(&tb)
        });

        let total_weight: f64 = ordered
            .iter()
            .filter_map(|k| tasks.get(*k))
            .map(|t| t.weight)
            .sum();
        if total_weight <= 0.0 {
            return task.own_ratio();
        }

        ordered
            .iter()
            .filter_map(|k| tasks.get(*k).map(|t| (*k, t)))
            .map(|(k, child)| child.weight / total_weight * Self::ratio_locked(tasks, k))
            .sum()
    }

    /// Removes subtrees whose completion happened more than [`REMOVAL_DELAY`]
    /// ago. Call periodically; a no-op caller never loses data, it just
    /// keeps dead nodes around slightly longer.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut pending = self.pending_removal.lock().expect("lock poisoned");
        let (ready, still_pending): (Vec<_>, Vec<_>) = pending
            .drain(..)
            .partition(|(_, at)| now.duration_since(*at) >= REMOVAL_DELAY);
        *pending = still_pending;
        drop(pending);

        if ready.is_empty() {
            return;
        }

        let mut tasks = self.tasks.lock().expect("lock poisoned");
        let mut roots = self.roots.lock().expect("lock poisoned");
        for (key, _) in ready {
            if let Some(task) = tasks.get_mut(&key) {
                task.removed = true;
            }
            tasks.remove(&key);
            roots.retain(|r| r != &key);
            for t in tasks.values_mut() {
                t.children.retain(|c| c != &key);
            }
        }
    }

    pub fn snapshot(&self, key: &str) -> Option<ProgressSnapshot> {
        let tasks = self.tasks.lock().expect("lock poisoned");
        Self::snapshot_locked(&tasks, key)
    }

    fn snapshot_locked(tasks: &HashMap<String, Task>, key: &str) -> Option<ProgressSnapshot> {
        let task = tasks.get(key)?;
        let mut children: Vec<&String> = task.children.iter().collect();
        children.sort_by_key(|k| tasks.get(*k).map(|t| t.created_seq));
        Some(ProgressSnapshot {
            key: key.to_string(),
            name: task.name.clone(),
            ratio: Self::ratio_locked(tasks, key),
            children: children
                .into_iter()
                .filter_map(|c| Self::snapshot_locked(tasks, c))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_ratio_matches_own_progress() {
        let pm = ProgressManager::new();
        let key = pm.start_task("leaf", None, 1.0, Some(10));
        pm.advance(&key, 3);
        assert!((pm.ratio(&key) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn indeterminate_task_contributes_zero_until_completed() {
        let pm = ProgressManager::new();
        let key = pm.start_task("indeterminate", None, 1.0, None);
        assert_eq!(pm.ratio(&key), 0.0);
        pm.complete(&key);
        assert_eq!(pm.ratio(&key), 1.0);
    }

    #[test]
    fn parent_ratio_is_weighted_sum_of_children() {
        let pm = ProgressManager::new();
        let parent = pm.start_task("parent", None, 1.0, None);
        let child_a = pm.start_task("a", Some(&parent), 1.0, Some(10));
        let child_b = pm.start_task("b", Some(&parent), 3.0, Some(10));

        pm.advance(&child_a, 10); // ratio 1.0, weight 1
        pm.advance(&child_b, 0); // ratio 0.0, weight 3

        // (1*1.0 + 3*0.0) / 4 = 0.25
        assert!((pm.ratio(&parent) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn sweep_does_not_remove_before_delay() {
        let pm = ProgressManager::new();
        let key = pm.start_task("leaf", None, 1.0, Some(1));
        pm.complete(&key);
        pm.sweep();
        assert!(pm.snapshot(&key).is_some());
    }
}
