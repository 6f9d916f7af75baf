//! Hierarchical export progress.
//!
//! The session owns a [`ProgressTree`]; every track worker gets one
//! [`ProgressNode`] child weighted by its media kind and duration. Workers
//! only ever move their own node forward, and the root keeps a running sum so
//! callers can poll [`ProgressTree::fraction`] without taking any lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use vidscale_common::ExportDefaults;
use vidscale_media::MediaKind;

/// Fixed-point scale for unit counters (micro-units).
const SCALE: f64 = 1_000_000.0;

/// Units of work per second of media, by track kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressWeights {
    pub audio_units_per_sec: f64,
    pub video_units_per_sec: f64,
}

impl Default for ProgressWeights {
    fn default() -> Self {
        Self::from(&ExportDefaults::default())
    }
}

impl From<&ExportDefaults> for ProgressWeights {
    fn from(defaults: &ExportDefaults) -> Self {
        Self {
            audio_units_per_sec: defaults.audio_units_per_sec as f64,
            video_units_per_sec: defaults.video_units_per_sec as f64,
        }
    }
}

impl ProgressWeights {
    pub fn units_per_sec(&self, kind: MediaKind) -> f64 {
        match kind {
            MediaKind::Audio => self.audio_units_per_sec,
            _ => self.video_units_per_sec,
        }
    }
}

#[derive(Debug, Default)]
struct Totals {
    total: AtomicU64,
    completed: AtomicU64,
    children: Mutex<Vec<Arc<NodeInner>>>,
}

/// Root of the progress tree. Cloning shares the same counters.
#[derive(Debug, Clone, Default)]
pub struct ProgressTree {
    root: Arc<Totals>,
    weights: ProgressWeights,
}

impl ProgressTree {
    pub fn new(weights: ProgressWeights) -> Self {
        Self {
            root: Arc::default(),
            weights,
        }
    }

    pub fn weights(&self) -> ProgressWeights {
        self.weights
    }

    /// Register a child for a track of `kind` lasting `duration_secs`.
    pub fn add_child(&self, label: impl Into<String>, kind: MediaKind, duration_secs: f64) -> ProgressNode {
        let units = duration_secs.max(0.0) * self.weights.units_per_sec(kind);
        let node = ProgressNode {
            inner: Arc::new(NodeInner {
                label: label.into(),
                kind,
                total: to_fixed(units),
                completed: AtomicU64::new(0),
                units_per_sec: self.weights.units_per_sec(kind),
            }),
            root: Arc::clone(&self.root),
        };
        self.root.total.fetch_add(node.inner.total, Ordering::AcqRel);
        self.root
            .children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::clone(&node.inner));
        node
    }

    pub fn total_units(&self) -> f64 {
        from_fixed(self.root.total.load(Ordering::Acquire))
    }

    pub fn completed_units(&self) -> f64 {
        from_fixed(self.root.completed.load(Ordering::Acquire))
    }

    /// Completed fraction in `[0.0, 1.0]`; `0.0` while nothing is registered.
    pub fn fraction(&self) -> f64 {
        let total = self.root.total.load(Ordering::Acquire);
        if total == 0 {
            return 0.0;
        }
        let completed = self.root.completed.load(Ordering::Acquire);
        (completed as f64 / total as f64).min(1.0)
    }

    pub fn is_complete(&self) -> bool {
        let total = self.root.total.load(Ordering::Acquire);
        total > 0 && self.root.completed.load(Ordering::Acquire) >= total
    }

    pub fn children_count(&self) -> usize {
        self.root
            .children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Point-in-time view of every child, for display.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let children = self
            .root
            .children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|node| node.snapshot())
            .collect();
        ProgressSnapshot {
            fraction: self.fraction(),
            completed_units: self.completed_units(),
            total_units: self.total_units(),
            children,
        }
    }
}

#[derive(Debug)]
struct NodeInner {
    label: String,
    kind: MediaKind,
    units_per_sec: f64,
    total: u64,
    completed: AtomicU64,
}

/// One track's share of the progress tree.
#[derive(Clone)]
pub struct ProgressNode {
    inner: Arc<NodeInner>,
    root: Arc<Totals>,
}

impl std::fmt::Debug for ProgressNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressNode")
            .field("label", &self.inner.label)
            .field("kind", &self.inner.kind)
            .field("completed_units", &self.completed_units())
            .field("total_units", &self.total_units())
            .finish()
    }
}

impl ProgressNode {
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    /// Move to the position of a sample presented at `secs`.
    ///
    /// Earlier positions are ignored and the node never passes its total.
    pub fn advance_to_secs(&self, secs: f64) {
        if !secs.is_finite() {
            return;
        }
        self.advance_to_fixed(to_fixed(secs.max(0.0) * self.inner.units_per_sec));
    }

    /// Mark the node fully done.
    pub fn complete(&self) {
        self.advance_to_fixed(self.inner.total);
    }

    fn advance_to_fixed(&self, target: u64) {
        let target = target.min(self.inner.total);
        let previous = self.inner.completed.fetch_max(target, Ordering::AcqRel);
        if target > previous {
            self.root.completed.fetch_add(target - previous, Ordering::AcqRel);
        }
    }

    pub fn total_units(&self) -> f64 {
        from_fixed(self.inner.total)
    }

    pub fn completed_units(&self) -> f64 {
        from_fixed(self.inner.completed.load(Ordering::Acquire))
    }

    pub fn fraction(&self) -> f64 {
        if self.inner.total == 0 {
            return 0.0;
        }
        self.inner.completed.load(Ordering::Acquire) as f64 / self.inner.total as f64
    }
}

impl NodeInner {
    fn snapshot(&self) -> NodeSnapshot {
        let completed = self.completed.load(Ordering::Acquire);
        NodeSnapshot {
            label: self.label.clone(),
            kind: self.kind,
            completed_units: from_fixed(completed),
            total_units: from_fixed(self.total),
            fraction: if self.total == 0 {
                0.0
            } else {
                completed as f64 / self.total as f64
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub label: String,
    pub kind: MediaKind,
    pub completed_units: f64,
    pub total_units: f64,
    pub fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub fraction: f64,
    pub completed_units: f64,
    pub total_units: f64,
    pub children: Vec<NodeSnapshot>,
}

fn to_fixed(units: f64) -> u64 {
    (units * SCALE).round() as u64
}

fn from_fixed(fixed: u64) -> f64 {
    fixed as f64 / SCALE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_by_kind() {
        let tree = ProgressTree::new(ProgressWeights::default());
        let audio = tree.add_child("audio", MediaKind::Audio, 4.0);
        let video = tree.add_child("video", MediaKind::Video, 4.0);
        assert_eq!(audio.total_units(), 4.0);
        assert_eq!(video.total_units(), 40.0);
        assert_eq!(tree.total_units(), 44.0);
        assert_eq!(tree.children_count(), 2);
    }

    #[test]
    fn test_empty_tree_reports_zero() {
        let tree = ProgressTree::default();
        assert_eq!(tree.fraction(), 0.0);
        assert!(!tree.is_complete());
    }

    #[test]
    fn test_advance_is_monotonic() {
        let tree = ProgressTree::new(ProgressWeights::default());
        let node = tree.add_child("video", MediaKind::Video, 2.0);

        node.advance_to_secs(1.0);
        assert_eq!(node.completed_units(), 10.0);
        node.advance_to_secs(0.5);
        assert_eq!(node.completed_units(), 10.0);
        assert_eq!(tree.completed_units(), 10.0);
        assert_eq!(tree.fraction(), 0.5);
    }

    #[test]
    fn test_advance_clamps_to_total() {
        let tree = ProgressTree::new(ProgressWeights::default());
        let node = tree.add_child("audio", MediaKind::Audio, 1.0);
        node.advance_to_secs(30.0);
        node.advance_to_secs(f64::NAN);
        assert_eq!(node.completed_units(), 1.0);
        assert_eq!(tree.fraction(), 1.0);
    }

    #[test]
    fn test_complete_reaches_total_exactly() {
        let tree = ProgressTree::new(ProgressWeights::default());
        let a = tree.add_child("video", MediaKind::Video, 1.0 / 3.0);
        let b = tree.add_child("audio", MediaKind::Audio, 2.5);
        a.advance_to_secs(0.2);
        a.complete();
        b.complete();
        b.complete();
        assert!(tree.is_complete());
        assert_eq!(tree.completed_units(), tree.total_units());
    }

    #[test]
    fn test_concurrent_children() {
        let tree = ProgressTree::new(ProgressWeights::default());
        let nodes: Vec<_> = (0..4)
            .map(|i| tree.add_child(format!("track {i}"), MediaKind::Video, 10.0))
            .collect();

        std::thread::scope(|scope| {
            for node in &nodes {
                scope.spawn(move || {
                    for step in 0..=100 {
                        node.advance_to_secs(step as f64 / 10.0);
                    }
                });
            }
        });

        assert!(tree.is_complete());
        let snapshot = tree.snapshot();
        assert_eq!(snapshot.children.len(), 4);
        assert!(snapshot.children.iter().all(|child| child.fraction == 1.0));
    }
}
