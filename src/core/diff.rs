//! Directory comparison / diff engine (spec §4.7).
//!
//! [`DiffTree`] is an arena exactly like `core::tree::DirTree` — nodes
//! live in a flat `Vec` and reference each other by index — except each
//! node pairs up to two locations (one per side) instead of one, and
//! carries a roll-up [`Comparison`] instead of a size.
//!
//! Two dedicated worker pools drive it: a scanner (lists both sides of a
//! directory and reports its children) and a comparator (byte-compares
//! file pairs). Both pull from a three-level priority queue so that
//! directories the user has just expanded jump ahead of the background
//! sweep. Workers never touch the tree directly — it lives on the main
//! thread only — so a scan result comes back as a plain list of
//! (name, left, right, is_dir) tuples and the consumer is responsible for
//! calling `add_child` and queuing follow-on scan/compare jobs with the
//! real node ids it assigns. Every message carries the session's
//! generation so a cancelled session's stray messages are dropped instead
//! of corrupting a newer tree.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::storage::{Location, Router};

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Identical,
    Different,
    LeftOnly,
    RightOnly,
    Pending,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone)]
pub struct DiffNode {
    pub name: String,
    pub left: Option<Location>,
    pub right: Option<Location>,
    pub is_dir: bool,
    pub comparison: Comparison,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub expanded: bool,
    pub depth: usize,
    /// Set once the scanner has listed this directory's children.
    pub scanned: bool,
}

/// Arena-backed two-sided directory tree (spec §4.7).
pub struct DiffTree {
    pub nodes: Vec<DiffNode>,
    pub root: NodeId,
}

impl DiffTree {
    pub fn new(left_root: Location, right_root: Location) -> Self {
        let name = left_root.name();
        let root = DiffNode {
            name,
            left: Some(left_root),
            right: Some(right_root),
            is_dir: true,
            comparison: Comparison::Pending,
            parent: None,
            children: Vec::new(),
            expanded: true,
            depth: 0,
            scanned: false,
        };
        Self {
            nodes: vec![root],
            root: 0,
        }
    }

    pub fn get(&self, id: NodeId) -> &DiffNode {
        &self.nodes[id]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut DiffNode {
        &mut self.nodes[id]
    }

    pub fn add_child(
        &mut self,
        parent_id: NodeId,
        name: String,
        left: Option<Location>,
        right: Option<Location>,
        is_dir: bool,
    ) -> NodeId {
        let depth = self.nodes[parent_id].depth + 1;
        let comparison = match (&left, &right) {
            (Some(_), None) => Comparison::LeftOnly,
            (None, Some(_)) => Comparison::RightOnly,
            (Some(_), Some(_)) if is_dir => Comparison::Pending,
            (Some(_), Some(_)) => Comparison::Pending,
            (None, None) => Comparison::Error,
        };
        let id = self.nodes.len();
        self.nodes.push(DiffNode {
            name,
            left,
            right,
            is_dir,
            comparison,
            parent: Some(parent_id),
            children: Vec::new(),
            expanded: false,
            depth,
            scanned: false,
        });
        self.nodes[parent_id].children.push(id);
        id
    }

    pub fn toggle_expand(&mut self, id: NodeId) {
        if self.nodes[id].is_dir {
            self.nodes[id].expanded = !self.nodes[id].expanded;
        }
    }

    pub fn visible_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_visible(self.root, &mut out);
        out
    }

    /// `id` plus every node beneath it, regardless of expansion state —
    /// used to reprioritize a whole subtree's queued scan/compare jobs
    /// when the user expands a directory (spec §4.7).
    pub fn subtree_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_subtree(id, &mut out);
        out
    }

    fn collect_subtree(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        for &child in &self.nodes[id].children {
            self.collect_subtree(child, out);
        }
    }

    fn collect_visible(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        let node = &self.nodes[id];
        if node.expanded {
            for &child in &node.children {
                self.collect_visible(child, out);
            }
        }
    }

    /// Recompute `id`'s comparison from its children (IDENTICAL iff every
    /// child is IDENTICAL; ERROR propagates; otherwise DIFFERENT), then
    /// propagate upward through ancestors (spec §4.7's roll-up rule).
    pub fn rollup_from(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self.nodes[node_id];
            if node.is_dir && node.scanned {
                let children = node.children.clone();
                let rolled = rollup_of(&children, &self.nodes);
                self.nodes[node_id].comparison = rolled;
            }
            current = self.nodes[node_id].parent;
        }
    }
}

/// Spec §4.7: "pending until all children resolved"; once every child has
/// a final status, "IDENTICAL iff all IDENTICAL; else DIFFERENT unless any
/// child is ERROR, in which case ERROR" — ERROR outranks DIFFERENT, so this
/// scans every child for a verdict before deciding, rather than returning
/// as soon as the first DIFFERENT child is seen.
fn rollup_of(children: &[NodeId], nodes: &[DiffNode]) -> Comparison {
    if children.is_empty() {
        return Comparison::Identical;
    }
    let mut any_pending = false;
    let mut any_error = false;
    let mut any_different = false;
    for &c in children {
        match nodes[c].comparison {
            Comparison::Pending => any_pending = true,
            Comparison::Error => any_error = true,
            Comparison::Identical => {}
            Comparison::Different | Comparison::LeftOnly | Comparison::RightOnly => any_different = true,
        }
    }
    if any_pending {
        Comparison::Pending
    } else if any_error {
        Comparison::Error
    } else if any_different {
        Comparison::Different
    } else {
        Comparison::Identical
    }
}

/// One unit of scanning work: list both sides of `node` and create
/// matched/unmatched children. Carries its own locations rather than
/// looking the node up in the tree, since the tree lives on the main
/// thread only (spec §5) and workers never touch it directly.
#[derive(Debug, Clone)]
struct ScanJob {
    node: NodeId,
    left: Option<Location>,
    right: Option<Location>,
    priority: ScanPriority,
}

/// One unit of comparison work: byte-compare a matched file pair.
#[derive(Debug, Clone)]
struct CompareJob {
    node: NodeId,
    left: Location,
    right: Location,
    priority: ScanPriority,
}

struct PriorityQueue<T> {
    high: VecDeque<T>,
    medium: VecDeque<T>,
    low: VecDeque<T>,
}

impl<T> PriorityQueue<T> {
    fn new() -> Self {
        Self {
            high: VecDeque::new(),
            medium: VecDeque::new(),
            low: VecDeque::new(),
        }
    }

    fn push(&mut self, item: T, priority: ScanPriority) {
        match priority {
            ScanPriority::High => self.high.push_back(item),
            ScanPriority::Medium => self.medium.push_back(item),
            ScanPriority::Low => self.low.push_back(item),
        }
    }

    fn pop(&mut self) -> Option<T> {
        self.high
            .pop_front()
            .or_else(|| self.medium.pop_front())
            .or_else(|| self.low.pop_front())
    }

    fn len(&self) -> usize {
        self.high.len() + self.medium.len() + self.low.len()
    }

    /// Moves every medium/low entry matching `pred` to the front of the
    /// queue (`high`), preserving relative order among the promoted items
    /// and among those left behind.
    fn promote_matching(&mut self, pred: impl Fn(&T) -> bool) {
        let mut kept = VecDeque::with_capacity(self.medium.len());
        while let Some(item) = self.medium.pop_front() {
            if pred(&item) {
                self.high.push_back(item);
            } else {
                kept.push_back(item);
            }
        }
        self.medium = kept;

        let mut kept = VecDeque::with_capacity(self.low.len());
        while let Some(item) = self.low.pop_front() {
            if pred(&item) {
                self.high.push_back(item);
            } else {
                kept.push_back(item);
            }
        }
        self.low = kept;
    }
}

/// What a scan or compare worker reports back to the main thread.
#[derive(Debug)]
pub enum DiffUpdate {
    Scanned {
        node: NodeId,
        children: Vec<(String, Option<Location>, Option<Location>, bool)>,
    },
    Compared {
        node: NodeId,
        comparison: Comparison,
    },
    WorkerDone,
}

/// Byte-compares two file locations, reading through the router in 64 KiB
/// chunks so it works uniformly across local/SFTP/S3/archive pairs.
fn compare_files(router: &Router, left: &Location, right: &Location, cancel: &AtomicBool) -> Comparison {
    let left_stat = router.stat(left);
    let right_stat = router.stat(right);
    match (left_stat, right_stat) {
        (Ok(l), Ok(r)) if l.size != r.size => return Comparison::Different,
        (Ok(_), Ok(_)) => {}
        _ => return Comparison::Error,
    }

    let (mut lr, mut rr) = match (router.open_read(left), router.open_read(right)) {
        (Ok(l), Ok(r)) => (l, r),
        _ => return Comparison::Error,
    };

    let mut lbuf = vec![0u8; 64 * 1024];
    let mut rbuf = vec![0u8; 64 * 1024];
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Comparison::Error;
        }
        let ln = match std::io::Read::read(&mut lr, &mut lbuf) {
            Ok(n) => n,
            Err(_) => return Comparison::Error,
        };
        let rn = match std::io::Read::read(&mut rr, &mut rbuf) {
            Ok(n) => n,
            Err(_) => return Comparison::Error,
        };
        if ln != rn {
            return Comparison::Different;
        }
        if ln == 0 {
            return Comparison::Identical;
        }
        if lbuf[..ln] != rbuf[..rn] {
            return Comparison::Different;
        }
    }
}

/// A running comparison session: two worker pools plus the job queues they
/// share, generation-tagged so a cancelled session's stray messages are
/// dropped by the consumer instead of corrupting a newer tree.
pub struct DiffSession {
    pub generation: u64,
    scan_queue: Arc<Mutex<PriorityQueue<ScanJob>>>,
    compare_queue: Arc<Mutex<PriorityQueue<CompareJob>>>,
    cancel: Arc<AtomicBool>,
}

impl DiffSession {
    pub fn start(
        generation: u64,
        router: Arc<Router>,
        root: NodeId,
        left_root: Location,
        right_root: Location,
        tx: std::sync::mpsc::Sender<(u64, DiffUpdate)>,
    ) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let scan_queue = Arc::new(Mutex::new(PriorityQueue::new()));
        let compare_queue = Arc::new(Mutex::new(PriorityQueue::new()));

        scan_queue.lock().unwrap().push(
            ScanJob {
                node: root,
                left: Some(left_root),
                right: Some(right_root),
                priority: ScanPriority::High,
            },
            ScanPriority::High,
        );

        let worker_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4).max(1);
        let scanner_count = (worker_count / 2).max(1);
        let comparator_count = worker_count.saturating_sub(scanner_count).max(1);

        for _ in 0..scanner_count {
            let queue = scan_queue.clone();
            let router = router.clone();
            let cancel = cancel.clone();
            let tx = tx.clone();
            std::thread::spawn(move || {
                loop {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let job = {
                        let mut q = queue.lock().unwrap();
                        q.pop()
                    };
                    let Some(job) = job else { break };
                    run_scan_job(&router, &job, &tx, generation);
                }
                let _ = tx.send((generation, DiffUpdate::WorkerDone));
            });
        }

        for _ in 0..comparator_count {
            let queue = compare_queue.clone();
            let router = router.clone();
            let cancel = cancel.clone();
            let tx = tx.clone();
            std::thread::spawn(move || {
                loop {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let job = {
                        let mut q = queue.lock().unwrap();
                        q.pop()
                    };
                    let Some(job) = job else { break };
                    let comparison = compare_files(&router, &job.left, &job.right, &cancel);
                    let _ = tx.send((
                        generation,
                        DiffUpdate::Compared {
                            node: job.node,
                            comparison,
                        },
                    ));
                }
                let _ = tx.send((generation, DiffUpdate::WorkerDone));
            });
        }

        Self {
            generation,
            scan_queue,
            compare_queue,
            cancel,
        }
    }

    /// Push a freshly-expanded directory to the front of the scan queue
    /// (spec §4.7's "directories the user expands jump the queue").
    pub fn prioritize(&self, node: NodeId, left: Option<Location>, right: Option<Location>) {
        self.scan_queue.lock().unwrap().push(
            ScanJob { node, left, right, priority: ScanPriority::High },
            ScanPriority::High,
        );
    }

    /// Bumps every already-queued scan/compare job for any of `nodes` to
    /// `High` priority, without touching jobs that haven't been queued yet
    /// (spec §4.7: "expanding a node reprioritizes its subtree"). Unlike
    /// [`DiffSession::prioritize`], this never enqueues a new job — a node
    /// with nothing pending simply has nothing to promote.
    pub fn prioritize_subtree(&self, nodes: &[NodeId]) {
        self.scan_queue.lock().unwrap().promote_matching(|job| nodes.contains(&job.node));
        self.compare_queue.lock().unwrap().promote_matching(|job| nodes.contains(&job.node));
    }

    /// Queue a directory for scanning as part of the background sweep.
    /// Called by the consumer after it assigns a real `NodeId` to a child
    /// the scanner just reported — workers never allocate node ids
    /// themselves since the tree lives on the main thread only.
    pub fn enqueue_scan(&self, node: NodeId, left: Option<Location>, right: Option<Location>, priority: ScanPriority) {
        self.scan_queue.lock().unwrap().push(ScanJob { node, left, right, priority }, priority);
    }

    /// Queue a matched file pair for byte comparison, once the consumer
    /// has a real node id for it.
    pub fn enqueue_compare(&self, node: NodeId, left: Location, right: Location, priority: ScanPriority) {
        self.compare_queue.lock().unwrap().push(CompareJob { node, left, right, priority }, priority);
    }

    pub fn is_idle(&self) -> bool {
        self.scan_queue.lock().unwrap().len() == 0 && self.compare_queue.lock().unwrap().len() == 0
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

/// Lists both sides of `job` and merges them by name into the child set a
/// [`DiffUpdate::Scanned`] reports. A name present on only one side becomes
/// a LEFT_ONLY/RIGHT_ONLY child; a name on both sides is handed back for
/// the consumer to pair up (directory: queue for further scanning; file:
/// queue for byte comparison).
fn run_scan_job(
    router: &Router,
    job: &ScanJob,
    tx: &std::sync::mpsc::Sender<(u64, DiffUpdate)>,
    generation: u64,
) {
    let mut merged: std::collections::BTreeMap<String, (Option<Location>, Option<Location>, bool)> =
        std::collections::BTreeMap::new();

    if let Some(left) = &job.left {
        if let Ok(entries) = router.list(left) {
            for entry in entries {
                merged.insert(entry.display_name.clone(), (Some(entry.location), None, entry.is_dir()));
            }
        }
    }
    if let Some(right) = &job.right {
        if let Ok(entries) = router.list(right) {
            for entry in entries {
                merged
                    .entry(entry.display_name.clone())
                    .and_modify(|(_, right_loc, _)| *right_loc = Some(entry.location.clone()))
                    .or_insert((None, Some(entry.location), entry.is_dir()));
            }
        }
    }

    let children = merged
        .into_iter()
        .map(|(name, (left, right, is_dir))| (name, left, right, is_dir))
        .collect();

    let _ = tx.send((
        generation,
        DiffUpdate::Scanned {
            node: job.node,
            children,
        },
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollup_identical_when_all_children_identical() {
        let mut tree = DiffTree::new(
            Location::Local("/l".into()),
            Location::Local("/r".into()),
        );
        tree.nodes[tree.root].scanned = true;
        let a = tree.add_child(tree.root, "a".into(), Some(Location::Local("/l/a".into())), Some(Location::Local("/r/a".into())), false);
        tree.nodes[a].comparison = Comparison::Identical;
        let b = tree.add_child(tree.root, "b".into(), Some(Location::Local("/l/b".into())), Some(Location::Local("/r/b".into())), false);
        tree.nodes[b].comparison = Comparison::Identical;
        tree.rollup_from(a);
        assert_eq!(tree.get(tree.root).comparison, Comparison::Identical);
    }

    #[test]
    fn rollup_different_propagates_up() {
        let mut tree = DiffTree::new(
            Location::Local("/l".into()),
            Location::Local("/r".into()),
        );
        tree.nodes[tree.root].scanned = true;
        let a = tree.add_child(tree.root, "a".into(), Some(Location::Local("/l/a".into())), None, false);
        assert_eq!(tree.get(a).comparison, Comparison::LeftOnly);
        tree.rollup_from(a);
        assert_eq!(tree.get(tree.root).comparison, Comparison::Different);
    }

    #[test]
    fn rollup_error_outranks_different_regardless_of_child_order() {
        let mut tree = DiffTree::new(
            Location::Local("/l".into()),
            Location::Local("/r".into()),
        );
        tree.nodes[tree.root].scanned = true;
        let a = tree.add_child(tree.root, "a".into(), Some(Location::Local("/l/a".into())), Some(Location::Local("/r/a".into())), false);
        tree.nodes[a].comparison = Comparison::Different;
        let b = tree.add_child(tree.root, "b".into(), Some(Location::Local("/l/b".into())), Some(Location::Local("/r/b".into())), false);
        tree.nodes[b].comparison = Comparison::Error;
        tree.rollup_from(b);
        assert_eq!(tree.get(tree.root).comparison, Comparison::Error);
    }

    #[test]
    fn rollup_pending_while_any_child_unresolved() {
        let mut tree = DiffTree::new(
            Location::Local("/l".into()),
            Location::Local("/r".into()),
        );
        tree.nodes[tree.root].scanned = true;
        let a = tree.add_child(tree.root, "a".into(), Some(Location::Local("/l/a".into())), Some(Location::Local("/r/a".into())), false);
        tree.nodes[a].comparison = Comparison::Different;
        let b = tree.add_child(tree.root, "b".into(), Some(Location::Local("/l/b".into())), Some(Location::Local("/r/b".into())), false);
        assert_eq!(tree.get(b).comparison, Comparison::Pending);
        tree.rollup_from(a);
        assert_eq!(tree.get(tree.root).comparison, Comparison::Pending);
    }

    #[test]
    fn promote_matching_moves_medium_and_low_entries_to_high_in_order() {
        let mut q: PriorityQueue<i32> = PriorityQueue::new();
        q.push(10, ScanPriority::Low);
        q.push(1, ScanPriority::Medium);
        q.push(2, ScanPriority::Medium);
        q.push(20, ScanPriority::Low);
        q.push(3, ScanPriority::Medium);

        q.promote_matching(|&n| n != 2 && n != 20);

        // 1 and 3 (medium) jump ahead of 10 and 20 (left behind in low).
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(10));
        assert_eq!(q.pop(), Some(20));
    }

    #[test]
    fn priority_queue_pops_high_before_low() {
        let mut q: PriorityQueue<i32> = PriorityQueue::new();
        q.push(1, ScanPriority::Low);
        q.push(2, ScanPriority::High);
        q.push(3, ScanPriority::Medium);
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), Some(1));
    }
}
