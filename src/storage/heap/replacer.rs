use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use log::error;

use crate::error::{Error, Result};
use crate::storage::page::FrameId;

///  Replacer tracks frame usage for replacement in case of buffer pool is full.
///
/// Out of range frame ids and removing a non-evictable frame are contract
/// violations and reported as [`Error::InvalidFrame`] and
/// [`Error::FrameNotEvictable`].
pub trait Replacer: Send + Sync {
    /// Record the event that the given frame id is accessed at current timestamp.
    /// Create a new entry for access history if frame id has not been seen before.
    fn record_access(&self, frame_id: FrameId) -> Result<()>;

    /// Find the frame to evict with replace policy(e.g. backward k-distance). Only frames that
    /// are marked as evictable are candidates for eviction.
    ///
    /// Successful eviction of a frame should decrement the size of replacer and remove the frame's
    /// access history.
    ///
    /// Return the frame id if a frame is evicted successfully, None if no frames can be evicted.
    fn evict(&self) -> Option<FrameId>;

    /// Toggle whether a frame is evictable or non-evictable. this function also control replacer
    /// size. Note that size is equal to number of evictable entries.
    ///
    /// If a frame was previously evictable and is to be set to non-evictable, then size should
    /// decrement. If a frame was previously non-evictable and is to be set evictable, then size
    /// should increment. Frames without access history are left alone.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()>;

    /// Check if a frame is evictable. if the frame is not tracked, return false.
    fn is_evictable(&self, frame_id: FrameId) -> bool;

    /// Remove an evictable frame from replacer, along with its access history. This function
    /// should also decrement the replacer size if removal is successful.
    ///
    /// Note that this is different from evicting a frame without check replacer policy.
    ///
    /// If remove is called on a non-evictable frame, return an error. If the specified frame is
    /// not found, do nothing without return any error.
    fn remove(&self, frame_id: FrameId) -> Result<()>;

    /// Number of evictable frames.
    fn size(&self) -> usize;
}

/// Eviction rank of a frame, the smallest one is the victim.
#[derive(Debug, Eq, PartialEq)]
struct KDistance {
    frame_id: FrameId,
    /// backward k-distance, u64::MAX stands for +inf.
    distance: u64,
    /// the least recent timestamp kept in the history.
    earliest_access_at: u64,
}

impl PartialOrd for KDistance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KDistance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .cmp(&other.distance)
            .reverse()
            .then(self.earliest_access_at.cmp(&other.earliest_access_at))
            .then(self.frame_id.cmp(&other.frame_id))
    }
}

struct LRUKNode {
    k: usize,
    frame_id: FrameId,
    is_evictable: bool,
    /// history of last seen K timestamp of the given frame.
    /// Most recent timestamp stored in front.
    history: VecDeque<u64>,
}

impl LRUKNode {
    fn new(frame_id: FrameId, k: usize) -> Self {
        LRUKNode { history: VecDeque::with_capacity(k), k, frame_id, is_evictable: false }
    }

    fn record_access(&mut self, timestamp: u64) {
        if self.history.len() == self.k {
            self.history.pop_back();
        }
        self.history.push_front(timestamp)
    }

    fn k_distance(&self, now: u64) -> KDistance {
        // a node is only created on access, so the history is never empty.
        let earliest = self.history.back().copied().unwrap_or(0);
        let distance = if self.history.len() < self.k { u64::MAX } else { now - earliest };
        KDistance { frame_id: self.frame_id, distance, earliest_access_at: earliest }
    }
}

/// LRUKReplacer implements the LRU-k replacement policy.
///
/// The LRU-k algorithm evicts a frame whose backward k-distance is maximum of
/// all frames. Backward k-distance is computed as the difference in time between
/// the current timestamp and the timestamp of k-th previous access.
///
/// A frame with less than k history references is given +inf as its backward k-distance.
/// when multiple frames have +inf backward k-distance, classical LRU algorithm is used
/// to choose victim, i.e., the frame whose earliest recorded access is the oldest.
pub struct LRUKReplacer {
    nodes: HashMap<FrameId, LRUKNode>,
    current_timestamp: u64,
    current_size: usize,
    replacer_size: usize,
    k: usize,
}

impl LRUKReplacer {
    pub fn new(k: usize, size: usize) -> Self {
        assert!(k > 0, "replacer k should be larger than zero");
        let nodes = HashMap::new();
        LRUKReplacer { nodes, current_timestamp: 0, current_size: 0, replacer_size: size, k }
    }

    fn check_frame(&self, frame_id: FrameId) -> Result<()> {
        if frame_id >= self.replacer_size {
            error!("frame id {} out of range [0, {})", frame_id, self.replacer_size);
            return Err(Error::InvalidFrame(frame_id));
        }
        Ok(())
    }

    /// Record the event that the given frame id is accessed at current timestamp.
    /// Create a new entry for access history if frame id has not been seen before.
    /// New entries start as non-evictable.
    pub fn record_access(&mut self, frame_id: FrameId) -> Result<()> {
        self.check_frame(frame_id)?;
        self.current_timestamp += 1;
        let k = self.k;
        let node = self.nodes.entry(frame_id).or_insert_with(|| LRUKNode::new(frame_id, k));
        node.record_access(self.current_timestamp);
        Ok(())
    }

    /// Find the frame with the largest backward k-distance and evict that frame. Only frames
    /// that are marked as evictable are candidates for eviction.
    ///
    /// A Frame with less than k historical reference is given +inf as its backward k-distance.
    /// If multiple frames have inf backward k-distance, then evict the frame with the earliest
    /// timestamp overall.
    pub fn evict(&mut self) -> Option<FrameId> {
        let now = self.current_timestamp;
        let victim = self
            .nodes
            .values()
            .filter(|node| node.is_evictable)
            .map(|node| node.k_distance(now))
            .min()?;

        self.nodes.remove(&victim.frame_id);
        self.current_size -= 1;
        Some(victim.frame_id)
    }

    /// Toggle whether a frame is evictable or non-evictable. this function also control replacer
    /// size. Note that size is equal to number of evictable entries.
    ///
    /// For other scenarios, this function should terminate without modifying anything.
    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) -> Result<()> {
        self.check_frame(frame_id)?;
        let Some(node) = self.nodes.get_mut(&frame_id) else {
            return Ok(());
        };
        if node.is_evictable == evictable {
            return Ok(());
        }

        node.is_evictable = evictable;
        if evictable {
            self.current_size += 1;
        } else {
            self.current_size -= 1;
        }
        Ok(())
    }

    pub fn is_evictable(&self, frame_id: FrameId) -> bool {
        self.nodes.get(&frame_id).map_or(false, |node| node.is_evictable)
    }

    /// Remove an evictable frame from replacer, along with its access history. This function
    /// should also decrement the replacer size if removal is successful.
    ///
    /// Note that this is different from evicting a frame, which always remove the frame with the
    /// largest backward k-distance. This function removes specified frame id, no matter what its
    /// backward k-distance is.
    pub fn remove(&mut self, frame_id: FrameId) -> Result<()> {
        let Some(node) = self.nodes.get(&frame_id) else {
            return Ok(());
        };
        if !node.is_evictable {
            error!("remove non-evictable frame {} from replacer", frame_id);
            return Err(Error::FrameNotEvictable(frame_id));
        }
        self.nodes.remove(&frame_id);
        self.current_size -= 1;
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.current_size
    }
}

/// SyncLRUKReplacer implements the thread-safe version of LRU-k replacement policy,
/// basically all the heavy lifting are happens in the LRUKReplacer.
pub struct SyncLRUKReplacer {
    inner: Mutex<LRUKReplacer>,
}

impl SyncLRUKReplacer {
    pub fn new(k: usize, size: usize) -> Self {
        let inner = Mutex::new(LRUKReplacer::new(k, size));
        SyncLRUKReplacer { inner }
    }

    // a panic inside the replacer leaves its bookkeeping consistent at the
    // method boundary, so the poison flag is ignored.
    fn lock(&self) -> std::sync::MutexGuard<'_, LRUKReplacer> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Replacer for SyncLRUKReplacer {
    fn record_access(&self, frame_id: FrameId) -> Result<()> {
        self.lock().record_access(frame_id)
    }

    fn evict(&self) -> Option<FrameId> {
        self.lock().evict()
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()> {
        self.lock().set_evictable(frame_id, evictable)
    }

    fn is_evictable(&self, frame_id: FrameId) -> bool {
        self.lock().is_evictable(frame_id)
    }

    fn remove(&self, frame_id: FrameId) -> Result<()> {
        self.lock().remove(frame_id)
    }

    fn size(&self) -> usize {
        self.lock().size()
    }
}
