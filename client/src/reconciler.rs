use log::{debug, trace};
use shared::{Rgb, Slot, Snapshot, SnapshotEntry, Vec2};
use std::collections::btree_map::{self, BTreeMap};
use std::collections::HashSet;
use std::time::Instant;

/// Remaining distance at or below which a remote avatar jumps onto its target.
pub const SNAP_THRESHOLD: f32 = 1.0;
/// Remote smoothing speed, in world units per frame at [`REFERENCE_FPS`].
pub const REMOTE_SPEED_PER_FRAME: f32 = 6.0;
pub const REFERENCE_FPS: f32 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingConfig {
    pub speed_per_frame: f32,
    pub snap_threshold: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            speed_per_frame: REMOTE_SPEED_PER_FRAME,
            snap_threshold: SNAP_THRESHOLD,
        }
    }
}

/// Smoothing state for one remote player.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteBuffer {
    pub session_id: String,
    pub render_position: Vec2,
    pub target_position: Vec2,
    pub color: Rgb,
    pub display_name: Option<String>,
    pub last_update: Instant,
}

/// Who "self" is, so the network feed never renders the local player.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalIdentity<'a> {
    pub session_id: Option<&'a str>,
    pub slot: Option<Slot>,
}

/// What one snapshot did to the buffer set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub skipped_local: usize,
    pub invalid: usize,
}

/// Per-slot render/target buffers for every remote player.
///
/// Snapshots replace targets; [`Reconciler::advance`] walks render positions toward them at
/// one constant speed. A slot missing from a snapshot is dropped, so the buffer set heals
/// from snapshots alone even if a leave event is lost.
#[derive(Debug)]
pub struct Reconciler {
    config: SmoothingConfig,
    buffers: BTreeMap<Slot, RemoteBuffer>,
}

impl Reconciler {
    pub fn new(config: SmoothingConfig) -> Self {
        Self {
            config,
            buffers: BTreeMap::new(),
        }
    }

    pub fn apply_snapshot(
        &mut self,
        snapshot: &Snapshot,
        local: LocalIdentity<'_>,
        now: Instant,
    ) -> SnapshotSummary {
        let mut summary = SnapshotSummary::default();
        let mut seen = HashSet::new();

        for (session_id, entry) in snapshot.entries() {
            let info = match entry {
                SnapshotEntry::Valid(info) => info,
                SnapshotEntry::Invalid { reason } => {
                    trace!("Dropping snapshot entry {}: {}", session_id, reason);
                    summary.invalid += 1;
                    continue;
                }
            };

            if local.session_id == Some(session_id) || local.slot == Some(info.slot) {
                summary.skipped_local += 1;
                continue;
            }

            seen.insert(info.slot);

            match self.buffers.entry(info.slot) {
                btree_map::Entry::Vacant(vacant) => {
                    vacant.insert(RemoteBuffer {
                        session_id: session_id.to_string(),
                        render_position: info.position,
                        target_position: info.position,
                        color: info.color,
                        display_name: info.username.clone(),
                        last_update: now,
                    });
                    summary.created += 1;
                }
                btree_map::Entry::Occupied(mut occupied) => {
                    let buffer = occupied.get_mut();
                    buffer.session_id = session_id.to_string();
                    buffer.target_position = info.position;
                    buffer.color = info.color;
                    buffer.display_name = info.username.clone();
                    buffer.last_update = now;
                    summary.updated += 1;
                }
            }
        }

        let before = self.buffers.len();
        self.buffers.retain(|slot, _| seen.contains(slot));
        summary.removed = before - self.buffers.len();

        if summary.created > 0 || summary.removed > 0 {
            debug!(
                "Snapshot: {} new, {} gone, {} remote players",
                summary.created,
                summary.removed,
                self.buffers.len()
            );
        }

        summary
    }

    /// Moves every render position toward its target by `speed * dt * 60`, never past it.
    pub fn advance(&mut self, dt: f32) {
        if dt.is_nan() || dt <= 0.0 {
            return;
        }

        let step = self.config.speed_per_frame * dt * REFERENCE_FPS;

        for buffer in self.buffers.values_mut() {
            let delta = buffer.target_position - buffer.render_position;
            let distance = delta.length();

            if distance <= self.config.snap_threshold || step >= distance {
                buffer.render_position = buffer.target_position;
            } else {
                buffer.render_position = buffer.render_position + delta * (step / distance);
            }
        }
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    pub fn get(&self, slot: Slot) -> Option<&RemoteBuffer> {
        self.buffers.get(&slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, &RemoteBuffer)> {
        self.buffers.iter().map(|(slot, buffer)| (*slot, buffer))
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(SmoothingConfig::default())
    }
}
