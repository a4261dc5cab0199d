//! Keeps the on-screen entities in step with the tracker.
//!
//! Batches create and move entities; frame ticks extrapolate them along their
//! last reported velocity and expire the ones the tracker stopped reporting.
//! Everything the renderer sees goes through [`Renderer`].

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use log::{debug, warn};

use crate::appearance::AppearanceTable;
use crate::error::EntryError;
use crate::renderer::Renderer;
use crate::types::{ObjectId, ObjectType, Pose, Timestamp, TrackedUpdateBatch, Vec2};

/// When an entity that stopped being refreshed is taken off screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Expire once the entity has not been seen for longer than the window.
    #[default]
    Elapsed,
    /// Like `Elapsed`, but an entity present in the latest batch never expires.
    ElapsedAndAbsent,
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub expiry_window: Duration,
    pub expiry_policy: ExpiryPolicy,
    pub appearances: AppearanceTable,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            expiry_window: Duration::from_millis(500),
            expiry_policy: ExpiryPolicy::default(),
            appearances: AppearanceTable::default(),
        }
    }
}

/// Whether an entity is still on screen at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Present,
    Expired { idle_ms: u64 },
}

/// One tracked object as it is currently drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    object_type: ObjectType,
    /// Position reported by the batch that last contained this object.
    anchor: Vec2,
    rotation: f64,
    velocity: Vec2,
    last_seen_at: Timestamp,
    /// Frame time accumulated since `last_seen_at`.
    extrapolated_ms: f64,
}

impl Entity {
    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    pub fn last_seen_at(&self) -> Timestamp {
        self.last_seen_at
    }

    /// Last reported position plus the motion extrapolated since.
    pub fn position(&self) -> Vec2 {
        self.anchor + self.velocity * (self.extrapolated_ms / 1000.0)
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position(), self.rotation)
    }

    pub fn liveness(&self, now: Timestamp, window: Duration) -> Liveness {
        let idle_ms = now.millis_since(self.last_seen_at);
        if u128::from(idle_ms) > window.as_millis() {
            Liveness::Expired { idle_ms }
        } else {
            Liveness::Present
        }
    }
}

/// What a batch did to the table.
#[derive(Debug, Default, PartialEq)]
pub struct BatchOutcome {
    pub created: usize,
    pub updated: usize,
    /// Known entities reported with an older timestamp than they were last
    /// seen at. Their pose is left alone.
    pub stale: usize,
    pub rejected: Vec<EntryError>,
}

/// What a frame tick did to the table.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub moved: usize,
    pub expired: usize,
}

#[derive(Debug)]
pub struct Reconciler {
    config: ReconcilerConfig,
    entities: BTreeMap<ObjectId, Entity>,
    latest_batch: BTreeSet<ObjectId>,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config,
            entities: BTreeMap::new(),
            latest_batch: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, id: &ObjectId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn apply_batch(
        &mut self,
        batch: &TrackedUpdateBatch,
        now: Timestamp,
        renderer: &mut impl Renderer,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        self.latest_batch.clear();

        for (id, update) in batch {
            self.latest_batch.insert(id.clone());

            if let Some(entity) = self.entities.get_mut(id) {
                if entity.object_type != update.object_type {
                    debug!(
                        "{id} reported as {} but drawn as {}",
                        update.object_type, entity.object_type
                    );
                }
                if now < entity.last_seen_at {
                    debug!("{id} reported at {now:?}, already seen at {:?}", entity.last_seen_at);
                    outcome.stale += 1;
                    continue;
                }
                entity.anchor = update.position;
                entity.rotation = update.rotation;
                entity.velocity = update.velocity;
                entity.last_seen_at = now;
                entity.extrapolated_ms = 0.0;
                renderer.update_pose(id, entity.pose());
                outcome.updated += 1;
                continue;
            }

            let Some(appearance) = self.config.appearances.get(update.object_type) else {
                let err = EntryError::NoAppearance {
                    id: id.clone(),
                    object_type: update.object_type,
                };
                warn!("{err}");
                outcome.rejected.push(err);
                continue;
            };
            let entity = Entity {
                object_type: update.object_type,
                anchor: update.position,
                rotation: update.rotation,
                velocity: update.velocity,
                last_seen_at: now,
                extrapolated_ms: 0.0,
            };
            renderer.create(id, entity.object_type, appearance, entity.pose());
            self.entities.insert(id.clone(), entity);
            outcome.created += 1;
        }

        outcome
    }

    /// One render frame. `delta_ms` is the frame time; a non-positive delta
    /// moves nothing, but expiry is still judged against `now`. Accumulated
    /// extrapolation never exceeds the time since the entity was last seen.
    pub fn advance(
        &mut self,
        delta_ms: f64,
        now: Timestamp,
        renderer: &mut impl Renderer,
    ) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let step = if delta_ms.is_finite() && delta_ms > 0.0 {
            delta_ms
        } else {
            0.0
        };
        let window = self.config.expiry_window;
        let policy = self.config.expiry_policy;
        let latest_batch = &self.latest_batch;

        self.entities.retain(|id, entity| {
            let expired = match entity.liveness(now, window) {
                Liveness::Present => None,
                Liveness::Expired { idle_ms } => match policy {
                    ExpiryPolicy::Elapsed => Some(idle_ms),
                    ExpiryPolicy::ElapsedAndAbsent => (!latest_batch.contains(id)).then_some(idle_ms),
                },
            };
            if let Some(idle_ms) = expired {
                debug!("{id} expired after {idle_ms} ms");
                renderer.remove(id);
                outcome.expired += 1;
                return false;
            }

            // Frame time from before the last batch does not count.
            let since_seen = now.millis_since(entity.last_seen_at) as f64;
            entity.extrapolated_ms = (entity.extrapolated_ms + step).min(since_seen);
            renderer.update_pose(id, entity.pose());
            outcome.moved += 1;
            true
        });

        outcome
    }

    /// Takes every entity off screen and empties the table.
    pub fn shutdown(&mut self, renderer: &mut impl Renderer) -> usize {
        let entities = std::mem::take(&mut self.entities);
        self.latest_batch.clear();
        for id in entities.keys() {
            renderer.remove(id);
        }
        entities.len()
    }
}
