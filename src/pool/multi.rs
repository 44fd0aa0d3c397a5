use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use smallvec::SmallVec;

use crate::{
    log,
    utils::Vec2
};

use super::{
    InstanceHandle,
    ParentLink,
    Poolable,
    Prototype,
    PrototypeKey,
    ResourcePool
};

pub type RandomGenerator = Pcg64;

// ----------------------------------------------
// PoolEntry / AttachPolicy
// ----------------------------------------------

// Configuration for one prototype in a WeightedMultiPool.
pub struct PoolEntry<P> {
    pub key: PrototypeKey,
    pub prototype: P,
    pub warm_count: u32,
    pub weight: f32,
    pub expandable: bool,
}

impl<P> PoolEntry<P> {
    pub fn new(key: PrototypeKey, prototype: P) -> Self {
        Self {
            key,
            prototype,
            warm_count: 0,
            weight: 1.0,
            expandable: true,
        }
    }

    #[inline]
    pub fn with_warm_count(mut self, warm_count: u32) -> Self {
        self.warm_count = warm_count;
        self
    }

    #[inline]
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    #[inline]
    pub fn with_expandable(mut self, expandable: bool) -> Self {
        self.expandable = expandable;
        self
    }
}

// Whether spawned instances stay grouped under the pool's anchor or
// are handed off at spawn to live on their own.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AttachPolicy {
    KeepUnderAnchor,
    DetachFromAnchor,
}

#[derive(Copy, Clone)]
struct EntryState {
    key: PrototypeKey,
    weight: f32,
    expandable: bool,
}

// ----------------------------------------------
// WeightedMultiPool
// ----------------------------------------------

// Pool over several prototypes with weighted random selection.
// Selection draws from a seeded generator, so runs are reproducible.
pub struct WeightedMultiPool<P: Prototype> {
    pool: ResourcePool<P>,
    entries: SmallVec<[EntryState; 4]>,
    total_weight: f32,
    fallback_first_valid: bool,
    attach_policy: AttachPolicy,
    rng: RandomGenerator,
}

impl<P: Prototype> WeightedMultiPool<P> {
    // Registers every entry and performs its warm-up. Entries with
    // invalid keys or duplicate names are skipped with a diagnostic.
    // Fails only if a prototype factory fails during warm-up.
    pub fn try_new(entries: Vec<PoolEntry<P>>,
                   attach_policy: AttachPolicy,
                   seed: u64) -> Result<Self, String> {

        let mut multi_pool = Self {
            pool: ResourcePool::new(),
            entries: SmallVec::new(),
            total_weight: 0.0,
            fallback_first_valid: true,
            attach_policy,
            rng: RandomGenerator::seed_from_u64(seed),
        };

        for entry in entries {
            if !multi_pool.pool.register_prototype(entry.key, entry.prototype) {
                continue;
            }

            multi_pool.entries.push(EntryState {
                key: entry.key,
                weight: entry.weight,
                expandable: entry.expandable,
            });

            multi_pool.pool.warm_up(entry.key, entry.warm_count)?;
        }

        multi_pool.recalculate_total_weight();
        Ok(multi_pool)
    }

    // When the total weight is zero, fall back to the first entry
    // instead of refusing to spawn. Defaults to on.
    #[inline]
    pub fn set_fallback_first_valid(&mut self, fallback: bool) {
        self.fallback_first_valid = fallback;
    }

    // ----------------------
    // Weights:
    // ----------------------

    fn recalculate_total_weight(&mut self) {
        self.total_weight = self.entries
            .iter()
            .filter(|entry| entry.key.is_valid() && entry.weight > 0.0)
            .map(|entry| entry.weight)
            .sum();
    }

    // Re-sums the cached total. Call after a batch of set_weight().
    #[inline]
    pub fn rebuild_weights(&mut self) {
        self.recalculate_total_weight();
    }

    // Updates one entry's weight. Does not refresh the cached total;
    // follow with rebuild_weights().
    pub fn set_weight(&mut self, key: PrototypeKey, weight: f32) -> bool {
        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => {
                entry.weight = weight;
                true
            }
            None => {
                log::warn!(log::channel!("pool"), "set_weight: no entry for prototype '{key}'.");
                false
            }
        }
    }

    #[inline]
    pub fn total_weight(&self) -> f32 {
        self.total_weight
    }

    // ----------------------
    // Selection:
    // ----------------------

    // Weighted random pick over entries with positive weight. Returns
    // None when there is nothing selectable (and the zero-weight
    // fallback is off).
    pub fn select_prototype_for_spawn(&mut self) -> Option<PrototypeKey> {
        if self.entries.is_empty() {
            return None;
        }

        if self.total_weight <= 0.0 {
            if self.fallback_first_valid {
                return self.entries
                    .iter()
                    .find(|entry| entry.key.is_valid())
                    .map(|entry| entry.key);
            }
            return None;
        }

        let roll = self.rng.random::<f32>() * self.total_weight;

        let mut accumulated = 0.0;
        for entry in &self.entries {
            if !entry.key.is_valid() || entry.weight <= 0.0 {
                continue;
            }
            accumulated += entry.weight;
            if roll <= accumulated {
                return Some(entry.key);
            }
        }

        // Accumulation fell short of the roll due to float rounding;
        // resolve to the last valid entry.
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.key.is_valid())
            .map(|entry| entry.key)
    }

    // ----------------------
    // Spawn / Despawn:
    // ----------------------

    // Spawns a weighted-random prototype at the given transform.
    // Ok(None) when nothing is selectable or the chosen pool cannot
    // supply an instance.
    pub fn try_spawn(&mut self, position: Vec2, rotation: f32) -> Result<Option<InstanceHandle>, String> {
        let Some(key) = self.select_prototype_for_spawn() else {
            log::warn!(log::channel!("pool"), "Spawn failed: no prototype selectable.");
            return Ok(None);
        };
        self.spawn_internal(key, position, rotation, true)
    }

    // Spawns a specific prototype by key. Creation beyond the pooled
    // instances requires both the caller's `allow_create` and the
    // entry's own expandable setting.
    pub fn try_spawn_specific(&mut self,
                              key: PrototypeKey,
                              position: Vec2,
                              rotation: f32,
                              allow_create: bool) -> Result<Option<InstanceHandle>, String> {

        let Some(entry) = self.entries.iter().find(|entry| entry.key == key) else {
            log::warn!(log::channel!("pool"), "try_spawn_specific: no entry for prototype '{key}'.");
            return Ok(None);
        };

        let allow = allow_create && entry.expandable;
        self.spawn_internal(key, position, rotation, allow)
    }

    fn spawn_internal(&mut self,
                      key: PrototypeKey,
                      position: Vec2,
                      rotation: f32,
                      allow_create: bool) -> Result<Option<InstanceHandle>, String> {

        let Some(handle) = self.pool.acquire(key, allow_create)? else {
            return Ok(None);
        };

        if self.attach_policy == AttachPolicy::DetachFromAnchor {
            self.pool.set_parent_link(handle, ParentLink::Detached);
        }

        // Place and activate before the spawn hook runs.
        let instance = self.pool.get_mut(handle)
            .ok_or_else(|| format!("Acquired handle {handle} did not resolve!"))?;

        instance.place(position, rotation);
        instance.set_active(true);
        instance.on_spawned();

        Ok(Some(handle))
    }

    // Returns the instance to its free-list. See ResourcePool::release
    // for the stale/double-release contract.
    #[inline]
    pub fn despawn(&mut self, handle: InstanceHandle) -> Result<(), String> {
        self.pool.release(handle)
    }

    // ----------------------
    // Queries:
    // ----------------------

    // Handles of every instance that is issued and active. Membership
    // is decided by slot state, not by free-list absence.
    pub fn active_instances(&self) -> Vec<InstanceHandle> {
        let mut handles = Vec::new();
        self.pool.for_each_issued(|handle, instance| {
            if instance.is_active() {
                handles.push(handle);
            }
        });
        handles
    }

    #[inline]
    pub fn get(&self, handle: InstanceHandle) -> Option<&P::Instance> {
        self.pool.get(handle)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: InstanceHandle) -> Option<&mut P::Instance> {
        self.pool.get_mut(handle)
    }

    #[inline]
    pub fn is_registered(&self, key: PrototypeKey) -> bool {
        self.pool.is_registered(key)
    }

    #[inline]
    pub fn prototype_of(&self, handle: InstanceHandle) -> Option<PrototypeKey> {
        self.pool.prototype_of(handle)
    }

    #[inline]
    pub fn parent_link(&self, handle: InstanceHandle) -> Option<ParentLink> {
        self.pool.parent_link(handle)
    }

    #[inline]
    pub fn pooled_count(&self, key: PrototypeKey) -> usize {
        self.pool.pooled_count(key)
    }

    #[inline]
    pub fn issued_count(&self) -> usize {
        self.pool.issued_count()
    }

    #[inline]
    pub fn total_count(&self) -> usize {
        self.pool.total_count()
    }

    #[inline]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn attach_policy(&self) -> AttachPolicy {
        self.attach_policy
    }
}
