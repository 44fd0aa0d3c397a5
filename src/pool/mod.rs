use std::collections::VecDeque;

use slab::Slab;

use crate::{
    log,
    utils::{
        Vec2,
        hash::{self, PreHashedKeyMap, StrHashPair, StringHash}
    }
};

pub mod multi;

#[cfg(test)]
mod tests;

// ----------------------------------------------
// Poolable / Prototype
// ----------------------------------------------

// Implemented by instances managed by a ResourcePool.
pub trait Poolable {
    // Fired after the instance is placed and activated.
    fn on_spawned(&mut self) {
    }

    // Fired when the instance is returned to the pool, before deactivation.
    fn on_despawned(&mut self) {
    }

    fn set_active(&mut self, active: bool);
    fn is_active(&self) -> bool;

    // Position and orient the instance in world space.
    fn place(&mut self, position: Vec2, rotation: f32);
}

// A registered template that fabricates pool instances.
pub trait Prototype {
    type Instance: Poolable;

    fn instantiate(&self) -> Result<Self::Instance, String>;
}

// Prototypes are identified by pre-hashed static names.
pub type PrototypeKey = StrHashPair;

// ----------------------------------------------
// InstanceHandle
// ----------------------------------------------

// Weak generational reference to a pool slot. Stale handles are
// detected by a generation mismatch and never resolve.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct InstanceHandle {
    generation: u32,
    index: u32,
}

impl InstanceHandle {
    #[inline]
    pub fn new(generation: u32, index: usize) -> Self {
        debug_assert!(generation != u32::MAX);
        debug_assert!(index < u32::MAX as usize);
        Self {
            generation,
            index: index as u32,
        }
    }

    #[inline]
    pub const fn invalid() -> Self {
        Self {
            generation: u32::MAX,
            index: u32::MAX,
        }
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.generation != u32::MAX && self.index != u32::MAX
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }

    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl Default for InstanceHandle {
    #[inline]
    fn default() -> Self {
        Self::invalid()
    }
}

impl std::fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "[i:{},g:{}]", self.index, self.generation)
        } else {
            write!(f, "[invalid]")
        }
    }
}

// ----------------------------------------------
// PoolSlot
// ----------------------------------------------

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum SlotState {
    Pooled,      // Parked on a free-list, awaiting reuse.
    Issued,      // Handed out to a caller.
    Quarantined, // Returned but untracked; never recycled.
}

// Whether a spawned instance stays grouped under the pool's anchor
// or is handed off to live on its own.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ParentLink {
    PoolAnchor,
    Detached,
}

struct PoolSlot<I> {
    instance: I,
    prototype_hash: StringHash,
    generation: u32,
    state: SlotState,
    parent: ParentLink,
}

// ----------------------------------------------
// ResourcePool
// ----------------------------------------------

struct RegisteredPrototype<P> {
    key: PrototypeKey,
    prototype: P,
}

// Typed object pool over a set of registered prototypes. Instances are
// recycled per prototype in FIFO order and referenced by generational
// handles, so a handle held past release never resolves to a recycled
// instance.
pub struct ResourcePool<P: Prototype> {
    prototypes: PreHashedKeyMap<StringHash, RegisteredPrototype<P>>,
    slots: Slab<PoolSlot<P::Instance>>,
    free_lists: PreHashedKeyMap<StringHash, VecDeque<InstanceHandle>>,
    generation: u32,
}

impl<P: Prototype> ResourcePool<P> {
    pub fn new() -> Self {
        Self {
            prototypes: hash::new_pre_hashed_key_map(),
            slots: Slab::new(),
            free_lists: hash::new_pre_hashed_key_map(),
            generation: 0,
        }
    }

    #[inline]
    fn next_generation(&mut self) -> u32 {
        let generation = self.generation;
        self.generation += 1;
        generation
    }

    // ----------------------
    // Prototype registry:
    // ----------------------

    pub fn register_prototype(&mut self, key: PrototypeKey, prototype: P) -> bool {
        if !key.is_valid() {
            log::error!(log::channel!("pool"), "Cannot register prototype with an empty key!");
            return false;
        }

        if self.prototypes.contains_key(&key.hash) {
            log::warn!(log::channel!("pool"), "Prototype '{key}' is already registered.");
            return false;
        }

        self.prototypes.insert(key.hash, RegisteredPrototype { key, prototype });
        self.free_lists.insert(key.hash, VecDeque::new());
        true
    }

    // Removes a prototype. Instances parked on its free-list are
    // quarantined; instances still issued are quarantined when they
    // come back through release().
    pub fn unregister_prototype(&mut self, key: PrototypeKey) -> bool {
        if self.prototypes.remove(&key.hash).is_none() {
            log::warn!(log::channel!("pool"), "Prototype '{key}' is not registered.");
            return false;
        }

        if let Some(free_list) = self.free_lists.remove(&key.hash) {
            for handle in free_list {
                if let Some(slot) = self.slots.get_mut(handle.index()) {
                    slot.state = SlotState::Quarantined;
                }
            }
        }
        true
    }

    #[inline]
    pub fn is_registered(&self, key: PrototypeKey) -> bool {
        self.prototypes.contains_key(&key.hash)
    }

    #[inline]
    pub fn prototype_count(&self) -> usize {
        self.prototypes.len()
    }

    // ----------------------
    // Warm-up:
    // ----------------------

    // Pre-fabricates `count` inactive instances onto the free-list.
    // Factory failures are propagated.
    pub fn warm_up(&mut self, key: PrototypeKey, count: u32) -> Result<(), String> {
        if !self.is_registered(key) {
            log::warn!(log::channel!("pool"), "Cannot warm up unregistered prototype '{key}'.");
            return Ok(());
        }

        for _ in 0..count {
            let handle = self.fabricate(key)?;
            self.push_free(key.hash, handle);
        }
        Ok(())
    }

    // Instantiates a fresh slot from the prototype, parked inactive
    // under the pool anchor.
    fn fabricate(&mut self, key: PrototypeKey) -> Result<InstanceHandle, String> {
        let registered = self.prototypes.get(&key.hash)
            .ok_or_else(|| format!("Unregistered prototype '{key}'"))?;

        let mut instance = registered.prototype.instantiate()
            .map_err(|err| format!("Prototype '{key}' failed to instantiate: {err}"))?;

        instance.set_active(false);

        let generation = self.next_generation();
        let index = self.slots.insert(PoolSlot {
            instance,
            prototype_hash: key.hash,
            generation,
            state: SlotState::Pooled,
            parent: ParentLink::PoolAnchor,
        });

        Ok(InstanceHandle::new(generation, index))
    }

    fn push_free(&mut self, prototype_hash: StringHash, handle: InstanceHandle) {
        self.free_lists
            .entry(prototype_hash)
            .or_default()
            .push_back(handle);
    }

    // ----------------------
    // Acquire / Release:
    // ----------------------

    // Takes the oldest pooled instance for the prototype, fabricating a
    // new one when the free-list is empty and `allow_create` permits.
    // Ok(None) when the key is unregistered or the pool is exhausted
    // and not allowed to grow; Err only on factory failure.
    pub fn acquire(&mut self, key: PrototypeKey, allow_create: bool) -> Result<Option<InstanceHandle>, String> {
        if !self.is_registered(key) {
            log::warn!(log::channel!("pool"), "Cannot acquire unregistered prototype '{key}'.");
            return Ok(None);
        }

        let recycled = self.free_lists
            .get_mut(&key.hash)
            .and_then(|free_list| free_list.pop_front());

        let handle = match recycled {
            Some(pooled) => {
                // Recycled slots get a fresh generation, so any handle
                // from the instance's previous issue goes stale.
                let generation = self.next_generation();
                let slot = &mut self.slots[pooled.index()];
                debug_assert!(slot.state == SlotState::Pooled);
                slot.generation = generation;
                InstanceHandle::new(generation, pooled.index())
            }
            None => {
                if !allow_create {
                    log::verbose!(log::channel!("pool"), "Pool for '{key}' exhausted and not expandable.");
                    return Ok(None);
                }
                self.fabricate(key)?
            }
        };

        self.slots[handle.index()].state = SlotState::Issued;
        Ok(Some(handle))
    }

    // Returns an issued instance to its free-list. Stale or invalid
    // handles are logged no-ops; releasing a handle that is already
    // pooled is an error and leaves the free-list untouched.
    pub fn release(&mut self, handle: InstanceHandle) -> Result<(), String> {
        if !handle.is_valid() {
            return Ok(());
        }

        let Some(slot) = self.slots.get_mut(handle.index()) else {
            log::warn!(log::channel!("pool"), "Release of stale handle {handle}: slot is vacant.");
            return Ok(());
        };

        if slot.generation != handle.generation() {
            log::warn!(log::channel!("pool"), "Release of stale handle {handle}: generation mismatch.");
            return Ok(());
        }

        match slot.state {
            SlotState::Pooled => {
                Err(format!("Double release of instance {handle}: already pooled."))
            }
            SlotState::Quarantined => {
                Err(format!("Release of quarantined instance {handle}."))
            }
            SlotState::Issued => {
                slot.instance.on_despawned();
                slot.instance.set_active(false);
                slot.parent = ParentLink::PoolAnchor;

                let prototype_hash = slot.prototype_hash;
                if self.prototypes.contains_key(&prototype_hash) {
                    slot.state = SlotState::Pooled;
                    self.push_free(prototype_hash, handle);
                } else {
                    // Prototype no longer registered; keep the instance
                    // deactivated but never recycle it.
                    slot.state = SlotState::Quarantined;
                    log::warn!(log::channel!("pool"),
                               "Released instance {handle} has an unknown prototype; quarantining.");
                }
                Ok(())
            }
        }
    }

    // ----------------------
    // Slot access:
    // ----------------------

    #[inline]
    pub fn get(&self, handle: InstanceHandle) -> Option<&P::Instance> {
        self.slots.get(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .map(|slot| &slot.instance)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: InstanceHandle) -> Option<&mut P::Instance> {
        self.slots.get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .map(|slot| &mut slot.instance)
    }

    #[inline]
    pub fn is_issued(&self, handle: InstanceHandle) -> bool {
        self.slots.get(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .is_some_and(|slot| slot.state == SlotState::Issued)
    }

    #[inline]
    pub fn parent_link(&self, handle: InstanceHandle) -> Option<ParentLink> {
        self.slots.get(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .map(|slot| slot.parent)
    }

    pub(crate) fn set_parent_link(&mut self, handle: InstanceHandle, parent: ParentLink) {
        if let Some(slot) = self.slots.get_mut(handle.index()) {
            if slot.generation == handle.generation() {
                slot.parent = parent;
            }
        }
    }

    #[inline]
    pub fn prototype_of(&self, handle: InstanceHandle) -> Option<PrototypeKey> {
        self.slots.get(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| self.prototypes.get(&slot.prototype_hash))
            .map(|registered| registered.key)
    }

    // ----------------------
    // Iteration / counts:
    // ----------------------

    // Visits every issued slot, in slot order.
    pub fn for_each_issued<F>(&self, mut visitor_fn: F)
        where F: FnMut(InstanceHandle, &P::Instance)
    {
        for (index, slot) in self.slots.iter() {
            if slot.state == SlotState::Issued {
                visitor_fn(InstanceHandle::new(slot.generation, index), &slot.instance);
            }
        }
    }

    // Number of instances parked on the free-list for this prototype.
    #[inline]
    pub fn pooled_count(&self, key: PrototypeKey) -> usize {
        self.free_lists.get(&key.hash).map_or(0, |free_list| free_list.len())
    }

    #[inline]
    pub fn issued_count(&self) -> usize {
        self.slots.iter().filter(|(_, slot)| slot.state == SlotState::Issued).count()
    }

    // Total instances ever fabricated and still tracked.
    #[inline]
    pub fn total_count(&self) -> usize {
        self.slots.len()
    }
}

impl<P: Prototype> Default for ResourcePool<P> {
    fn default() -> Self {
        Self::new()
    }
}
