use super::*;
use super::multi::{AttachPolicy, PoolEntry, WeightedMultiPool};
use crate::utils::Vec2;

const BOTTLE: PrototypeKey = PrototypeKey::from_str("bottle");
const CAN:    PrototypeKey = PrototypeKey::from_str("can");
const WRAPPER: PrototypeKey = PrototypeKey::from_str("wrapper");

// ----------------------------------------------
// Test fixtures
// ----------------------------------------------

struct Debris {
    name: &'static str,
    active: bool,
    position: Vec2,
    rotation: f32,
    spawned_count: u32,
    despawned_count: u32,
}

impl Poolable for Debris {
    fn on_spawned(&mut self) {
        assert!(self.active, "spawn hook must run after activation");
        self.spawned_count += 1;
    }

    fn on_despawned(&mut self) {
        self.despawned_count += 1;
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn place(&mut self, position: Vec2, rotation: f32) {
        self.position = position;
        self.rotation = rotation;
    }
}

struct DebrisPrototype {
    name: &'static str,
    fail_instantiate: bool,
}

impl DebrisPrototype {
    fn new(name: &'static str) -> Self {
        Self { name, fail_instantiate: false }
    }

    fn broken(name: &'static str) -> Self {
        Self { name, fail_instantiate: true }
    }
}

impl Prototype for DebrisPrototype {
    type Instance = Debris;

    fn instantiate(&self) -> Result<Debris, String> {
        if self.fail_instantiate {
            return Err("factory is down".into());
        }
        Ok(Debris {
            name: self.name,
            active: false,
            position: Vec2::zero(),
            rotation: 0.0,
            spawned_count: 0,
            despawned_count: 0,
        })
    }
}

fn new_test_pool() -> ResourcePool<DebrisPrototype> {
    let mut pool = ResourcePool::new();
    assert!(pool.register_prototype(BOTTLE, DebrisPrototype::new("bottle")));
    assert!(pool.register_prototype(CAN, DebrisPrototype::new("can")));
    pool
}

// ----------------------------------------------
// ResourcePool tests
// ----------------------------------------------

#[test]
fn test_register_rejects_duplicates_and_empty_keys() {
    let mut pool = new_test_pool();
    assert!(!pool.register_prototype(BOTTLE, DebrisPrototype::new("bottle")));
    assert!(!pool.register_prototype(PrototypeKey::empty(), DebrisPrototype::new("nameless")));
    assert_eq!(pool.prototype_count(), 2);
}

#[test]
fn test_acquire_fabricates_on_demand() {
    let mut pool = new_test_pool();
    assert_eq!(pool.total_count(), 0);

    let handle = pool.acquire(BOTTLE, true).unwrap().unwrap();
    assert!(handle.is_valid());
    assert!(pool.is_issued(handle));
    assert_eq!(pool.total_count(), 1);
    assert_eq!(pool.get(handle).unwrap().name, "bottle");
}

#[test]
fn test_acquire_unregistered_key_is_noop() {
    let mut pool = new_test_pool();
    assert_eq!(pool.acquire(WRAPPER, true).unwrap(), None);
    assert_eq!(pool.total_count(), 0);
}

#[test]
fn test_exhausted_pool_without_create_returns_none() {
    let mut pool = new_test_pool();
    pool.warm_up(BOTTLE, 1).unwrap();

    assert!(pool.acquire(BOTTLE, false).unwrap().is_some());
    assert_eq!(pool.acquire(BOTTLE, false).unwrap(), None);
    assert_eq!(pool.total_count(), 1);
}

#[test]
fn test_warm_up_prefabricates_inactive_instances() {
    let mut pool = new_test_pool();
    pool.warm_up(BOTTLE, 3).unwrap();

    assert_eq!(pool.pooled_count(BOTTLE), 3);
    assert_eq!(pool.total_count(), 3);
    assert_eq!(pool.issued_count(), 0);

    // Acquires drain the free-list before fabricating anything new.
    for _ in 0..3 {
        let handle = pool.acquire(BOTTLE, true).unwrap().unwrap();
        assert!(!pool.get(handle).unwrap().is_active());
    }
    assert_eq!(pool.total_count(), 3);

    let extra = pool.acquire(BOTTLE, true).unwrap().unwrap();
    assert!(extra.is_valid());
    assert_eq!(pool.total_count(), 4);
}

#[test]
fn test_warm_up_unregistered_key_is_noop() {
    let mut pool = new_test_pool();
    pool.warm_up(WRAPPER, 5).unwrap();
    assert_eq!(pool.total_count(), 0);
}

#[test]
fn test_factory_failure_propagates() {
    let mut pool: ResourcePool<DebrisPrototype> = ResourcePool::new();
    pool.register_prototype(WRAPPER, DebrisPrototype::broken("wrapper"));

    assert!(pool.warm_up(WRAPPER, 1).is_err());
    assert!(pool.acquire(WRAPPER, true).is_err());
}

#[test]
fn test_release_recycles_fifo() {
    let mut pool = new_test_pool();

    let first  = pool.acquire(BOTTLE, true).unwrap().unwrap();
    let second = pool.acquire(BOTTLE, true).unwrap().unwrap();

    pool.release(first).unwrap();
    pool.release(second).unwrap();
    assert_eq!(pool.pooled_count(BOTTLE), 2);

    // Oldest release comes back first.
    let recycled = pool.acquire(BOTTLE, true).unwrap().unwrap();
    assert_eq!(recycled.index(), first.index());
    assert_eq!(pool.pooled_count(BOTTLE), 1);
}

#[test]
fn test_release_runs_hook_then_deactivates() {
    let mut pool = new_test_pool();
    let handle = pool.acquire(BOTTLE, true).unwrap().unwrap();
    pool.get_mut(handle).unwrap().set_active(true);

    pool.release(handle).unwrap();

    // The slot survives release; the handle only goes stale on reuse.
    let instance = pool.get(handle).unwrap();
    assert!(!instance.is_active());
    assert_eq!(instance.despawned_count, 1);
    assert_eq!(pool.parent_link(handle), Some(ParentLink::PoolAnchor));
}

#[test]
fn test_double_release_is_rejected() {
    let mut pool = new_test_pool();
    let handle = pool.acquire(BOTTLE, true).unwrap().unwrap();

    pool.release(handle).unwrap();
    assert!(pool.release(handle).is_err());

    // The free-list grew by exactly one.
    assert_eq!(pool.pooled_count(BOTTLE), 1);
    assert_eq!(pool.get(handle).unwrap().despawned_count, 1);
}

#[test]
fn test_stale_handle_release_is_noop() {
    let mut pool = new_test_pool();
    let stale = pool.acquire(BOTTLE, true).unwrap().unwrap();
    pool.release(stale).unwrap();

    // Reacquiring recycles the slot under a new generation.
    let fresh = pool.acquire(BOTTLE, true).unwrap().unwrap();
    assert_eq!(fresh.index(), stale.index());
    assert_ne!(fresh.generation(), stale.generation());

    assert!(pool.get(stale).is_none());
    assert!(!pool.is_issued(stale));

    pool.release(stale).unwrap(); // logged no-op
    assert!(pool.is_issued(fresh));
    assert_eq!(pool.pooled_count(BOTTLE), 0);
}

#[test]
fn test_invalid_handle_release_is_noop() {
    let mut pool = new_test_pool();
    pool.release(InstanceHandle::invalid()).unwrap();
    assert_eq!(pool.pooled_count(BOTTLE), 0);
}

#[test]
fn test_release_after_unregister_quarantines() {
    let mut pool = new_test_pool();
    let handle = pool.acquire(CAN, true).unwrap().unwrap();

    assert!(pool.unregister_prototype(CAN));
    pool.release(handle).unwrap();

    // Deactivated but never recycled.
    assert!(!pool.get(handle).unwrap().is_active());
    assert_eq!(pool.pooled_count(CAN), 0);
    assert!(pool.release(handle).is_err());
}

#[test]
fn test_for_each_issued_skips_pooled_slots() {
    let mut pool = new_test_pool();
    let issued = pool.acquire(BOTTLE, true).unwrap().unwrap();
    let returned = pool.acquire(CAN, true).unwrap().unwrap();
    pool.release(returned).unwrap();

    let mut visited = Vec::new();
    pool.for_each_issued(|handle, _| visited.push(handle));
    assert_eq!(visited, vec![issued]);
}

// ----------------------------------------------
// WeightedMultiPool tests
// ----------------------------------------------

fn new_multi_pool(weights: [f32; 3],
                  expandable: bool,
                  attach_policy: AttachPolicy) -> WeightedMultiPool<DebrisPrototype> {
    WeightedMultiPool::try_new(
        vec![
            PoolEntry::new(BOTTLE, DebrisPrototype::new("bottle"))
                .with_weight(weights[0])
                .with_expandable(expandable),
            PoolEntry::new(CAN, DebrisPrototype::new("can"))
                .with_weight(weights[1])
                .with_expandable(expandable),
            PoolEntry::new(WRAPPER, DebrisPrototype::new("wrapper"))
                .with_weight(weights[2])
                .with_expandable(expandable),
        ],
        attach_policy,
        0xC0FFEE)
        .unwrap()
}

#[test]
fn test_multi_pool_warm_up_on_construction() {
    let multi_pool = WeightedMultiPool::try_new(
        vec![
            PoolEntry::new(BOTTLE, DebrisPrototype::new("bottle")).with_warm_count(2),
            PoolEntry::new(CAN, DebrisPrototype::new("can")).with_warm_count(3),
        ],
        AttachPolicy::KeepUnderAnchor,
        42)
        .unwrap();

    assert_eq!(multi_pool.entry_count(), 2);
    assert_eq!(multi_pool.pooled_count(BOTTLE), 2);
    assert_eq!(multi_pool.pooled_count(CAN), 3);
    assert_eq!(multi_pool.total_count(), 5);
    assert_eq!(multi_pool.issued_count(), 0);
}

#[test]
fn test_multi_pool_construction_fails_on_broken_factory() {
    let result = WeightedMultiPool::try_new(
        vec![PoolEntry::new(BOTTLE, DebrisPrototype::broken("bottle")).with_warm_count(1)],
        AttachPolicy::KeepUnderAnchor,
        42);
    assert!(result.is_err());
}

#[test]
fn test_weighted_selection_follows_weights() {
    let mut multi_pool = new_multi_pool([1.0, 0.0, 3.0], true, AttachPolicy::KeepUnderAnchor);

    let mut bottle_picks = 0;
    let mut can_picks = 0;
    let mut wrapper_picks = 0;

    for _ in 0..10_000 {
        match multi_pool.select_prototype_for_spawn() {
            Some(key) if key == BOTTLE => bottle_picks += 1,
            Some(key) if key == CAN => can_picks += 1,
            Some(key) if key == WRAPPER => wrapper_picks += 1,
            _ => panic!("selection must always resolve with positive total weight"),
        }
    }

    // Zero weight is never selected.
    assert_eq!(can_picks, 0);

    // Expected split is 1:3; allow a generous band around 2500/7500.
    assert!((2100..=2900).contains(&bottle_picks), "bottle_picks = {bottle_picks}");
    assert!((7100..=7900).contains(&wrapper_picks), "wrapper_picks = {wrapper_picks}");
}

#[test]
fn test_zero_total_weight_falls_back_to_first_entry() {
    let mut multi_pool = new_multi_pool([0.0, 0.0, 0.0], true, AttachPolicy::KeepUnderAnchor);
    assert_eq!(multi_pool.total_weight(), 0.0);
    assert_eq!(multi_pool.select_prototype_for_spawn(), Some(BOTTLE));

    multi_pool.set_fallback_first_valid(false);
    assert_eq!(multi_pool.select_prototype_for_spawn(), None);
}

#[test]
fn test_selection_resolves_last_valid_on_accumulation_shortfall() {
    // Zero two entries without rebuilding, leaving the cached total at
    // 3.0. Rolls above the live accumulation (1.0) overshoot the walk,
    // which must then resolve to the last valid entry instead of None.
    let mut multi_pool = new_multi_pool([1.0, 1.0, 1.0], true, AttachPolicy::KeepUnderAnchor);
    assert!(multi_pool.set_weight(CAN, 0.0));
    assert!(multi_pool.set_weight(WRAPPER, 0.0));
    assert_eq!(multi_pool.total_weight(), 3.0);

    let mut bottle_picks = 0;
    let mut wrapper_picks = 0;

    for _ in 0..1_000 {
        match multi_pool.select_prototype_for_spawn() {
            Some(key) if key == BOTTLE => bottle_picks += 1,
            Some(key) if key == WRAPPER => wrapper_picks += 1,
            other => panic!("selection must resolve to a valid entry, got {other:?}"),
        }
    }

    // Rolls in [0,1] pick the only weighted entry; the rest overshoot
    // and land on the shortfall path.
    assert!(bottle_picks > 0, "bottle_picks = {bottle_picks}");
    assert!(wrapper_picks > 0, "wrapper_picks = {wrapper_picks}");
}

#[test]
fn test_set_weight_requires_rebuild() {
    let mut multi_pool = new_multi_pool([1.0, 1.0, 1.0], true, AttachPolicy::KeepUnderAnchor);
    assert_eq!(multi_pool.total_weight(), 3.0);

    assert!(multi_pool.set_weight(CAN, 5.0));
    assert_eq!(multi_pool.total_weight(), 3.0); // stale until rebuilt

    multi_pool.rebuild_weights();
    assert_eq!(multi_pool.total_weight(), 7.0);

    assert!(!multi_pool.set_weight(PrototypeKey::from_str("unknown"), 1.0));
}

#[test]
fn test_try_spawn_places_and_activates() {
    let mut multi_pool = new_multi_pool([1.0, 1.0, 1.0], true, AttachPolicy::KeepUnderAnchor);

    let position = Vec2::new(4.5, -2.5);
    let handle = multi_pool.try_spawn(position, 90.0).unwrap().unwrap();

    let instance = multi_pool.get(handle).unwrap();
    assert!(instance.is_active());
    assert_eq!(instance.position, position);
    assert_eq!(instance.rotation, 90.0);
    assert_eq!(instance.spawned_count, 1);
    assert_eq!(multi_pool.parent_link(handle), Some(ParentLink::PoolAnchor));
}

#[test]
fn test_detach_policy_hands_off_spawned_instances() {
    let mut multi_pool = new_multi_pool([1.0, 1.0, 1.0], true, AttachPolicy::DetachFromAnchor);

    let handle = multi_pool.try_spawn(Vec2::zero(), 0.0).unwrap().unwrap();
    assert_eq!(multi_pool.parent_link(handle), Some(ParentLink::Detached));

    // Despawn reattaches to the anchor.
    multi_pool.despawn(handle).unwrap();
    assert_eq!(multi_pool.parent_link(handle), Some(ParentLink::PoolAnchor));
}

#[test]
fn test_spawn_specific_honors_expandable() {
    let mut multi_pool = WeightedMultiPool::try_new(
        vec![PoolEntry::new(BOTTLE, DebrisPrototype::new("bottle"))
            .with_warm_count(1)
            .with_expandable(false)],
        AttachPolicy::KeepUnderAnchor,
        7)
        .unwrap();

    // Pooled instance is available.
    let first = multi_pool.try_spawn_specific(BOTTLE, Vec2::zero(), 0.0, true).unwrap();
    assert!(first.is_some());

    // Pool exhausted; caller allows creation but the entry does not.
    let second = multi_pool.try_spawn_specific(BOTTLE, Vec2::zero(), 0.0, true).unwrap();
    assert_eq!(second, None);
    assert_eq!(multi_pool.total_count(), 1);

    // Unknown key is a diagnostic no-op.
    let unknown = multi_pool.try_spawn_specific(CAN, Vec2::zero(), 0.0, true).unwrap();
    assert_eq!(unknown, None);
}

#[test]
fn test_spawn_specific_caller_veto() {
    let mut multi_pool = new_multi_pool([1.0, 1.0, 1.0], true, AttachPolicy::KeepUnderAnchor);

    // Entry is expandable but the caller forbids creation.
    let handle = multi_pool.try_spawn_specific(BOTTLE, Vec2::zero(), 0.0, false).unwrap();
    assert_eq!(handle, None);
    assert_eq!(multi_pool.total_count(), 0);
}

#[test]
fn test_despawn_cycle_reuses_instances() {
    let mut multi_pool = new_multi_pool([1.0, 1.0, 1.0], true, AttachPolicy::KeepUnderAnchor);

    let handle = multi_pool.try_spawn_specific(CAN, Vec2::new(1.0, 1.0), 0.0, true).unwrap().unwrap();
    multi_pool.despawn(handle).unwrap();
    assert_eq!(multi_pool.pooled_count(CAN), 1);

    let recycled = multi_pool.try_spawn_specific(CAN, Vec2::new(2.0, 2.0), 0.0, true).unwrap().unwrap();
    assert_eq!(recycled.index(), handle.index());
    assert_eq!(multi_pool.total_count(), 1);

    let instance = multi_pool.get(recycled).unwrap();
    assert_eq!(instance.spawned_count, 2);
    assert_eq!(instance.despawned_count, 1);
    assert_eq!(instance.position, Vec2::new(2.0, 2.0));
}

#[test]
fn test_active_instances_tracks_issue_state_and_activity() {
    let mut multi_pool = new_multi_pool([1.0, 1.0, 1.0], true, AttachPolicy::KeepUnderAnchor);

    let first  = multi_pool.try_spawn_specific(BOTTLE, Vec2::zero(), 0.0, true).unwrap().unwrap();
    let second = multi_pool.try_spawn_specific(CAN, Vec2::zero(), 0.0, true).unwrap().unwrap();
    let third  = multi_pool.try_spawn_specific(WRAPPER, Vec2::zero(), 0.0, true).unwrap().unwrap();

    assert_eq!(multi_pool.active_instances().len(), 3);

    // Issued but externally deactivated instances are not active.
    multi_pool.get_mut(second).unwrap().set_active(false);
    let active = multi_pool.active_instances();
    assert_eq!(active.len(), 2);
    assert!(active.contains(&first));
    assert!(active.contains(&third));

    // Despawned instances leave the set entirely.
    multi_pool.despawn(first).unwrap();
    assert_eq!(multi_pool.active_instances(), vec![third]);
}
