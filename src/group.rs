//! Group analysis coordination
//!
//! Some analyses aggregate across several files (album peak, album gain).
//! Every file analyzed together shares one [`GroupToken`]: analyzers fold
//! their per-file values into named aggregate slots, and a barrier holds
//! back results until every member of the group has consumed its final
//! collection.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

#[derive(Default)]
struct GroupState {
    joined: usize,
    arrived: usize,
    aggregates: HashMap<String, Box<dyn Any + Send>>,
}

/// Shared state for files analyzed together
///
/// The member count is fixed at creation. Members join once each, arrive
/// once each, and [`GroupToken::wait`] returns when `count` members have
/// arrived.
pub struct GroupToken {
    count: usize,
    state: Mutex<GroupState>,
    all_arrived: Condvar,
}

impl GroupToken {
    /// Group of `count` files (at least one)
    pub fn new(count: usize) -> Arc<Self> {
        Arc::new(Self {
            count: count.max(1),
            state: Mutex::new(GroupState::default()),
            all_arrived: Condvar::new(),
        })
    }

    /// Group for a file analyzed alone
    pub fn single() -> Arc<Self> {
        Self::new(1)
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Members that have arrived so far
    pub fn arrived(&self) -> usize {
        self.state.lock().arrived
    }

    /// Register one participating file
    pub fn join(self: &Arc<Self>) -> GroupMember {
        let mut state = self.state.lock();
        state.joined += 1;
        if state.joined > self.count {
            warn!(
                count = self.count,
                joined = state.joined,
                "more files joined the group than it was created for"
            );
        }
        GroupMember {
            group: Arc::clone(self),
            arrived: false,
        }
    }

    /// Block until every member has arrived
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while state.arrived < self.count {
            self.all_arrived.wait(&mut state);
        }
    }

    /// Update the aggregate stored under `key`, creating it with
    /// `T::default()` first if needed
    ///
    /// A slot holding a different type is reset.
    pub fn contribute<T, R>(&self, key: &str, update: impl FnOnce(&mut T) -> R) -> R
    where
        T: Default + Send + 'static,
    {
        let mut state = self.state.lock();
        let slot = state
            .aggregates
            .entry(key.to_string())
            .or_insert_with(|| Box::new(T::default()));

        if !slot.is::<T>() {
            warn!(key, "group aggregate type changed, resetting");
            *slot = Box::new(T::default());
        }

        match slot.downcast_mut::<T>() {
            Some(value) => update(value),
            None => unreachable!("slot was just set to the requested type"),
        }
    }

    /// Current value of an aggregate, if any member has contributed to it
    pub fn aggregate<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + 'static,
    {
        self.state
            .lock()
            .aggregates
            .get(key)
            .and_then(|slot| slot.downcast_ref::<T>())
            .cloned()
    }

    fn arrive(&self) {
        let mut state = self.state.lock();
        state.arrived += 1;
        debug!(arrived = state.arrived, count = self.count, "group member arrived");
        if state.arrived >= self.count {
            self.all_arrived.notify_all();
        }
    }
}

impl std::fmt::Debug for GroupToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("GroupToken")
            .field("count", &self.count)
            .field("joined", &state.joined)
            .field("arrived", &state.arrived)
            .finish()
    }
}

/// One file's membership in a [`GroupToken`]
///
/// Dropping a member that has not arrived counts as arriving, so a file
/// whose analysis fails never leaves its siblings waiting.
pub struct GroupMember {
    group: Arc<GroupToken>,
    arrived: bool,
}

impl GroupMember {
    pub fn group(&self) -> &Arc<GroupToken> {
        &self.group
    }

    /// Mark this member's final collection as consumed. Idempotent.
    pub fn arrive(&mut self) {
        if !self.arrived {
            self.arrived = true;
            self.group.arrive();
        }
    }

    /// Arrive, then block until the rest of the group has
    pub fn wait(&mut self) {
        self.arrive();
        self.group.wait();
    }
}

impl Drop for GroupMember {
    fn drop(&mut self) {
        self.arrive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_single_member_never_blocks() {
        let group = GroupToken::single();
        let mut member = group.join();
        member.wait();
        assert_eq!(group.arrived(), 1);
    }

    #[test]
    fn test_arrive_is_idempotent() {
        let group = GroupToken::new(2);
        let mut member = group.join();
        member.arrive();
        member.arrive();
        drop(member);
        assert_eq!(group.arrived(), 1);
    }

    #[test]
    fn test_dropped_member_counts_as_arrived() {
        let group = GroupToken::new(2);
        let mut survivor = group.join();
        let failed = group.join();
        drop(failed);

        survivor.wait();
        assert_eq!(group.arrived(), 2);
    }

    #[test]
    fn test_wait_blocks_until_all_arrive() {
        let group = GroupToken::new(3);
        let released = AtomicUsize::new(0);

        thread::scope(|scope| {
            for delay in [5_u64, 20, 40] {
                let mut member = group.join();
                let released = &released;
                scope.spawn(move || {
                    thread::sleep(Duration::from_millis(delay));
                    member.arrive();
                    member.group().wait();
                    released.fetch_add(1, Ordering::SeqCst);
                });
            }

            thread::sleep(Duration::from_millis(10));
            assert_eq!(released.load(Ordering::SeqCst), 0);
        });

        assert_eq!(released.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_aggregates() {
        let group = GroupToken::new(2);
        group.contribute::<f32, _>("peak", |peak| *peak = peak.max(0.4));
        group.contribute::<f32, _>("peak", |peak| *peak = peak.max(0.9));
        group.contribute::<f32, _>("peak", |peak| *peak = peak.max(0.2));

        assert_eq!(group.aggregate::<f32>("peak"), Some(0.9));
        assert_eq!(group.aggregate::<f32>("missing"), None);
        assert_eq!(group.aggregate::<u32>("peak"), None);
    }

    #[test]
    fn test_contribute_resets_on_type_change() {
        let group = GroupToken::single();
        group.contribute::<u32, _>("slot", |v| *v = 7);
        let len = group.contribute::<Vec<f64>, _>("slot", |v| {
            v.push(1.0);
            v.len()
        });
        assert_eq!(len, 1);
    }
}
