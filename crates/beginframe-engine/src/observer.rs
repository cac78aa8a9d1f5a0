//! Observer contract, the default observer behavior and the registry sources
//! keep their observers in.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use tracing::trace;

use beginframe_args::BeginFrameArgs;

/// Anything that wants periodic frame-production callbacks.
///
/// Sources call these with `&self`, so implementations keep their state in
/// cells. An observer may call back into the source it is registered with
/// from any of these methods.
pub trait BeginFrameObserver {
    /// A frame-production opportunity.
    fn on_begin_frame(&self, args: &BeginFrameArgs);

    /// The most recent args this observer actually used.
    fn last_used_begin_frame_args(&self) -> Option<BeginFrameArgs>;

    fn on_begin_frame_source_paused_changed(&self, paused: bool);

    /// Opt in to ticks that only drive animations.
    fn wants_animate_only_begin_frames(&self) -> bool {
        false
    }

    /// Root observers belong to the on-screen compositor and are served
    /// after every other observer of an external source.
    fn is_root(&self) -> bool {
        false
    }
}

/// The part of an observer that decides what to do with a frame.
pub trait FrameConsumer {
    /// Returns true if the frame was used. Unused frames count as dropped.
    fn consume_begin_frame(&self, args: &BeginFrameArgs) -> bool;

    fn on_begin_frame_source_paused_changed(&self, _paused: bool) {}

    fn wants_animate_only_begin_frames(&self) -> bool {
        false
    }

    fn is_root(&self) -> bool {
        false
    }
}

/// Observer that remembers the last frame its consumer used and counts the
/// ones it dropped.
pub struct TrackedObserver<C> {
    consumer: C,
    last_used_begin_frame_args: Cell<Option<BeginFrameArgs>>,
    dropped_begin_frame_args: Cell<u64>,
}

impl<C> TrackedObserver<C> {
    /// Wrap a consumer.
    pub fn new(consumer: C) -> Self {
        Self {
            consumer,
            last_used_begin_frame_args: Cell::new(None),
            dropped_begin_frame_args: Cell::new(0),
        }
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    /// Number of frames the consumer declined.
    pub fn dropped_begin_frame_args(&self) -> u64 {
        self.dropped_begin_frame_args.get()
    }
}

impl<C: FrameConsumer> BeginFrameObserver for TrackedObserver<C> {
    fn on_begin_frame(&self, args: &BeginFrameArgs) {
        debug_assert!(args.is_valid());
        if let Some(last) = self.last_used_begin_frame_args.get() {
            debug_assert!(
                args.frame_time >= last.frame_time,
                "frame time went backwards"
            );
            debug_assert!(
                !last.frame_id.is_next_in_sequence_to(&args.frame_id),
                "sequence number regressed: last {:?}, new {:?}",
                last.frame_id,
                args.frame_id
            );
        }

        if self.consumer.consume_begin_frame(args) {
            self.last_used_begin_frame_args.set(Some(*args));
        } else {
            let dropped = self.dropped_begin_frame_args.get() + 1;
            self.dropped_begin_frame_args.set(dropped);
            trace!(
                sequence_number = args.sequence_number(),
                dropped,
                "Observer dropped BeginFrame"
            );
        }
    }

    fn last_used_begin_frame_args(&self) -> Option<BeginFrameArgs> {
        self.last_used_begin_frame_args.get()
    }

    fn on_begin_frame_source_paused_changed(&self, paused: bool) {
        self.consumer.on_begin_frame_source_paused_changed(paused);
    }

    fn wants_animate_only_begin_frames(&self) -> bool {
        self.consumer.wants_animate_only_begin_frames()
    }

    fn is_root(&self) -> bool {
        self.consumer.is_root()
    }
}

/// Deliver `args` unless they are animate-only and the observer opted out.
pub fn filter_and_issue_begin_frame(observer: &dyn BeginFrameObserver, args: &BeginFrameArgs) {
    if args.animate_only && !observer.wants_animate_only_begin_frames() {
        return;
    }
    observer.on_begin_frame(args);
}

/// Returns true if `args` are newer than what the observer last used.
pub fn check_begin_frame_continuity(observer: &dyn BeginFrameObserver, args: &BeginFrameArgs) -> bool {
    let Some(last) = observer.last_used_begin_frame_args() else {
        return true;
    };
    if args.frame_time > last.frame_time {
        // A newer frame with an older sequence number of the same source
        // means the source was swapped without resetting its id.
        debug_assert!(
            !last.frame_id.is_next_in_sequence_to(&args.frame_id),
            "newer frame carries older id: last {:?}, new {:?}",
            last.frame_id,
            args.frame_id
        );
        return true;
    }
    false
}

/// Stable identity of a registered observer: the address of its value.
///
/// Sources hold a `Weak` to every observer, which keeps the allocation (and
/// with it the address) reserved for as long as the entry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverKey(usize);

impl ObserverKey {
    pub fn of(observer: &dyn BeginFrameObserver) -> Self {
        Self(std::ptr::from_ref(observer).cast::<()>() as usize)
    }

    fn of_rc(observer: &Rc<dyn BeginFrameObserver>) -> Self {
        Self(Rc::as_ptr(observer).cast::<()>() as usize)
    }
}

#[derive(Clone)]
struct ObserverEntry {
    key: ObserverKey,
    observer: Weak<dyn BeginFrameObserver>,
}

/// Non-owning set of observers in registration order.
///
/// Observers dropped without unregistering are pruned the next time the set
/// is snapshotted for dispatch.
#[derive(Default, Clone)]
pub(crate) struct ObserverSet {
    entries: Vec<ObserverEntry>,
}

impl ObserverSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns false if the observer was already registered.
    pub(crate) fn insert(&mut self, observer: &Rc<dyn BeginFrameObserver>) -> bool {
        let key = ObserverKey::of_rc(observer);
        if self.contains(key) {
            return false;
        }
        self.entries.push(ObserverEntry {
            key,
            observer: Rc::downgrade(observer),
        });
        true
    }

    /// Copy the entry for `key` from `other` into this set.
    pub(crate) fn insert_from(&mut self, other: &ObserverSet, key: ObserverKey) -> bool {
        if self.contains(key) {
            return false;
        }
        match other.entries.iter().find(|entry| entry.key == key) {
            Some(entry) => {
                self.entries.push(entry.clone());
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, key: ObserverKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.key != key);
        self.entries.len() != before
    }

    pub(crate) fn contains(&self, key: ObserverKey) -> bool {
        self.entries.iter().any(|entry| entry.key == key)
    }

    /// Drop entries whose observer no longer exists. Returns true if any
    /// were dropped.
    pub(crate) fn prune(&mut self) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.observer.strong_count() > 0);
        self.entries.len() != before
    }

    /// Live observers only.
    pub(crate) fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.observer.strong_count() > 0)
            .count()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries held, dead or alive.
    #[cfg(test)]
    pub(crate) fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Prune, then return strong references to every live observer.
    ///
    /// Dispatch iterates this copy, never the live set, so observers may
    /// add or remove themselves (or others) from inside their callbacks.
    pub(crate) fn snapshot(&mut self) -> Vec<Rc<dyn BeginFrameObserver>> {
        self.prune();
        self.entries
            .iter()
            .filter_map(|entry| entry.observer.upgrade())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::time::{Duration, Instant};

    use beginframe_args::ArgsType;

    use super::*;

    struct Consumer {
        accept: Cell<bool>,
        animate_only: bool,
        seen: RefCell<Vec<u64>>,
    }

    impl Consumer {
        fn new(animate_only: bool) -> Self {
            Self {
                accept: Cell::new(true),
                animate_only,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl FrameConsumer for Consumer {
        fn consume_begin_frame(&self, args: &BeginFrameArgs) -> bool {
            self.seen.borrow_mut().push(args.sequence_number());
            self.accept.get()
        }

        fn wants_animate_only_begin_frames(&self) -> bool {
            self.animate_only
        }
    }

    fn args_at(t0: Instant, sequence_number: u64) -> BeginFrameArgs {
        let interval = Duration::from_millis(16);
        let frame_time = t0 + interval * (sequence_number as u32);
        BeginFrameArgs::new(1, sequence_number, frame_time, frame_time + interval, interval, ArgsType::Normal)
    }

    #[test]
    fn test_used_frame_updates_last_used_args() {
        let observer = TrackedObserver::new(Consumer::new(false));
        let args = args_at(Instant::now(), 1);

        observer.on_begin_frame(&args);

        assert_eq!(observer.last_used_begin_frame_args(), Some(args));
        assert_eq!(observer.dropped_begin_frame_args(), 0);
    }

    #[test]
    fn test_declined_frame_counts_as_dropped() {
        let observer = TrackedObserver::new(Consumer::new(false));
        let t0 = Instant::now();
        let first = args_at(t0, 1);
        observer.on_begin_frame(&first);

        observer.consumer().accept.set(false);
        observer.on_begin_frame(&args_at(t0, 2));

        assert_eq!(observer.last_used_begin_frame_args(), Some(first));
        assert_eq!(observer.dropped_begin_frame_args(), 1);
    }

    #[test]
    fn test_animate_only_filter() {
        let t0 = Instant::now();
        let args = args_at(t0, 1).with_animate_only(true);
        let uninterested = TrackedObserver::new(Consumer::new(false));
        let interested = TrackedObserver::new(Consumer::new(true));

        filter_and_issue_begin_frame(&uninterested, &args);
        filter_and_issue_begin_frame(&interested, &args);

        assert!(uninterested.consumer().seen.borrow().is_empty());
        assert_eq!(*interested.consumer().seen.borrow(), vec![1]);
    }

    #[test]
    fn test_continuity_rejects_stale_frames() {
        let t0 = Instant::now();
        let observer = TrackedObserver::new(Consumer::new(false));
        let args = args_at(t0, 2);

        assert!(check_begin_frame_continuity(&observer, &args));
        observer.on_begin_frame(&args);

        assert!(!check_begin_frame_continuity(&observer, &args));
        assert!(!check_begin_frame_continuity(&observer, &args_at(t0, 1).as_missed()));
        assert!(check_begin_frame_continuity(&observer, &args_at(t0, 3)));
    }

    #[test]
    fn test_set_prunes_dropped_observers() {
        let mut set = ObserverSet::new();
        let kept: Rc<dyn BeginFrameObserver> = Rc::new(TrackedObserver::new(Consumer::new(false)));
        let dropped: Rc<dyn BeginFrameObserver> = Rc::new(TrackedObserver::new(Consumer::new(false)));

        assert!(set.insert(&kept));
        assert!(set.insert(&dropped));
        assert!(!set.insert(&kept));
        assert_eq!(set.len(), 2);

        drop(dropped);
        assert_eq!(set.len(), 1);
        assert_eq!(set.snapshot().len(), 1);
        assert!(set.contains(ObserverKey::of(kept.as_ref())));
    }

    #[test]
    fn test_key_matches_between_rc_and_reference() {
        let observer = Rc::new(TrackedObserver::new(Consumer::new(false)));
        let as_dyn: Rc<dyn BeginFrameObserver> = observer.clone();

        assert_eq!(ObserverKey::of(&*observer), ObserverKey::of_rc(&as_dyn));
    }
}
