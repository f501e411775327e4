//! Change tracking for optimistic writes.
//!
//! A [`ChangeTracker`] is the link between local collections and the
//! transactions that batch their writes. While a capture frame is open,
//! every collection write is recorded as a [`PendingMutation`] along with a
//! handle able to undo it. Frames belong to the thread that opened them and
//! nest per thread: a write lands in the innermost frame opened by the
//! writing thread, and a thread with no open frame is not capturing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use pacer_core::PendingMutation;
use parking_lot::Mutex;

static NEXT_FRAME: AtomicU64 = AtomicU64::new(1);

/// Undoes a previously applied local write.
///
/// Implemented by collections so that a failed optimistic update can be
/// unwound without leaving half-applied state behind.
pub trait Revert<K, C>: Send + Sync {
    /// Reverts the local effect of `mutation`.
    fn revert(&self, mutation: &PendingMutation<K, C>);
}

struct Captured<K, C> {
    mutation: PendingMutation<K, C>,
    undo: Arc<dyn Revert<K, C>>,
}

struct Frame<K, C> {
    id: u64,
    owner: ThreadId,
    captured: Vec<Captured<K, C>>,
}

/// Cloneable handle to the open capture frames of every thread.
///
/// Clones share the same frames, so a tracker handed to several collections
/// and to a coordinator observes all of their writes.
pub struct ChangeTracker<K, C> {
    frames: Arc<Mutex<Vec<Frame<K, C>>>>,
}

impl<K, C> Clone for ChangeTracker<K, C> {
    fn clone(&self) -> Self {
        Self {
            frames: Arc::clone(&self.frames),
        }
    }
}

impl<K, C> Default for ChangeTracker<K, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, C> std::fmt::Debug for ChangeTracker<K, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("open_frames", &self.frames.lock().len())
            .finish()
    }
}

/// Removes its frame on drop, so a panicking callback cannot leave a stale
/// frame that would swallow later writes.
struct FrameGuard<'a, K, C> {
    frames: &'a Mutex<Vec<Frame<K, C>>>,
    id: u64,
    done: bool,
}

impl<K, C> FrameGuard<'_, K, C> {
    fn take(&self) -> Vec<Captured<K, C>> {
        let mut frames = self.frames.lock();
        match frames.iter().rposition(|f| f.id == self.id) {
            Some(pos) => frames.remove(pos).captured,
            None => Vec::new(),
        }
    }

    fn finish(&mut self) -> Vec<Captured<K, C>> {
        self.done = true;
        self.take()
    }
}

impl<K, C> Drop for FrameGuard<'_, K, C> {
    fn drop(&mut self) {
        if !self.done {
            self.take();
        }
    }
}

impl<K, C> ChangeTracker<K, C> {
    /// Creates a tracker with no open frames.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns `true` while the calling thread has a capture frame open.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        let me = thread::current().id();
        self.frames.lock().iter().any(|f| f.owner == me)
    }

    /// Returns `true` if both handles share the same frames.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.frames, &other.frames)
    }

    /// Records an applied write into the calling thread's innermost frame.
    ///
    /// Returns `false` (and drops the record) when that thread has no open
    /// frame.
    pub fn record(&self, mutation: PendingMutation<K, C>, undo: Arc<dyn Revert<K, C>>) -> bool {
        let me = thread::current().id();
        let mut frames = self.frames.lock();
        match frames.iter_mut().rev().find(|f| f.owner == me) {
            Some(frame) => {
                frame.captured.push(Captured { mutation, undo });
                true
            }
            None => false,
        }
    }

    /// Runs `f` inside a fresh capture frame owned by the calling thread.
    ///
    /// On success returns `f`'s value and the writes it performed, in order.
    /// On failure every captured write is reverted, newest first, and the
    /// error is returned. Writes made by other threads meanwhile are neither
    /// captured nor reverted.
    ///
    /// # Errors
    ///
    /// Returns whatever error `f` returns.
    pub fn capture<R, E>(
        &self,
        f: impl FnOnce() -> Result<R, E>,
    ) -> Result<(R, Vec<PendingMutation<K, C>>), E> {
        let id = NEXT_FRAME.fetch_add(1, Ordering::Relaxed);
        self.frames.lock().push(Frame {
            id,
            owner: thread::current().id(),
            captured: Vec::new(),
        });
        let mut guard = FrameGuard {
            frames: &self.frames,
            id,
            done: false,
        };

        let result = f();
        let captured = guard.finish();

        match result {
            Ok(value) => Ok((value, captured.into_iter().map(|c| c.mutation).collect())),
            Err(err) => {
                for c in captured.iter().rev() {
                    c.undo.revert(&c.mutation);
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pacer_core::{MutationType, Value};

    use super::*;

    #[derive(Default)]
    struct UndoLog {
        reverted: Mutex<Vec<u32>>,
    }

    impl Revert<u32, Value> for UndoLog {
        fn revert(&self, mutation: &PendingMutation<u32, Value>) {
            self.reverted.lock().push(mutation.key);
        }
    }

    fn write(key: u32) -> PendingMutation<u32, Value> {
        PendingMutation::new(MutationType::Insert, "test", key, Value::Null, None, 0)
    }

    #[test]
    fn record_outside_frame_is_rejected() {
        let tracker: ChangeTracker<u32, Value> = ChangeTracker::new();
        let log = Arc::new(UndoLog::default());
        assert!(!tracker.record(write(1), log));
        assert!(!tracker.is_capturing());
    }

    #[test]
    fn capture_returns_writes_in_order() {
        let tracker: ChangeTracker<u32, Value> = ChangeTracker::new();
        let log = Arc::new(UndoLog::default());

        let (out, writes) = tracker
            .capture(|| {
                assert!(tracker.is_capturing());
                tracker.record(write(1), log.clone());
                tracker.record(write(2), log.clone());
                Ok::<_, ()>("done")
            })
            .unwrap();

        assert_eq!(out, "done");
        assert_eq!(writes.iter().map(|m| m.key).collect::<Vec<_>>(), vec![1, 2]);
        assert!(!tracker.is_capturing());
        assert!(log.reverted.lock().is_empty());
    }

    #[test]
    fn failed_capture_reverts_newest_first() {
        let tracker: ChangeTracker<u32, Value> = ChangeTracker::new();
        let log = Arc::new(UndoLog::default());

        let err = tracker
            .capture(|| {
                tracker.record(write(1), log.clone());
                tracker.record(write(2), log.clone());
                Err::<(), _>("boom")
            })
            .unwrap_err();

        assert_eq!(err, "boom");
        assert_eq!(*log.reverted.lock(), vec![2, 1]);
        assert!(!tracker.is_capturing());
    }

    #[test]
    fn nested_frames_capture_separately() {
        let tracker: ChangeTracker<u32, Value> = ChangeTracker::new();
        let log = Arc::new(UndoLog::default());

        let (inner, outer) = tracker
            .capture(|| {
                tracker.record(write(1), log.clone());
                let (_, inner) = tracker.capture(|| {
                    tracker.record(write(2), log.clone());
                    Ok::<_, ()>(())
                })?;
                tracker.record(write(3), log.clone());
                Ok::<_, ()>(inner)
            })
            .unwrap();

        assert_eq!(inner.iter().map(|m| m.key).collect::<Vec<_>>(), vec![2]);
        assert_eq!(outer.iter().map(|m| m.key).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn panicking_callback_does_not_leave_frame_open() {
        let tracker: ChangeTracker<u32, Value> = ChangeTracker::new();
        let t = tracker.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = t.capture(|| -> Result<(), ()> { panic!("callback panicked") });
        }));
        assert!(result.is_err());
        assert!(!tracker.is_capturing());
    }

    #[test]
    fn frames_belong_to_the_opening_thread() {
        use std::sync::Barrier;

        let tracker: ChangeTracker<u32, Value> = ChangeTracker::new();
        let log = Arc::new(UndoLog::default());
        let barrier = Barrier::new(2);

        let run = |key: u32, fail: bool| {
            tracker.capture(|| {
                barrier.wait();
                assert!(tracker.is_capturing());
                assert!(tracker.record(write(key), log.clone()));
                barrier.wait();
                if fail {
                    Err(key)
                } else {
                    Ok(key)
                }
            })
        };

        let (a, b) = thread::scope(|s| {
            let a = s.spawn(|| run(1, false));
            let b = s.spawn(|| run(2, true));
            (a.join().unwrap(), b.join().unwrap())
        });

        let (_, writes) = a.unwrap();
        assert_eq!(writes.iter().map(|m| m.key).collect::<Vec<_>>(), vec![1]);
        assert_eq!(b.unwrap_err(), 2);
        assert_eq!(*log.reverted.lock(), vec![2]);
        assert!(!tracker.is_capturing());
    }

    #[test]
    fn other_threads_are_not_capturing_during_a_frame() {
        let tracker: ChangeTracker<u32, Value> = ChangeTracker::new();
        let log = Arc::new(UndoLog::default());

        let ((), writes) = tracker
            .capture(|| {
                let accepted = thread::scope(|s| {
                    s.spawn(|| (tracker.is_capturing(), tracker.record(write(9), log.clone())))
                        .join()
                        .unwrap()
                });
                assert_eq!(accepted, (false, false));
                tracker.record(write(1), log.clone());
                Ok::<_, ()>(())
            })
            .unwrap();

        assert_eq!(writes.iter().map(|m| m.key).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn clones_share_frames() {
        let a: ChangeTracker<u32, Value> = ChangeTracker::new();
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&ChangeTracker::new()));
    }
}
