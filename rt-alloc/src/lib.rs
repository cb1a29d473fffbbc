//! Allocation guard for the realtime paths (audio render callback, tick timer).
//!
//! The core's concurrency model (see the playback engine and render bridge) forbids
//! allocation on the audio render and tick paths. This crate gives those paths a way to
//! assert that no allocation happens while a closure runs, and offloads deallocation of
//! anything freed from a realtime thread onto a dedicated worker thread so `dealloc` never
//! blocks on the system allocator's lock.
//!
//! Debug builds panic on a violation; release builds are a no-op, matching the rest of the
//! core's "debug assertions catch corruption, production never sees the assert" approach to
//! hard invariants (see `error::Bug` / `freeze_with_error`).
use once_cell::sync::OnceCell;
use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::sync::mpsc;
use std::sync::mpsc::{SyncSender, TrySendError};
use std::thread;
use std::thread::JoinHandle;

#[cfg(debug_assertions)]
thread_local! {
    static FORBID_COUNT: Cell<u32> = Cell::new(0);
    static PERMIT_COUNT: Cell<u32> = Cell::new(0);
}

#[cfg(not(debug_assertions))]
pub fn assert_no_alloc<T, F: FnOnce() -> T>(func: F) -> T {
    func()
}

#[cfg(not(debug_assertions))]
pub fn permit_alloc<T, F: FnOnce() -> T>(func: F) -> T {
    func()
}

/// Forbids allocation/deallocation for the duration of `func`, panicking on a violation.
///
/// Call this around `PlaybackEngine::tick()` and the audio render callback.
#[cfg(debug_assertions)]
pub fn assert_no_alloc<T, F: FnOnce() -> T>(func: F) -> T {
    struct Guard;
    impl Guard {
        fn new() -> Guard {
            FORBID_COUNT.with(|c| c.set(c.get() + 1));
            Guard
        }
    }
    impl Drop for Guard {
        fn drop(&mut self) {
            FORBID_COUNT.with(|c| c.set(c.get() - 1));
        }
    }
    let _guard = Guard::new();
    func()
}

/// Temporarily lifts the restriction put in place by [`assert_no_alloc`], for the rare case
/// where a realtime path must cross into code that allocates (e.g. the main-loop bridge).
#[cfg(debug_assertions)]
pub fn permit_alloc<T, F: FnOnce() -> T>(func: F) -> T {
    struct Guard;
    impl Guard {
        fn new() -> Guard {
            PERMIT_COUNT.with(|c| c.set(c.get() + 1));
            Guard
        }
    }
    impl Drop for Guard {
        fn drop(&mut self) {
            PERMIT_COUNT.with(|c| c.set(c.get() - 1));
        }
    }
    let _guard = Guard::new();
    func()
}

/// A `GlobalAlloc` wrapper that enforces [`assert_no_alloc`] and offloads deallocation from
/// realtime threads to a worker thread.
pub struct GuardedAllocator<I, D> {
    sync_deallocator: D,
    async_machine: OnceCell<AsyncDeallocationMachine<I>>,
}

struct AsyncDeallocationMachine<I> {
    sender: SyncSender<DeallocationTask>,
    _worker_thread_handle: JoinHandle<()>,
    integration: I,
}

impl<I> AsyncDeallocationMachine<I> {
    fn new<D: Deallocate + Send + 'static>(capacity: usize, deallocator: D, integration: I) -> Self {
        let (sender, receiver) = mpsc::sync_channel::<DeallocationTask>(capacity);
        let worker_thread_handle = thread::Builder::new()
            .name("rt-alloc-deallocator".to_string())
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    deallocator.deallocate(task.ptr, task.layout);
                }
            })
            .expect("failed to spawn deallocation worker");
        Self {
            sender,
            _worker_thread_handle: worker_thread_handle,
            integration,
        }
    }
}

struct DeallocationTask {
    ptr: *mut u8,
    layout: Layout,
}

unsafe impl Send for DeallocationTask {}

/// Tells the allocator whether the *current* thread's deallocations should be offloaded.
pub trait AsyncDeallocationIntegration {
    fn offload_deallocation(&self) -> bool;
}

/// Performs the actual free. Kept pluggable so callers can record stats on it.
pub trait Deallocate {
    fn deallocate(&self, ptr: *mut u8, layout: Layout);
}

impl<I, D> GuardedAllocator<I, D> {
    pub const fn new(deallocator: D) -> Self {
        Self {
            sync_deallocator: deallocator,
            async_machine: OnceCell::new(),
        }
    }

    /// Starts the deallocation worker thread. Must be called once, off the realtime path.
    pub fn init(&self, capacity: usize, deallocator: impl Deallocate + Send + 'static, integration: I) {
        self.async_machine
            .get_or_init(|| AsyncDeallocationMachine::new(capacity, deallocator, integration));
    }

    #[cfg(debug_assertions)]
    fn check(&self, layout: Layout) {
        let forbidden = FORBID_COUNT.with(|f| f.get()) > 0 && PERMIT_COUNT.with(|p| p.get()) == 0;
        if forbidden {
            permit_alloc(|| {
                panic!(
                    "allocation of {} bytes attempted inside a no-alloc realtime region",
                    layout.size()
                );
            });
        }
    }
}

unsafe impl<I: AsyncDeallocationIntegration, D: Deallocate> GlobalAlloc for GuardedAllocator<I, D> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        #[cfg(debug_assertions)]
        self.check(layout);
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let Some(machine) = self.async_machine.get() else {
            #[cfg(debug_assertions)]
            self.check(layout);
            self.sync_deallocator.deallocate(ptr, layout);
            return;
        };
        if machine.integration.offload_deallocation() {
            let task = DeallocationTask { ptr, layout };
            if let Err(e) = machine.sender.try_send(task) {
                match e {
                    TrySendError::Full(_) => {
                        #[cfg(debug_assertions)]
                        self.check(layout);
                        self.sync_deallocator.deallocate(ptr, layout);
                    }
                    TrySendError::Disconnected(_) => {
                        panic!("deallocation worker thread is gone");
                    }
                }
            }
        } else {
            #[cfg(debug_assertions)]
            self.check(layout);
            self.sync_deallocator.deallocate(ptr, layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestIntegration(bool);
    impl AsyncDeallocationIntegration for TestIntegration {
        fn offload_deallocation(&self) -> bool {
            self.0
        }
    }

    struct TestDeallocator;
    impl Deallocate for TestDeallocator {
        fn deallocate(&self, ptr: *mut u8, layout: Layout) {
            unsafe { System.dealloc(ptr, layout) }
        }
    }

    #[global_allocator]
    static GLOBAL_ALLOCATOR: GuardedAllocator<TestIntegration, TestDeallocator> =
        GuardedAllocator::new(TestDeallocator);

    fn init_once() {
        GLOBAL_ALLOCATOR.init(128, TestDeallocator, TestIntegration(true));
    }

    #[test]
    fn offload_deallocate_outside_guard() {
        init_once();
        let v = vec![1, 2, 3];
        assert_no_alloc(|| {
            drop(v);
        });
    }

    #[test]
    #[should_panic]
    fn panics_on_allocation_inside_guard() {
        init_once();
        assert_no_alloc(|| {
            let mut v: Vec<i32> = Vec::new();
            v.push(1);
        });
    }

    #[test]
    fn permit_alloc_lifts_the_guard() {
        init_once();
        assert_no_alloc(|| {
            permit_alloc(|| {
                let v = vec![1, 2, 3];
                drop(v);
            });
        });
    }
}
