//! Containment of faults raised while executing a checked program.
//!
//! A [`Containment`] guard replaces the process-wide panic hook for as long as it
//! is alive. Panics raised inside [`Containment::contain`] are silenced and turned
//! into a [`HostFault`](ErrorKind::HostFault) error of the current execution; any
//! other panic is forwarded to the hook that was installed before.
//!
//! Guards are reference-counted: the hook is installed by the first live guard and
//! the previous one is restored when the last guard is dropped.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe, PanicHookInfo};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use log::debug;

use crate::trace::{ErrorKind, TraceError};

type Hook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

struct Installed {
    guards: usize,
    previous: Option<Arc<Hook>>,
}

static INSTALLED: Mutex<Installed> = Mutex::new(Installed {
    guards: 0,
    previous: None,
});

thread_local! {
    static CONTAINING: Cell<bool> = const { Cell::new(false) };
}

/// Scoped installation of the fault-containing panic hook.
#[derive(Debug)]
pub struct Containment {
    _private: (),
}

impl Containment {
    pub fn install() -> Self {
        let mut installed = INSTALLED.lock().unwrap_or_else(PoisonError::into_inner);
        if installed.guards == 0 {
            let previous: Arc<Hook> = Arc::new(panic::take_hook());
            let forward = Arc::clone(&previous);
            panic::set_hook(Box::new(move |info| {
                if !CONTAINING.with(Cell::get) {
                    forward(info);
                }
            }));
            installed.previous = Some(previous);
        }
        installed.guards += 1;
        Self { _private: () }
    }

    /// Run `f`, converting a panic into a host fault.
    pub fn contain<T>(&self, f: impl FnOnce() -> T) -> Result<T, TraceError> {
        let outer = CONTAINING.with(|c| c.replace(true));
        let result = panic::catch_unwind(AssertUnwindSafe(f));
        CONTAINING.with(|c| c.set(outer));
        result.map_err(|payload| {
            let message = format!("fault while executing: {}", panic_message(payload.as_ref()));
            debug!("{}", message);
            TraceError::new(ErrorKind::HostFault, None, message)
        })
    }

    /// Whether a containment guard is currently alive.
    pub fn is_installed() -> bool {
        INSTALLED
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .guards
            > 0
    }
}

impl Drop for Containment {
    fn drop(&mut self) {
        let mut installed = INSTALLED.lock().unwrap_or_else(PoisonError::into_inner);
        installed.guards -= 1;
        if installed.guards > 0 {
            return;
        }
        let Some(previous) = installed.previous.take() else {
            return;
        };
        // The hook cannot be replaced while this thread is panicking; ours keeps
        // forwarding to the previous one.
        if thread::panicking() {
            return;
        }
        drop(panic::take_hook());
        match Arc::try_unwrap(previous) {
            Ok(hook) => panic::set_hook(hook),
            Err(shared) => panic::set_hook(Box::new(move |info| shared(info))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown fault"
    }
}
