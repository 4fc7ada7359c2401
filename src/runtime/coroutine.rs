use super::{FunctionRef, IntoMulti, Runtime, Value, Varargs};
use crate::errors::RuntimeError;
use log::debug;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::{Arc, Weak};

/// Coroutine lifecycle. Ordering matters: everything past `Suspended` is not
/// resumable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThreadStatus {
    /// Created, never resumed. Reports as "suspended".
    Initial,
    Suspended,
    Running,
    /// Alive but blocked resuming another coroutine.
    Normal,
    Dead,
}

impl ThreadStatus {
    pub fn name(self) -> &'static str {
        match self {
            ThreadStatus::Initial | ThreadStatus::Suspended => "suspended",
            ThreadStatus::Running => "running",
            ThreadStatus::Normal => "normal",
            ThreadStatus::Dead => "dead",
        }
    }
}

pub(crate) struct ThreadInner {
    pub(crate) status: ThreadStatus,
    /// Handoff slot: resume arguments on the way in.
    pub(crate) args: Varargs,
    /// Handoff slot: yield or return values on the way out.
    pub(crate) result: Varargs,
    pub(crate) error: Option<String>,
}

/// Shared between the Lua-visible handle and the backing OS thread. The OS
/// thread deliberately holds no strong reference to [`ThreadObj`]: once every
/// handle is dropped, `lua_handle` stops upgrading and the parked thread can
/// notice it was orphaned.
pub(crate) struct ThreadState {
    pub(crate) function: Option<FunctionRef>,
    pub(crate) lua_handle: Weak<ThreadObj>,
    pub(crate) runtime: Weak<Runtime>,
    pub(crate) inner: Mutex<ThreadInner>,
    pub(crate) cond: Condvar,
}

pub(crate) struct ThreadObj {
    pub(crate) state: Arc<ThreadState>,
}

/// Shared handle to a coroutine. Equality is identity.
#[derive(Clone)]
pub struct ThreadRef(pub(crate) Arc<ThreadObj>);

impl ThreadRef {
    pub(crate) fn new(rt: &Arc<Runtime>, function: FunctionRef) -> ThreadRef {
        ThreadRef(Arc::new_cyclic(|handle| ThreadObj {
            state: Arc::new(ThreadState {
                function: Some(function),
                lua_handle: handle.clone(),
                runtime: Arc::downgrade(rt),
                inner: Mutex::new(ThreadInner {
                    status: ThreadStatus::Initial,
                    args: Varargs::none(),
                    result: Varargs::none(),
                    error: None,
                }),
                cond: Condvar::new(),
            }),
        }))
    }

    /// The main thread has no function and starts out running.
    pub(crate) fn new_main(runtime: Weak<Runtime>) -> ThreadRef {
        ThreadRef(Arc::new_cyclic(|handle| ThreadObj {
            state: Arc::new(ThreadState {
                function: None,
                lua_handle: handle.clone(),
                runtime,
                inner: Mutex::new(ThreadInner {
                    status: ThreadStatus::Running,
                    args: Varargs::none(),
                    result: Varargs::none(),
                    error: None,
                }),
                cond: Condvar::new(),
            }),
        }))
    }

    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn is_main(&self) -> bool {
        self.0.state.function.is_none()
    }

    pub fn status(&self) -> ThreadStatus {
        self.0.state.inner.lock().status
    }

    pub fn status_name(&self) -> &'static str {
        self.status().name()
    }

    /// Hands control to this coroutine and blocks until it suspends or dies.
    /// Returns `(true, values)` for a successful yield or return, and
    /// `(false, message)` when the coroutine is not resumable or its body
    /// errored. `Err` is only possible while converting `args`.
    pub fn resume<A: IntoMulti>(
        &self,
        args: A,
        rt: &Arc<Runtime>,
    ) -> Result<(bool, Varargs), RuntimeError> {
        let args = args.into_multi(rt)?;
        let inner = self.0.state.inner.lock();

        if inner.status > ThreadStatus::Suspended {
            let which = if inner.status == ThreadStatus::Dead {
                "dead"
            } else {
                "non-suspended"
            };
            drop(inner);

            let message = rt.intern_string(format!("cannot resume {which} coroutine").as_bytes());
            return Ok((false, Varargs::from(Value::String(message))));
        }

        Ok(self.lua_resume(inner, args, rt))
    }

    fn lua_resume(
        &self,
        mut inner: MutexGuard<'_, ThreadInner>,
        args: Varargs,
        rt: &Arc<Runtime>,
    ) -> (bool, Varargs) {
        let state = &self.0.state;
        let previous = rt.swap_running(self.clone());

        inner.args = args;

        if inner.status == ThreadStatus::Initial {
            inner.status = ThreadStatus::Running;

            let spawn_state = state.clone();
            let spawn_rt = rt.clone();
            let name = format!("coroutine-{}", rt.next_coroutine_id());
            debug!("spawning thread for {name}");

            let spawned = std::thread::Builder::new()
                .name(name)
                .spawn(move || coroutine_main(spawn_state, spawn_rt));

            if let Err(err) = spawned {
                log::error!("coroutine thread failed to spawn: {err}");
                inner.status = ThreadStatus::Dead;
                inner.args = Varargs::none();
                drop(inner);

                rt.set_running(previous);
                let message = rt.intern_string(b"cannot start coroutine thread");
                return (false, Varargs::from(Value::String(message)));
            }
        } else {
            inner.status = ThreadStatus::Running;
            state.cond.notify_one();
        }

        previous.set_status(ThreadStatus::Normal);

        // the coroutine cannot take its args or post results until this wait
        // releases the lock, so no notification is lost
        while matches!(
            inner.status,
            ThreadStatus::Running | ThreadStatus::Normal
        ) {
            state.cond.wait(&mut inner);
        }

        let outcome = if let Some(message) = inner.error.take() {
            (
                false,
                Varargs::from(Value::String(rt.intern_string(message.as_bytes()))),
            )
        } else {
            (true, std::mem::take(&mut inner.result))
        };

        inner.args = Varargs::none();
        drop(inner);

        previous.set_status(ThreadStatus::Running);
        rt.set_running(previous);
        outcome
    }

    pub(crate) fn set_status(&self, status: ThreadStatus) {
        self.0.state.inner.lock().status = status;
    }
}

impl ThreadState {
    /// Parks the calling coroutine after posting `results`, waking either on
    /// the next resume (returning its arguments) or on orphan detection. The
    /// caller must not hold a strong handle to its own thread across this
    /// call, or the orphan check can never trip.
    pub(crate) fn lua_yield(&self, results: Varargs) -> Result<Varargs, RuntimeError> {
        let mut inner = self.inner.lock();
        inner.result = results;
        inner.status = ThreadStatus::Suspended;
        self.cond.notify_one();

        loop {
            let Some(rt) = self.runtime.upgrade() else {
                inner.status = ThreadStatus::Dead;
                return Err(RuntimeError::OrphanedThread);
            };

            let interval = rt.orphan_check_interval();
            drop(rt);

            self.cond.wait_for(&mut inner, interval);

            if inner.status == ThreadStatus::Running {
                break;
            }

            if self.lua_handle.upgrade().is_none() {
                debug!("collecting orphaned coroutine");
                inner.status = ThreadStatus::Dead;
                inner.args = Varargs::none();
                inner.result = Varargs::none();
                return Err(RuntimeError::OrphanedThread);
            }
        }

        let args = std::mem::take(&mut inner.args);
        inner.result = Varargs::none();
        Ok(args)
    }
}

/// Entry point of the backing OS thread. Every exit path, a body panic
/// included, must end with `Dead` and a notification or the resumer parks
/// forever.
fn coroutine_main(state: Arc<ThreadState>, rt: Arc<Runtime>) {
    let args = std::mem::take(&mut state.inner.lock().args);

    let Some(function) = state.function.clone() else {
        return;
    };

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        function.call(args, &rt)
    }));

    let mut inner = state.inner.lock();

    match result {
        Ok(Ok(values)) => inner.result = values,
        Ok(Err(RuntimeError::OrphanedThread)) => {
            // no one is waiting for an orphan; exit quietly
            inner.status = ThreadStatus::Dead;
            inner.error = None;
            state.cond.notify_one();
            return;
        }
        Ok(Err(err)) => {
            debug!("coroutine body errored: {err}");
            inner.error = Some(err.to_string());
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            debug!("coroutine body panicked: {message}");
            inner.error = Some(message);
        }
    }

    inner.status = ThreadStatus::Dead;
    state.cond.notify_one();
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        String::from("unknown panic")
    }
}

impl PartialEq for ThreadRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ThreadRef {}

impl std::fmt::Debug for ThreadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "thread: {:#x} ({})", self.id(), self.status_name())
    }
}
