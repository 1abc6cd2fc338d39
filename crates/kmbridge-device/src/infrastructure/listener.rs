//! Background state listener thread.
//!
//! Each connected backend runs one listener that keeps the shared button
//! table (and for some backends the key cache) up to date.  The loop body is
//! backend specific; this module owns the thread, the stop flag and the
//! reset-on-exit rule.
//!
//! # Shutdown
//!
//! The body is called repeatedly until it returns [`ListenerStep::Stop`] or
//! the stop flag is raised.  Bodies block only on short transport timeouts,
//! so [`ListenerHandle::stop`] returns within one timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::application::backend::SharedInputState;

/// What the listener loop should do after one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerStep {
    Continue,
    Stop,
}

/// Owns a running listener thread.
///
/// Dropping the handle stops and joins the thread.
pub struct ListenerHandle {
    name: String,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Starts a listener thread named `name`.
    ///
    /// The shared state is reset before the first iteration and again after
    /// the last one.
    pub fn spawn<F>(name: &str, state: Arc<SharedInputState>, mut body: F) -> std::io::Result<Self>
    where
        F: FnMut() -> ListenerStep + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread_name = name.to_string();
        let thread = std::thread::Builder::new()
            .name(format!("{name}-listener"))
            .spawn(move || {
                state.reset();
                info!("{thread_name} listener started");
                while !thread_stop.load(Ordering::Acquire) {
                    if body() == ListenerStep::Stop {
                        warn!("{thread_name} listener ended: transport closed");
                        break;
                    }
                }
                state.reset();
                debug!("{thread_name} listener stopped");
            })?;
        Ok(Self {
            name: name.to_string(),
            stop,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signals the thread and waits for it.  Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("{} listener panicked", self.name);
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
