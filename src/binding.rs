use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::notification::HopStream;
use crate::session::SessionHub;

/// Ties a set of options to the trace currently running with them.
///
/// Subscribers wait on the begin gate, which opens once per bind and is
/// replaced by a closed one on unbind so the options can be reused.
#[derive(Debug)]
pub(crate) struct SessionBinding {
    state: Mutex<BindingState>,
}

#[derive(Debug)]
struct BindingState {
    session: Option<Arc<SessionHub>>,
    begin: watch::Sender<bool>,
}

impl SessionBinding {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(BindingState {
                session: None,
                begin: watch::channel(false).0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, BindingState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Associates `session` and opens the begin gate. The association is
    /// released when the returned guard is dropped.
    pub(crate) fn bind(&self, session: Arc<SessionHub>) -> Result<BindGuard<'_>> {
        let mut state = self.state();
        if state.session.is_some() {
            return Err(Error::AlreadyBound);
        }
        state.session = Some(session);
        state.begin.send_replace(true);
        Ok(BindGuard { binding: self })
    }

    fn unbind(&self) {
        let mut state = self.state();
        state.session = None;
        state.begin = watch::channel(false).0;
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.state().session.is_some()
    }

    /// Waits for a trace to start, then registers a new subscriber with it.
    ///
    /// Returns `None` when the trace is already over by the time the gate is
    /// passed.
    pub(crate) async fn subscribe(&self) -> Option<HopStream> {
        let mut begin = self.state().begin.subscribe();
        begin.wait_for(|open| *open).await.ok()?;
        let session = self.state().session.clone()?;
        session.register().await
    }
}

#[derive(Debug)]
pub(crate) struct BindGuard<'a> {
    binding: &'a SessionBinding,
}

impl Drop for BindGuard<'_> {
    fn drop(&mut self) {
        self.binding.unbind();
    }
}
