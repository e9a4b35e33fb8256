use crossbeam_channel::{Receiver, Sender, at, select, unbounded};

use crate::errors::EvertickError;
use std::{
    thread::JoinHandle,
    time::{Duration, Instant},
};

/// Outcome of one armed wait, delivered exactly once to its completion
/// callback on the reactor thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    /// The deadline passed.
    Expired,
    /// The wait was cancelled, superseded, or the reactor is shutting down.
    Cancelled,
    /// The deadline channel died before the deadline.
    Failed,
}

type ExpiryFn = Box<dyn FnOnce(WaitStatus) + Send + 'static>;

enum TimerCmd {
    Arm {
        deadline: Instant,
        on_expiry: ExpiryFn,
    },
    Cancel,
    Shutdown,
}

/// Owns the thread that runs armed waits. The reactor holds a single wait
/// slot: at most one deadline is pending at any instant, and its completion
/// callback runs on the reactor thread. Dropping the reactor cancels the
/// pending wait and joins the thread.
pub struct TimerReactor {
    tx: Sender<TimerCmd>,
    worker: Option<JoinHandle<()>>,
}

impl TimerReactor {
    pub fn start() -> Self {
        let (tx, rx) = unbounded();
        let worker = std::thread::spawn(move || reactor_loop(rx));
        Self {
            tx,
            worker: Some(worker),
        }
    }

    /// Handle through which waits are armed. Clones all target the same
    /// single wait slot.
    pub fn timer(&self) -> WaitTimer {
        WaitTimer {
            tx: self.tx.clone(),
        }
    }
}

impl Drop for TimerReactor {
    fn drop(&mut self) {
        let _ = self.tx.send(TimerCmd::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Arm/cancel handle onto a [`TimerReactor`].
#[derive(Clone)]
pub struct WaitTimer {
    tx: Sender<TimerCmd>,
}

impl WaitTimer {
    /// Arms the wait slot. The deadline is fixed at call time, so command
    /// queueing delay in the reactor does not shift the expiry. Arming over
    /// an outstanding wait cancels that wait first.
    pub fn arm_for(
        &self,
        wait: Duration,
        on_expiry: impl FnOnce(WaitStatus) + Send + 'static,
    ) -> Result<(), EvertickError> {
        let deadline = Instant::now() + wait;
        self.tx
            .send(TimerCmd::Arm {
                deadline,
                on_expiry: Box::new(on_expiry),
            })
            .map_err(|_| EvertickError::ReactorStopped)
    }

    /// Silent no-op when nothing is armed.
    pub fn cancel_if_armed(&self) {
        let _ = self.tx.send(TimerCmd::Cancel);
    }
}

fn reactor_loop(rx: Receiver<TimerCmd>) {
    let mut armed: Option<(Instant, ExpiryFn)> = None;
    loop {
        match armed.take() {
            None => match rx.recv() {
                Ok(TimerCmd::Arm { deadline, on_expiry }) => {
                    armed = Some((deadline, on_expiry));
                }
                Ok(TimerCmd::Cancel) => {}
                Ok(TimerCmd::Shutdown) | Err(_) => return,
            },
            Some((deadline, on_expiry)) => {
                let expiry = at(deadline);
                select! {
                    recv(expiry) -> tick => match tick {
                        Ok(_) => on_expiry(WaitStatus::Expired),
                        Err(_) => on_expiry(WaitStatus::Failed),
                    },
                    recv(rx) -> cmd => match cmd {
                        Ok(TimerCmd::Arm { deadline, on_expiry: replacement }) => {
                            on_expiry(WaitStatus::Cancelled);
                            armed = Some((deadline, replacement));
                        }
                        Ok(TimerCmd::Cancel) => on_expiry(WaitStatus::Cancelled),
                        Ok(TimerCmd::Shutdown) | Err(_) => {
                            on_expiry(WaitStatus::Cancelled);
                            return;
                        }
                    },
                }
            }
        }
    }
}
