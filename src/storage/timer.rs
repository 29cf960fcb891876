use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};

/// Decision returned by a timer callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerFlow {
    /// Arm the next tick.
    Proceed,
    /// Stop ticking.
    Halt,
}

/// Cancellable self-rescheduling delay.
///
/// Each tick waits one period and runs the callback; the next tick is armed
/// only when the callback returns [`TimerFlow::Proceed`] and no cancel was
/// requested in the meantime.
pub struct IdleTimer {
    stop_tx: watch::Sender<bool>,
    join_handle: Option<JoinHandle<()>>,
}

impl IdleTimer {
    /// Spawns the timer task and arms the first tick.
    pub fn schedule<F, Fut>(period: Duration, mut callback: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TimerFlow> + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let join_handle = tokio::spawn(async move {
            loop {
                if *stop_rx.borrow() {
                    break;
                }
                tokio::select! {
                    biased;
                    changed = stop_rx.changed() => {
                        // sender dropped or cancel requested
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = sleep(period) => {
                        if callback().await == TimerFlow::Halt {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            stop_tx,
            join_handle: Some(join_handle),
        }
    }

    /// Stops the timer. A pending delay never reaches its callback.
    pub fn cancel(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Cancels and waits for the timer task to finish its current tick.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(join_handle) = self.join_handle.take() {
            let _ = join_handle.await;
        }
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}
