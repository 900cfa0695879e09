//! Runs timers as tokio tasks that feed the dispatch queue.

use packetforge_dispatch::{DispatchQueue, Packet};
use tokio::task::JoinHandle;

use crate::{TimerConfig, TimerScheduler};

/// A set of running timers. Dropping the service stops them.
#[derive(Debug)]
pub struct TimerService {
    tasks: Vec<(u32, JoinHandle<()>)>,
}

impl TimerService {
    /// Starts one task per timer. Must be called inside a tokio runtime.
    ///
    /// A task ends on its own once the queue is shut down.
    pub fn spawn(queue: DispatchQueue, timers: impl IntoIterator<Item = TimerConfig>) -> Self {
        let tasks: Vec<_> = timers
            .into_iter()
            .map(|config| {
                let timer_id = config.timer_id;
                let handle = tokio::spawn(run_timer(TimerScheduler::new(config), queue.clone()));
                (timer_id, handle)
            })
            .collect();
        tracing::info!(timers = tasks.len(), "timer service started");
        Self { tasks }
    }

    /// Ids of the timers this service was started with.
    pub fn timer_ids(&self) -> Vec<u32> {
        self.tasks.iter().map(|(id, _)| *id).collect()
    }

    /// Timers whose task is still running.
    pub fn active(&self) -> usize {
        self.tasks.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    /// Aborts every timer task. Fires already queued stay queued.
    pub fn stop(&self) {
        for (_, handle) in &self.tasks {
            handle.abort();
        }
        tracing::debug!(timers = self.tasks.len(), "timer service stopped");
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        for (_, handle) in &self.tasks {
            handle.abort();
        }
    }
}

async fn run_timer(mut scheduler: TimerScheduler, queue: DispatchQueue) {
    loop {
        let fire = scheduler.wait().await;
        let packet = Packet::Timer {
            timer_id: fire.timer_id,
        };
        if queue.push(packet).is_err() {
            tracing::debug!(
                timer_id = fire.timer_id,
                fires = fire.count,
                "dispatch queue closed, timer exiting"
            );
            return;
        }
    }
}
