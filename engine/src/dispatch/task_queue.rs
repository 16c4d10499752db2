use crossbeam::queue::SegQueue;
use crossbeam_channel::{Receiver, Sender};

use crate::dispatch::{Job, Priority, PriorityToken};

const PRIORITY_COUNT: usize = 2;

fn priority_index(priority: Priority) -> usize {
    match priority {
        Priority::Immediate => 0,
        Priority::Background => 1,
    }
}

pub struct QueuedJob {
    pub token: PriorityToken,
    pub job: Job,
}

/// Work queue of a single CPU worker.
///
/// Sequence numbers are handed out monotonically, so FIFO order within one
/// priority level is the same as ordering by token.
pub struct CpuTaskQueue {
    queues: [SegQueue<QueuedJob>; PRIORITY_COUNT],
    job_available_sender: Sender<()>,
    job_available_receiver: Receiver<()>,
}

impl CpuTaskQueue {
    pub fn new() -> Self {
        // Capacity 1: coalesce multiple pushes into a single wakeup.
        let (job_available_sender, job_available_receiver) = crossbeam_channel::bounded(1);

        CpuTaskQueue {
            queues: [SegQueue::new(), SegQueue::new()],
            job_available_sender,
            job_available_receiver,
        }
    }

    pub fn subscribe(&self) -> Receiver<()> {
        self.job_available_receiver.clone()
    }

    pub fn push(&self, token: PriorityToken, job: Job) {
        self.queues[priority_index(token.priority)].push(QueuedJob { token, job });
        self.wake();
    }

    pub fn wake(&self) {
        let _ = self.job_available_sender.try_send(());
    }

    pub fn pop(&self) -> Option<QueuedJob> {
        self.queues.iter().find_map(SegQueue::pop)
    }

    /// Drains all queues and returns the number of removed jobs.
    pub fn clear(&self) -> usize {
        let mut removed = 0usize;

        for queue in self.queues.iter() {
            while let Some(_job) = queue.pop() {
                removed += 1;
            }
        }

        removed
    }

    pub fn len(&self) -> usize {
        self.queues.iter().map(SegQueue::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(SegQueue::is_empty)
    }
}

impl Default for CpuTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
