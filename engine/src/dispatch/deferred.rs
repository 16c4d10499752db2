use std::collections::VecDeque;
use std::sync::Mutex;

use crate::{
    chunk::state_bits::Stage,
    dispatch::{CpuTask, IoTask, Job, TaskDispatch},
    sync::lock,
    voxels::coord::ChunkPos,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Cpu(CpuTask),
    Io(IoTask),
}

impl Submission {
    pub fn stage(&self) -> Stage {
        match self {
            Submission::Cpu(task) => task.stage,
            Submission::Io(task) => task.stage,
        }
    }

    pub fn pos(&self) -> ChunkPos {
        match self {
            Submission::Cpu(task) => task.pos,
            Submission::Io(task) => task.pos,
        }
    }
}

/// `TaskDispatch` that only queues jobs, running them when asked to.
///
/// Makes scheduling deterministic for tests and lets single-threaded drivers
/// decide when work happens.
#[derive(Default)]
pub struct DeferredDispatch {
    queue: Mutex<VecDeque<(Submission, Job)>>,
    history: Mutex<Vec<Submission>>,
}

impl DeferredDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the oldest queued job.
    pub fn run_next(&self) -> Option<Submission> {
        let (submission, job) = lock(&self.queue).pop_front()?;
        job();
        Some(submission)
    }

    /// Runs queued jobs until the queue is empty, returning how many ran.
    pub fn run_all(&self) -> usize {
        let mut count = 0;
        while self.run_next().is_some() {
            count += 1;
        }
        count
    }

    pub fn queued(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn queued_submissions(&self) -> Vec<Submission> {
        lock(&self.queue)
            .iter()
            .map(|(submission, _)| *submission)
            .collect()
    }

    /// Every submission so far, in submission order.
    pub fn history(&self) -> Vec<Submission> {
        lock(&self.history).clone()
    }

    pub fn take_history(&self) -> Vec<Submission> {
        std::mem::take(&mut *lock(&self.history))
    }

    fn submit(&self, submission: Submission, job: Job) {
        lock(&self.history).push(submission);
        lock(&self.queue).push_back((submission, job));
    }
}

impl TaskDispatch for DeferredDispatch {
    fn spawn_cpu(&self, task: CpuTask, job: Job) {
        self.submit(Submission::Cpu(task), job);
    }

    fn spawn_io(&self, task: IoTask, job: Job) {
        self.submit(Submission::Io(task), job);
    }
}
