use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use anyhow::Context;
use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::dispatch::{CpuTask, IoTask, Job, TaskDispatch, task_queue::CpuTaskQueue};

/// Threaded `TaskDispatch`.
///
/// CPU work runs on dedicated threads with one queue each, so the affinity
/// key of a chunk decides which thread builds it. I/O work runs on a rayon
/// pool in submission order.
pub struct WorkerPools {
    cpu_queues: Vec<Arc<CpuTaskQueue>>,
    cpu_handles: Vec<JoinHandle<()>>,
    io_pool: rayon::ThreadPool,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPools {
    pub fn new(cpu_workers: usize, io_workers: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(cpu_workers > 0, "At least one CPU worker is required");
        anyhow::ensure!(io_workers > 0, "At least one I/O worker is required");

        let shutdown = Arc::new(AtomicBool::new(false));
        let mut cpu_queues = Vec::with_capacity(cpu_workers);
        let mut cpu_handles = Vec::with_capacity(cpu_workers);

        for index in 0..cpu_workers {
            let queue = Arc::new(CpuTaskQueue::new());
            let worker = CpuWorker {
                queue: queue.clone(),
                wakeup: queue.subscribe(),
                shutdown: shutdown.clone(),
            };

            let handle = std::thread::Builder::new()
                .name(format!("Chunk worker {index}"))
                .spawn(move || worker.process_jobs())
                .with_context(|| format!("Failed to spawn chunk worker {index}"))?;

            cpu_queues.push(queue);
            cpu_handles.push(handle);
        }

        let io_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(io_workers)
            .thread_name(|index| format!("Chunk I/O {index}"))
            .build()
            .context("Failed to build chunk I/O pool")?;

        log::info!(
            "Started {} chunk workers and {} I/O workers",
            cpu_workers,
            io_workers
        );

        Ok(WorkerPools {
            cpu_queues,
            cpu_handles,
            io_pool,
            shutdown,
        })
    }

    pub fn cpu_worker_count(&self) -> usize {
        self.cpu_queues.len()
    }

    pub fn io_worker_count(&self) -> usize {
        self.io_pool.current_num_threads()
    }

    /// Jobs waiting on CPU workers, not counting the ones currently running.
    pub fn queued_cpu_jobs(&self) -> usize {
        self.cpu_queues.iter().map(|queue| queue.len()).sum()
    }
}

impl TaskDispatch for WorkerPools {
    fn spawn_cpu(&self, task: CpuTask, job: Job) {
        let worker = task.affinity.worker_index(self.cpu_queues.len());
        self.cpu_queues[worker].push(task.priority, job);
    }

    fn spawn_io(&self, _task: IoTask, job: Job) {
        self.io_pool.spawn_fifo(job);
    }
}

impl Drop for WorkerPools {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for queue in &self.cpu_queues {
            queue.wake();
        }

        for handle in self.cpu_handles.drain(..) {
            if handle.join().is_err() {
                log::error!("A chunk worker panicked");
            }
        }

        log::info!("Chunk workers shut down");
    }
}

struct CpuWorker {
    queue: Arc<CpuTaskQueue>,
    wakeup: Receiver<()>,
    shutdown: Arc<AtomicBool>,
}

impl CpuWorker {
    fn process_jobs(self) {
        loop {
            while let Some(queued) = self.queue.pop() {
                (queued.job)();
            }

            if self.shutdown.load(Ordering::Acquire) {
                let dropped = self.queue.clear();
                if dropped > 0 {
                    log::warn!("Dropped {} queued chunk jobs on shutdown", dropped);
                }
                break;
            }

            match self.wakeup.recv_timeout(Duration::from_millis(5)) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chunk::state_bits::Stage,
        dispatch::{AffinityKey, Priority, PriorityToken},
        voxels::coord::ChunkPos,
    };

    fn cpu_task(affinity: u64, sequence: u64) -> CpuTask {
        CpuTask {
            pos: ChunkPos::new(0, 0, 0),
            stage: Stage::Generate,
            affinity: AffinityKey(affinity),
            priority: PriorityToken {
                priority: Priority::Background,
                sequence,
            },
        }
    }

    fn current_thread_name() -> String {
        std::thread::current()
            .name()
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn same_affinity_runs_on_same_thread() {
        let pools = WorkerPools::new(3, 1).unwrap();
        let (sender, receiver) = crossbeam_channel::unbounded();

        for sequence in 0..12 {
            let affinity = sequence % 3;
            let sender = sender.clone();
            pools.spawn_cpu(
                cpu_task(affinity, sequence),
                Box::new(move || {
                    sender.send((affinity, current_thread_name())).unwrap();
                }),
            );
        }

        let mut threads = std::collections::HashMap::new();
        for _ in 0..12 {
            let (affinity, thread) = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
            let expected = threads.entry(affinity).or_insert_with(|| thread.clone());
            assert_eq!(*expected, thread);
            assert_eq!(thread, format!("Chunk worker {affinity}"));
        }
    }

    #[test]
    fn io_jobs_run_once() {
        let pools = WorkerPools::new(1, 2).unwrap();
        let (sender, receiver) = crossbeam_channel::unbounded();

        for index in 0..8 {
            let sender = sender.clone();
            pools.spawn_io(
                IoTask {
                    pos: ChunkPos::new(index, 0, 0),
                    stage: Stage::LoadData,
                },
                Box::new(move || sender.send(index).unwrap()),
            );
        }
        drop(sender);

        let mut received: Vec<i32> = receiver.iter().take(8).collect();
        received.sort();
        assert_eq!(received, (0..8).collect::<Vec<_>>());
        assert_eq!(pools.io_worker_count(), 2);
    }

    #[test]
    fn rejects_empty_pools() {
        assert!(WorkerPools::new(0, 1).is_err());
        assert!(WorkerPools::new(1, 0).is_err());
    }
}
