//! WorkerLoop - バックグラウンド実行ループ
//!
//! One tokio task per Task Manager runs posted jobs strictly one at a time.
//! Posts arrive over an unbounded channel and wait in a due-time heap;
//! immediate posts are due when posted, so they run in FIFO order, and
//! delayed posts with the same due time run in the order they were posted.
//!
//! Each job runs inside its own spawned task. A job that panics is logged
//! and the loop moves on to the next one.
//!
//! The loop exits once every [`WorkerHandle`] is dropped and the heap is
//! empty. Delayed posts still pending at that point are run first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A unit of background work.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Post {
    label: String,
    due: Instant,
    job: Job,
}

struct Queued {
    due: Instant,
    seq: u64,
    label: String,
    job: Job,
}

// BinaryHeap is a max-heap; invert so the earliest (due, seq) pops first.
impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Queued {}

/// Sending side of the worker. Cheap to clone.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<Post>,
}

impl WorkerHandle {
    /// Queue `job` behind everything already due. Returns false if the
    /// worker is gone.
    pub fn post(&self, label: impl Into<String>, job: Job) -> bool {
        self.post_at(label.into(), Instant::now(), job)
    }

    /// Queue `job` to run no earlier than `delay` from now.
    pub fn post_delayed(&self, label: impl Into<String>, delay: Duration, job: Job) -> bool {
        self.post_at(label.into(), Instant::now() + delay, job)
    }

    fn post_at(&self, label: String, due: Instant, job: Job) -> bool {
        match self.tx.send(Post { label, due, job }) {
            Ok(()) => true,
            Err(rejected) => {
                tracing::warn!(
                    job = %rejected.0.label,
                    "background worker has stopped; job dropped"
                );
                false
            }
        }
    }
}

/// WorkerLoop は投入されたジョブを一つずつ実行
pub struct WorkerLoop {
    rx: mpsc::UnboundedReceiver<Post>,
    heap: BinaryHeap<Queued>,
    next_seq: u64,
}

impl WorkerLoop {
    /// Spawn the loop on `runtime`.
    pub fn spawn(runtime: &Handle) -> (WorkerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = WorkerLoop {
            rx,
            heap: BinaryHeap::new(),
            next_seq: 0,
        };
        let join = runtime.spawn(worker.run());
        (WorkerHandle { tx }, join)
    }

    fn enqueue(&mut self, post: Post) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Queued {
            due: post.due,
            seq,
            label: post.label,
            job: post.job,
        });
    }

    async fn run(mut self) {
        let mut open = true;
        loop {
            // pick up everything already sent before choosing what runs next
            while open {
                match self.rx.try_recv() {
                    Ok(post) => self.enqueue(post),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => open = false,
                }
            }

            let next_due = self.heap.peek().map(|queued| queued.due);
            match next_due {
                Some(due) if due <= Instant::now() => {
                    if let Some(queued) = self.heap.pop() {
                        run_one(queued).await;
                    }
                    continue;
                }
                None if !open => break,
                _ => {}
            }

            tokio::select! {
                post = self.rx.recv(), if open => match post {
                    Some(post) => self.enqueue(post),
                    None => open = false,
                },
                _ = sleep_until_due(next_due) => {}
            }
        }
        tracing::debug!("background worker stopped");
    }
}

async fn sleep_until_due(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}

async fn run_one(queued: Queued) {
    let Queued { label, job, .. } = queued;
    tracing::trace!(job = %label, "running background job");
    if let Err(e) = tokio::spawn(job).await {
        tracing::error!(job = %label, error = %e, "background job panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn push(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Job {
        let log = log.clone();
        Box::pin(async move {
            log.lock().unwrap().push(name);
        })
    }

    #[tokio::test]
    async fn runs_posts_in_fifo_order_one_at_a_time() {
        let (handle, join) = WorkerLoop::spawn(&Handle::current());
        let log = recorder();

        let slow = {
            let log = log.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                log.lock().unwrap().push("A");
            }) as Job
        };
        assert!(handle.post("A", slow));
        assert!(handle.post("B", push(&log, "B")));
        assert!(handle.post("C", push(&log, "C")));

        drop(handle);
        join.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn equal_due_times_keep_insertion_order() {
        let (handle, join) = WorkerLoop::spawn(&Handle::current());
        let log = recorder();

        handle.post_delayed("X", Duration::from_secs(10), push(&log, "X"));
        handle.post_delayed("Y", Duration::from_secs(10), push(&log, "Y"));
        handle.post_delayed("W", Duration::from_secs(5), push(&log, "W"));
        handle.post_delayed("Z", Duration::from_secs(10), push(&log, "Z"));
        handle.post("now", push(&log, "now"));

        drop(handle);
        join.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["now", "W", "X", "Y", "Z"]);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_post_waits_for_its_due_time() {
        let (handle, _join) = WorkerLoop::spawn(&Handle::current());
        let log = recorder();

        handle.post_delayed("late", Duration::from_secs(30), push(&log, "late"));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(log.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*log.lock().unwrap(), vec!["late"]);
    }

    #[tokio::test]
    async fn panicking_job_does_not_stall_the_worker() {
        let (handle, join) = WorkerLoop::spawn(&Handle::current());
        let log = recorder();

        handle.post("boom", Box::pin(async { panic!("job blew up") }));
        handle.post("after", push(&log, "after"));

        drop(handle);
        join.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[tokio::test]
    async fn post_after_shutdown_is_rejected() {
        let (handle, join) = WorkerLoop::spawn(&Handle::current());
        join.abort();
        let _ = join.await;

        assert!(!handle.post("late", Box::pin(async {})));
    }
}
