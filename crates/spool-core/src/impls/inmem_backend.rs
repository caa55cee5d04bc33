//! InMemoryBackend - 開発用の SchedulingBackend
//!
//! Keeps pending jobs keyed by tag and fires them into a
//! [`ScheduledTaskHandler`] when due. It stands in for a platform job
//! trigger in tests and in the demo binary; nothing survives the process.
//!
//! Verdict handling:
//! - SUCCESS: dropped, or re-armed after `delay` when periodic
//! - RESCHEDULE: re-armed after the retry policy's backoff
//! - FAIL: dropped
//!
//! The flex window is ignored; a job fires as soon as its delay elapses.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, watch};
use tokio::time::Instant;

use super::RetryPolicy;
use crate::domain::{Tag, TaskOptions, TaskResult};
use crate::error::BackendError;
use crate::ports::{ScheduledTaskHandler, SchedulingBackend};

/// Periodic jobs never re-arm faster than this.
const MIN_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct PendingJob {
    options: TaskOptions,
    next_run_at: Instant,
    /// Bumped on every schedule call; lets a finished firing notice that the
    /// job was replaced while it ran.
    generation: u64,
    /// RESCHEDULE verdicts since the job was (re)scheduled.
    backoff_attempts: u32,
    firing: bool,
}

#[derive(Debug, Default)]
struct BackendState {
    pending: HashMap<Tag, PendingJob>,
    next_generation: u64,
}

impl BackendState {
    /// Due jobs, earliest first, schedule order breaking ties.
    fn take_due(&mut self, now: Instant) -> Vec<(Tag, u64)> {
        let mut due: Vec<(Instant, u64, Tag)> = self
            .pending
            .iter()
            .filter(|(_, job)| !job.firing && job.next_run_at <= now)
            .map(|(tag, job)| (job.next_run_at, job.generation, tag.clone()))
            .collect();
        due.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        due.into_iter()
            .filter_map(|(_, generation, tag)| {
                let job = self.pending.get_mut(&tag)?;
                job.firing = true;
                Some((tag, generation))
            })
            .collect()
    }

    fn next_wake(&self) -> Option<Instant> {
        self.pending
            .values()
            .filter(|job| !job.firing)
            .map(|job| job.next_run_at)
            .min()
    }
}

pub struct InMemoryBackend {
    state: Mutex<BackendState>,
    retry_policy: RetryPolicy,
    notify: Notify,
}

impl InMemoryBackend {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self {
            state: Mutex::new(BackendState::default()),
            retry_policy,
            notify: Notify::new(),
        }
    }

    /// Tags currently pending (including any being fired), sorted.
    pub async fn pending_tags(&self) -> Vec<Tag> {
        let state = self.state.lock().await;
        let mut tags: Vec<Tag> = state.pending.keys().cloned().collect();
        tags.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        tags
    }

    pub async fn pending_options(&self, tag: &Tag) -> Option<TaskOptions> {
        self.state.lock().await.pending.get(tag).map(|job| job.options)
    }

    pub async fn is_pending(&self, tag: &Tag) -> bool {
        self.state.lock().await.pending.contains_key(tag)
    }

    /// When the earliest pending job becomes due.
    pub async fn next_due_at(&self) -> Option<Instant> {
        self.state.lock().await.next_wake()
    }

    /// Fire every job that is due now, one after another, and apply the
    /// verdicts. Returns what fired.
    pub async fn fire_due<H>(&self, handler: &H) -> Vec<(Tag, TaskResult)>
    where
        H: ScheduledTaskHandler + ?Sized,
    {
        let due = self.state.lock().await.take_due(Instant::now());

        let mut fired = Vec::with_capacity(due.len());
        for (tag, generation) in due {
            // no lock held while the task runs
            let verdict = handler.handle_scheduled_task(&tag).await;
            self.apply_verdict(&tag, generation, verdict).await;
            fired.push((tag, verdict));
        }
        fired
    }

    async fn apply_verdict(&self, tag: &Tag, generation: u64, verdict: TaskResult) {
        let mut state = self.state.lock().await;
        let Some(job) = state.pending.get_mut(tag) else {
            // cancelled while firing
            return;
        };
        if job.generation != generation {
            // replaced while firing; the newer schedule stands
            job.firing = false;
            return;
        }

        let now = Instant::now();
        match verdict {
            TaskResult::Reschedule => {
                job.backoff_attempts += 1;
                let delay = self.retry_policy.next_delay(job.backoff_attempts);
                job.next_run_at = now + delay;
                job.firing = false;
                tracing::debug!(%tag, attempt = job.backoff_attempts, ?delay, "backing off");
            }
            TaskResult::Success if job.options.periodic() => {
                job.backoff_attempts = 0;
                job.next_run_at = now + job.options.delay().max(MIN_PERIOD);
                job.firing = false;
            }
            TaskResult::Success | TaskResult::Fail => {
                state.pending.remove(tag);
            }
        }
    }

    /// Fire jobs as they come due until `shutdown` flips to true.
    ///
    /// Wakes on the earliest due time, on any schedule/cancel call, or after
    /// `idle_poll` when nothing is pending.
    pub async fn run<H>(
        &self,
        handler: &H,
        idle_poll: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) where
        H: ScheduledTaskHandler + ?Sized,
    {
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.fire_due(handler).await;

            let wake_at = self
                .next_due_at()
                .await
                .unwrap_or_else(|| Instant::now() + idle_poll);

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // sender dropped
                        break;
                    }
                }
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(RetryPolicy::default_v1())
    }
}

#[async_trait]
impl SchedulingBackend for InMemoryBackend {
    async fn schedule(&self, tag: &Tag, options: &TaskOptions) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        if state.pending.contains_key(tag) && !options.replace() {
            tracing::debug!(%tag, "job already pending; keeping it");
            return Ok(());
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        state.pending.insert(
            tag.clone(),
            PendingJob {
                options: *options,
                next_run_at: Instant::now() + options.delay(),
                generation,
                backoff_attempts: 0,
                firing: false,
            },
        );
        drop(state);

        self.notify.notify_one();
        Ok(())
    }

    async fn cancel(&self, tag: &Tag) -> Result<(), BackendError> {
        let removed = self.state.lock().await.pending.remove(tag).is_some();
        tracing::debug!(%tag, removed, "cancel");
        self.notify.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Returns queued verdicts in order, SUCCESS once they run out.
    #[derive(Default)]
    struct Verdicts {
        queued: StdMutex<Vec<TaskResult>>,
        calls: StdMutex<Vec<Tag>>,
    }

    impl Verdicts {
        fn new(queued: Vec<TaskResult>) -> Self {
            Self {
                queued: StdMutex::new(queued),
                calls: StdMutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Tag> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ScheduledTaskHandler for Verdicts {
        async fn handle_scheduled_task(&self, tag: &Tag) -> TaskResult {
            self.calls.lock().unwrap().push(tag.clone());
            let mut queued = self.queued.lock().unwrap();
            if queued.is_empty() {
                TaskResult::Success
            } else {
                queued.remove(0)
            }
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_delay: Duration::from_secs(3600),
        }
    }

    fn delayed(secs: u64) -> TaskOptions {
        TaskOptions::builder()
            .delay(Duration::from_secs(secs))
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn fires_only_after_delay() {
        let backend = InMemoryBackend::new(policy());
        let handler = Verdicts::default();
        let tag = Tag::new("a.b.v1");

        backend.schedule(&tag, &delayed(60)).await.unwrap();
        assert!(backend.fire_due(&handler).await.is_empty());

        tokio::time::advance(Duration::from_secs(60)).await;
        let fired = backend.fire_due(&handler).await;
        assert_eq!(fired, vec![(tag.clone(), TaskResult::Success)]);
        assert!(!backend.is_pending(&tag).await);
    }

    #[tokio::test(start_paused = true)]
    async fn replace_false_keeps_pending_job() {
        let backend = InMemoryBackend::new(policy());
        let tag = Tag::new("a.b.v1");

        backend.schedule(&tag, &delayed(10)).await.unwrap();
        backend.schedule(&tag, &delayed(500)).await.unwrap();

        assert_eq!(backend.pending_options(&tag).await, Some(delayed(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn replace_true_overwrites_pending_job() {
        let backend = InMemoryBackend::new(policy());
        let tag = Tag::new("a.b.v1");
        let replacing = TaskOptions::builder()
            .delay(Duration::from_secs(500))
            .replace(true)
            .build();

        backend.schedule(&tag, &delayed(10)).await.unwrap();
        backend.schedule(&tag, &replacing).await.unwrap();

        assert_eq!(backend.pending_tags().await, vec![tag.clone()]);
        assert_eq!(backend.pending_options(&tag).await, Some(replacing));
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_backs_off_exponentially() {
        let backend = InMemoryBackend::new(policy());
        let handler = Verdicts::new(vec![TaskResult::Reschedule, TaskResult::Reschedule]);
        let tag = Tag::new("a.b.v1");

        backend.schedule(&tag, &TaskOptions::default()).await.unwrap();
        assert_eq!(backend.fire_due(&handler).await.len(), 1);

        // first backoff: 10s
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(backend.fire_due(&handler).await.is_empty());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(backend.fire_due(&handler).await.len(), 1);

        // second backoff: 20s
        tokio::time::advance(Duration::from_secs(19)).await;
        assert!(backend.fire_due(&handler).await.is_empty());
        tokio::time::advance(Duration::from_secs(1)).await;
        let fired = backend.fire_due(&handler).await;
        assert_eq!(fired, vec![(tag.clone(), TaskResult::Success)]);

        assert_eq!(handler.calls().len(), 3);
        assert!(!backend.is_pending(&tag).await);
    }

    #[tokio::test(start_paused = true)]
    async fn fail_drops_the_job() {
        let backend = InMemoryBackend::new(policy());
        let handler = Verdicts::new(vec![TaskResult::Fail]);
        let tag = Tag::new("a.b.v1");

        backend.schedule(&tag, &TaskOptions::default()).await.unwrap();
        backend.fire_due(&handler).await;
        assert!(backend.pending_tags().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_success_rearms() {
        let backend = InMemoryBackend::new(policy());
        let handler = Verdicts::default();
        let tag = Tag::new("a.b.v1");
        let periodic = TaskOptions::builder()
            .delay(Duration::from_secs(30))
            .periodic(true)
            .build();

        backend.schedule(&tag, &periodic).await.unwrap();
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(30)).await;
            assert_eq!(backend.fire_due(&handler).await.len(), 1);
        }
        assert!(backend.is_pending(&tag).await);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_future_firing() {
        let backend = InMemoryBackend::new(policy());
        let handler = Verdicts::default();
        let tag = Tag::new("a.b.v1");

        backend.schedule(&tag, &delayed(5)).await.unwrap();
        backend.cancel(&tag).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;

        assert!(backend.fire_due(&handler).await.is_empty());
        assert!(handler.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn due_jobs_fire_earliest_first() {
        let backend = InMemoryBackend::new(policy());
        let handler = Verdicts::default();

        backend.schedule(&Tag::new("late"), &delayed(20)).await.unwrap();
        backend.schedule(&Tag::new("early"), &delayed(10)).await.unwrap();
        backend.schedule(&Tag::new("also-early"), &delayed(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(20)).await;
        backend.fire_due(&handler).await;

        assert_eq!(
            handler.calls(),
            vec![Tag::new("early"), Tag::new("also-early"), Tag::new("late")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_fires_and_stops_on_shutdown() {
        let backend = std::sync::Arc::new(InMemoryBackend::new(policy()));
        let handler = std::sync::Arc::new(Verdicts::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let join = tokio::spawn({
            let backend = backend.clone();
            let handler = handler.clone();
            async move {
                backend
                    .run(handler.as_ref(), Duration::from_secs(60), shutdown_rx)
                    .await;
            }
        });

        backend.schedule(&Tag::new("t"), &delayed(5)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(handler.calls(), vec![Tag::new("t")]);

        shutdown_tx.send(true).unwrap();
        join.await.unwrap();
    }
}
