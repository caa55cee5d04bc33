//! Task options: immutable scheduling policy for one scheduled job.
//!
//! Options are layered when a task is scheduled:
//! 1. the task type's declared defaults,
//! 2. the fields the caller set explicitly,
//! 3. `replace = true` forced for singleton tasks.
//!
//! `TaskOptions` remembers which fields were set explicitly on the builder
//! that produced it, so `update()` can merge only those over the defaults.

use std::time::Duration;

/// Which fields were set explicitly when the options were built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ExplicitFields {
    delay: bool,
    window: bool,
    periodic: bool,
    replace: bool,
    retry_ceiling: bool,
}

/// Scheduling policy handed to the backend with a tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskOptions {
    delay: Duration,
    window: Duration,
    periodic: bool,
    replace: bool,
    retry_ceiling: u32,
    explicit: ExplicitFields,
}

impl TaskOptions {
    pub fn builder() -> TaskOptionsBuilder {
        TaskOptionsBuilder::default()
    }

    /// Minimum time before the first firing (or the period, if periodic).
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Flex window after `delay` within which the backend may fire.
    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn periodic(&self) -> bool {
        self.periodic
    }

    /// Replace a pending job with the same tag instead of keeping it.
    pub fn replace(&self) -> bool {
        self.replace
    }

    /// Maximum tracked retries before RESCHEDULE becomes FAIL. `0` means
    /// no ceiling.
    pub fn retry_ceiling(&self) -> u32 {
        self.retry_ceiling
    }
}

// Equality is on the policy values; the explicit-field bookkeeping is not
// part of what the options mean.
impl PartialEq for TaskOptions {
    fn eq(&self, other: &Self) -> bool {
        self.delay == other.delay
            && self.window == other.window
            && self.periodic == other.periodic
            && self.replace == other.replace
            && self.retry_ceiling == other.retry_ceiling
    }
}

impl Eq for TaskOptions {}

/// Accumulating builder for [`TaskOptions`].
///
/// # Example
/// ```ignore
/// let options = TaskOptions::builder()
///     .defaults(SubscribeTask::default_options())
///     .update(&caller_options)
///     .replace(true)
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct TaskOptionsBuilder {
    delay: Option<Duration>,
    window: Option<Duration>,
    periodic: Option<bool>,
    replace: Option<bool>,
    retry_ceiling: Option<u32>,
    defaults: Option<TaskOptions>,
}

impl TaskOptionsBuilder {
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }

    pub fn periodic(mut self, periodic: bool) -> Self {
        self.periodic = Some(periodic);
        self
    }

    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = Some(replace);
        self
    }

    pub fn retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = Some(ceiling);
        self
    }

    /// Base values for every field not set explicitly.
    pub fn defaults(mut self, defaults: TaskOptions) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Merge the fields `other` set explicitly over the current ones.
    pub fn update(mut self, other: &TaskOptions) -> Self {
        let set = other.explicit;
        if set.delay {
            self.delay = Some(other.delay);
        }
        if set.window {
            self.window = Some(other.window);
        }
        if set.periodic {
            self.periodic = Some(other.periodic);
        }
        if set.replace {
            self.replace = Some(other.replace);
        }
        if set.retry_ceiling {
            self.retry_ceiling = Some(other.retry_ceiling);
        }
        self
    }

    pub fn build(self) -> TaskOptions {
        let base = self.defaults.unwrap_or_default();
        TaskOptions {
            delay: self.delay.unwrap_or(base.delay),
            window: self.window.unwrap_or(base.window),
            periodic: self.periodic.unwrap_or(base.periodic),
            replace: self.replace.unwrap_or(base.replace),
            retry_ceiling: self.retry_ceiling.unwrap_or(base.retry_ceiling),
            explicit: ExplicitFields {
                delay: self.delay.is_some(),
                window: self.window.is_some(),
                periodic: self.periodic.is_some(),
                replace: self.replace.is_some(),
                retry_ceiling: self.retry_ceiling.is_some(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_defaults() -> TaskOptions {
        TaskOptions::builder()
            .delay(Duration::from_secs(60))
            .window(Duration::from_secs(10))
            .retry_ceiling(5)
            .build()
    }

    #[test]
    fn default_options_are_immediate_and_unbounded() {
        let options = TaskOptions::default();
        assert_eq!(options.delay(), Duration::ZERO);
        assert_eq!(options.window(), Duration::ZERO);
        assert!(!options.periodic());
        assert!(!options.replace());
        assert_eq!(options.retry_ceiling(), 0);
    }

    #[test]
    fn explicit_overrides_win_over_defaults() {
        let overrides = TaskOptions::builder()
            .delay(Duration::from_secs(960))
            .build();

        let options = TaskOptions::builder()
            .defaults(type_defaults())
            .update(&overrides)
            .build();

        assert_eq!(options.delay(), Duration::from_secs(960));
        assert_eq!(options.window(), Duration::from_secs(10));
        assert_eq!(options.retry_ceiling(), 5);
    }

    #[test]
    fn explicit_zero_still_overrides() {
        let overrides = TaskOptions::builder().delay(Duration::ZERO).build();
        let options = TaskOptions::builder()
            .defaults(type_defaults())
            .update(&overrides)
            .build();
        assert_eq!(options.delay(), Duration::ZERO);
    }

    #[test]
    fn order_of_defaults_and_update_does_not_matter() {
        let overrides = TaskOptions::builder().periodic(true).build();

        let a = TaskOptions::builder()
            .defaults(type_defaults())
            .update(&overrides)
            .build();
        let b = TaskOptions::builder()
            .update(&overrides)
            .defaults(type_defaults())
            .build();

        assert_eq!(a, b);
        assert!(a.periodic());
    }

    #[test]
    fn forced_replace_beats_explicit_false() {
        let overrides = TaskOptions::builder().replace(false).build();
        let options = TaskOptions::builder()
            .defaults(type_defaults())
            .update(&overrides)
            .replace(true)
            .build();
        assert!(options.replace());
    }

    #[test]
    fn defaults_alone_are_not_explicit() {
        let options = TaskOptions::builder().defaults(type_defaults()).build();
        let merged = TaskOptions::builder()
            .retry_ceiling(1)
            .update(&options)
            .build();
        // nothing in `options` was set explicitly, so the ceiling survives
        assert_eq!(merged.retry_ceiling(), 1);
    }
}
