pub use main_type::{Evertick, EvertickBuilder};

mod main_type {
    use std::{
        panic::{self, AssertUnwindSafe},
        sync::{Arc, Mutex, MutexGuard, PoisonError},
        time::Duration,
    };

    use crate::{
        config::DispatchConfig,
        errors::EvertickError,
        logging::{DispatchLog, FacadeLog, LogLevel},
        timer::{WaitStatus, WaitTimer},
    };

    use super::schedule::{Schedule, Task};

    /// Configures and builds an [`Evertick`]. The timer handle is the one
    /// mandatory dependency; the logger defaults to the `log` facade.
    pub struct EvertickBuilder {
        timer: Option<WaitTimer>,
        logger: Option<Arc<dyn DispatchLog>>,
        config: DispatchConfig,
    }

    impl EvertickBuilder {
        pub fn with_timer(&mut self, timer: WaitTimer) -> &mut Self {
            self.timer = Some(timer);
            self
        }

        pub fn with_logger(&mut self, logger: impl DispatchLog + 'static) -> &mut Self {
            self.logger = Some(Arc::new(logger));
            self
        }

        pub fn build(&mut self) -> Result<Evertick, EvertickError> {
            let Some(timer) = self.timer.take() else {
                return Err(EvertickError::BuildErrorNoTimerSet);
            };
            let logger = self.logger.take().unwrap_or_else(|| Arc::new(FacadeLog));
            Ok(Evertick {
                inner: Arc::new(EvertickInner {
                    schedule: Mutex::new(Schedule::new()),
                    timer,
                    logger,
                    offload_firing: self.config.is_firing_offloaded(),
                }),
            })
        }
    }

    /// Dispatcher that multiplexes any number of recurring tasks onto one
    /// armed timer wait.
    ///
    /// Tasks are registered under an integer period in seconds; tasks sharing
    /// a period form a bucket and fire together, in registration order. The
    /// dispatcher keeps a single wait armed for the next due period, re-arms
    /// after every firing pass, and goes idle when the schedule drains.
    /// Registering into an idle dispatcher arms it again.
    ///
    /// Cloning is cheap; clones share the schedule. When the last clone is
    /// dropped the outstanding wait is cancelled.
    ///
    /// ### Example
    /// ```no_run
    /// use evertick::{DispatchConfig, Evertick, TimerReactor};
    ///
    /// let reactor = TimerReactor::start();
    /// let clock = Evertick::new(DispatchConfig::default())
    ///     .with_timer(reactor.timer())
    ///     .build()
    ///     .unwrap();
    ///
    /// clock.add_task(5, || println!("every five seconds"));
    /// ```
    pub struct Evertick {
        inner: Arc<EvertickInner>,
    }

    impl Clone for Evertick {
        fn clone(&self) -> Self {
            Self {
                inner: self.inner.clone(),
            }
        }
    }

    struct EvertickInner {
        schedule: Mutex<Schedule>,
        timer: WaitTimer,
        logger: Arc<dyn DispatchLog>,
        offload_firing: bool,
    }

    impl Evertick {
        /// Creates a new [`EvertickBuilder`].
        ///
        /// ### Example
        /// ```no_run
        /// use evertick::{DispatchConfig, Evertick, StderrLog, LogLevel, TimerReactor};
        ///
        /// let reactor = TimerReactor::start();
        /// let clock = Evertick::new(DispatchConfig::new().offload_firing(true))
        ///     .with_timer(reactor.timer())
        ///     .with_logger(StderrLog::new(LogLevel::Info))
        ///     .build()
        ///     .unwrap();
        /// ```
        pub fn new(config: DispatchConfig) -> EvertickBuilder {
            EvertickBuilder {
                timer: None,
                logger: None,
                config,
            }
        }

        /// Registers `task` to fire every `period_secs` seconds, appended to
        /// the bucket already registered at that period if there is one.
        ///
        /// When the dispatcher is idle this arms a wait for the smallest
        /// period in the schedule. When it is already armed the outstanding
        /// wait is left alone, so a task added at a period smaller than the
        /// armed target first fires after the armed expiry, not before it.
        ///
        /// Tasks run on the expiry-delivery thread unless
        /// [`DispatchConfig::offload_firing`] is set; a slow task delays
        /// every later expiry. A period of 0 is not rejected and produces an
        /// immediate-expiry cycle.
        pub fn add_task(&self, period_secs: u64, task: impl Fn() + Send + Sync + 'static) {
            let mut schedule = self.inner.lock_schedule();
            schedule.insert(period_secs, Arc::new(task));
            self.inner.logger.log(
                LogLevel::Debug,
                format_args!("registered a task at period {period_secs}s"),
            );
            if !schedule.is_armed() {
                // Arm while the lock is held: two callers must never both
                // observe the idle state and arm competing waits.
                if let Some(first) = schedule.first_period() {
                    schedule.set_armed(true);
                    EvertickInner::arm(&self.inner, first, first);
                }
            }
        }

        /// Discards the whole bucket registered at `period_secs`, however
        /// many tasks it holds. Single tasks are not individually removable.
        /// Removing an absent period is a silent no-op.
        ///
        /// The armed wait is not disturbed: if it was targeting this period
        /// it still fires at the scheduled instant, finds nothing to run,
        /// and re-arms for whatever is due next.
        pub fn remove_bucket(&self, period_secs: u64) {
            let mut schedule = self.inner.lock_schedule();
            if schedule.remove_bucket(period_secs) {
                self.inner.logger.log(
                    LogLevel::Debug,
                    format_args!("removed the bucket at period {period_secs}s"),
                );
            }
        }

        /// True while a timer wait is outstanding.
        pub fn is_armed(&self) -> bool {
            self.inner.lock_schedule().is_armed()
        }

        /// Number of distinct periods currently registered.
        pub fn bucket_count(&self) -> usize {
            self.inner.lock_schedule().bucket_count()
        }
    }

    impl EvertickInner {
        fn lock_schedule(&self) -> MutexGuard<'_, Schedule> {
            self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Arms the shared wait slot for `target`. Callers hold the schedule
        /// lock; the arm itself is a channel send and never re-takes it.
        fn arm(inner: &Arc<Self>, target: u64, wait_secs: u64) {
            let weak = Arc::downgrade(inner);
            let armed = inner
                .timer
                .arm_for(Duration::from_secs(wait_secs), move |status| {
                    if let Some(inner) = weak.upgrade() {
                        EvertickInner::firing_pass(&inner, target, status);
                    }
                });
            match armed {
                Ok(()) => inner.logger.log(
                    LogLevel::Debug,
                    format_args!("armed a {wait_secs}s wait for period {target}s"),
                ),
                Err(e) => inner.logger.log(
                    LogLevel::Fault,
                    format_args!("could not arm for period {target}s: {e}"),
                ),
            }
        }

        /// One firing pass: decide and perform the re-arm first, then run the
        /// due bucket in registration order. The bucket's tasks are cloned
        /// out and the lock released before they run, so a task may register
        /// or remove buckets itself.
        fn firing_pass(inner: &Arc<Self>, fired: u64, status: WaitStatus) {
            match status {
                WaitStatus::Expired => {}
                WaitStatus::Cancelled => {
                    // Terminal, expected on shutdown. Going back to idle lets
                    // a later add_task resurrect the dispatcher.
                    inner.lock_schedule().set_armed(false);
                    inner.logger.log(
                        LogLevel::Debug,
                        format_args!("wait for period {fired}s cancelled"),
                    );
                    return;
                }
                WaitStatus::Failed => {
                    inner.logger.log(
                        LogLevel::Fault,
                        format_args!("wait for period {fired}s failed, re-arming"),
                    );
                    let mut schedule = inner.lock_schedule();
                    Self::rearm_after(inner, &mut schedule, fired);
                    return;
                }
            }

            let tasks = {
                let mut schedule = inner.lock_schedule();
                Self::rearm_after(inner, &mut schedule, fired);
                schedule.bucket_tasks(fired)
            };
            for task in tasks {
                inner.run_task(fired, task);
            }
        }

        fn rearm_after(inner: &Arc<Self>, schedule: &mut Schedule, fired: u64) {
            match schedule.next_target(fired) {
                Some((target, wait_secs)) => {
                    schedule.set_armed(true);
                    Self::arm(inner, target, wait_secs);
                }
                None => {
                    schedule.set_armed(false);
                    inner
                        .logger
                        .log(LogLevel::Info, format_args!("schedule drained, going idle"));
                }
            }
        }

        fn run_task(&self, fired: u64, task: Task) {
            if self.offload_firing {
                let logger = self.logger.clone();
                rayon::spawn(move || {
                    if panic::catch_unwind(AssertUnwindSafe(|| task())).is_err() {
                        logger.log(
                            LogLevel::Fault,
                            format_args!("a task at period {fired}s panicked"),
                        );
                    }
                });
            } else if panic::catch_unwind(AssertUnwindSafe(|| task())).is_err() {
                self.logger.log(
                    LogLevel::Fault,
                    format_args!("a task at period {fired}s panicked"),
                );
            }
        }
    }

    impl Drop for EvertickInner {
        fn drop(&mut self) {
            self.timer.cancel_if_armed();
        }
    }
}

mod schedule {
    use std::{collections::BTreeMap, ops::Bound, sync::Arc};

    pub type Task = Arc<dyn Fn() + Send + Sync + 'static>;

    /// Ordered period -> bucket mapping plus the armed/idle flag. Both sit
    /// behind one mutex in the dispatcher; every key present holds at least
    /// one task, and bucket vectors keep registration order.
    pub struct Schedule {
        buckets: BTreeMap<u64, Vec<Task>>,
        armed: bool,
    }

    impl Schedule {
        pub fn new() -> Self {
            Self {
                buckets: BTreeMap::new(),
                armed: false,
            }
        }

        pub fn insert(&mut self, period_secs: u64, task: Task) {
            self.buckets.entry(period_secs).or_default().push(task);
        }

        /// True when the bucket existed.
        pub fn remove_bucket(&mut self, period_secs: u64) -> bool {
            self.buckets.remove(&period_secs).is_some()
        }

        pub fn first_period(&self) -> Option<u64> {
            self.buckets.keys().next().copied()
        }

        /// Re-arm rule of the firing pass: the smallest period strictly
        /// greater than `fired` is waited for by the difference; when `fired`
        /// was the maximum the cycle wraps to the smallest key and waits its
        /// raw value (the pattern restarts from zero rather than preserving
        /// each bucket's own phase). `None` means the schedule is drained.
        pub fn next_target(&self, fired: u64) -> Option<(u64, u64)> {
            let above = self
                .buckets
                .range((Bound::Excluded(fired), Bound::Unbounded))
                .next();
            match above {
                Some((&next, _)) => Some((next, next - fired)),
                None => self.first_period().map(|first| (first, first)),
            }
        }

        /// Clones the bucket's tasks out so they can run after the lock is
        /// released. Empty when the bucket was removed while its wait was
        /// armed (the documented no-op firing).
        pub fn bucket_tasks(&self, period_secs: u64) -> Vec<Task> {
            self.buckets.get(&period_secs).cloned().unwrap_or_default()
        }

        pub fn bucket_count(&self) -> usize {
            self.buckets.len()
        }

        pub fn is_armed(&self) -> bool {
            self.armed
        }

        pub fn set_armed(&mut self, armed: bool) {
            self.armed = armed;
        }
    }
}
