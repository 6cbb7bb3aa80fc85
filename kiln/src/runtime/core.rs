use super::builder::SchedulerBuilder;
use super::future::{Future, Promise};
use super::job::{Job, JobFactory, JobQueue};
use super::task::{Step, Task};
use crate::error::Error;
use crate::log::ErrorLog;
use crate::outcome::{Failure, Outcome, Values};
use crate::utils::Slab;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::rc::Rc;

/// Lifecycle of a future inside the arena.
///
/// Transitions are monotonic: `Pending -> Ready -> Done`. A `Done` node
/// never changes again and its successor list has been drained.
pub(crate) enum State {
    /// Waiting on this many unresolved dependencies (always at least one).
    Pending(usize),

    /// All dependencies resolved; queued but its task has not run yet.
    Ready,

    /// Terminal.
    Done(Outcome),
}

/// One future in the arena.
pub(crate) struct Node {
    state: State,

    /// Arena indices of futures waiting on this one.
    successors: Vec<usize>,

    /// Work to run once the node becomes ready. `None` while a promise is
    /// unsatisfied and after the node is done.
    task: Option<Task>,

    /// Number of live [`Future`] handles.
    handles: usize,
}

impl Node {
    fn new(state: State, task: Option<Task>) -> Self {
        Self {
            state,
            successors: Vec::new(),
            task,
            handles: 0,
        }
    }

    fn is_done(&self) -> bool {
        matches!(self.state, State::Done(_))
    }
}

/// Shared scheduler state.
///
/// Only the thread that built the scheduler ever touches it; completions
/// from the I/O thread come back through `Job::join`, which runs here.
pub(crate) struct Inner {
    arena: RefCell<Slab<Node>>,

    /// FIFO of arena indices whose nodes are `Ready`.
    ready: RefCell<VecDeque<usize>>,

    /// Re-entrancy depth of the drain loop.
    draining: Cell<usize>,

    jobs: RefCell<JobQueue>,

    pub(crate) concurrency_limit: usize,

    pub(crate) log: Rc<dyn ErrorLog>,
}

/// Decrements the drain depth when the loop exits, including by unwinding.
struct DrainGuard<'a>(&'a Cell<usize>);

impl<'a> DrainGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self(depth)
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

impl Inner {
    fn with_node<R>(&self, id: usize, f: impl FnOnce(&mut Node) -> R) -> R {
        let mut arena = self.arena.borrow_mut();
        let node = arena
            .get_mut(id)
            .unwrap_or_else(|| panic!("future #{id} is not in the arena"));

        f(node)
    }

    pub(crate) fn retain(&self, id: usize) {
        self.with_node(id, |node| node.handles += 1);
    }

    /// Drops one handle; frees the node once it is done and unreferenced.
    pub(crate) fn release(&self, id: usize) {
        let removed = {
            let mut arena = self.arena.borrow_mut();
            let Some(node) = arena.get_mut(id) else {
                return;
            };

            node.handles -= 1;
            if node.handles == 0 && node.is_done() {
                Some(arena.remove(id))
            } else {
                None
            }
        };

        // Outside the borrow: the outcome may hold handles of its own.
        drop(removed);
    }

    fn node<R>(&self, id: usize, f: impl FnOnce(&Node) -> R) -> R {
        let arena = self.arena.borrow();
        let node = arena
            .get(id)
            .unwrap_or_else(|| panic!("future #{id} is not in the arena"));

        f(node)
    }

    pub(crate) fn is_done(&self, id: usize) -> bool {
        self.node(id, Node::is_done)
    }

    pub(crate) fn outcome(&self, id: usize) -> Option<Outcome> {
        self.node(id, |node| match &node.state {
            State::Done(outcome) => Some(outcome.clone()),
            _ => None,
        })
    }

    pub(crate) fn is_unsatisfied(&self, id: usize) -> bool {
        self.node(id, |node| {
            node.task.is_none() && matches!(node.state, State::Pending(_))
        })
    }

    pub(crate) fn arena_len(&self) -> usize {
        self.arena.borrow().len()
    }

    /// Registers `successor` on `dependency`.
    ///
    /// Returns `false` if the dependency is already done, in which case
    /// nothing is registered.
    fn add_successor(&self, dependency: usize, successor: usize) -> bool {
        self.with_node(dependency, |node| {
            if node.is_done() {
                false
            } else {
                node.successors.push(successor);
                true
            }
        })
    }

    fn register(&self, id: usize, task: &Task) -> usize {
        task.dependencies()
            .into_iter()
            .filter(|&dependency| self.add_successor(dependency, id))
            .count()
    }

    /// Inserts an already-terminal future. No scheduling happens.
    pub(crate) fn done(self: &Rc<Self>, outcome: Outcome) -> Future {
        let id = self
            .arena
            .borrow_mut()
            .insert(Node::new(State::Done(outcome), None));

        Future::attach(self, id)
    }

    /// Inserts an unsatisfied promise: pending on one external token.
    pub(crate) fn promise(self: &Rc<Self>) -> Future {
        let id = self
            .arena
            .borrow_mut()
            .insert(Node::new(State::Pending(1), None));

        Future::attach(self, id)
    }

    /// Inserts a future running `task` once its dependencies resolve.
    pub(crate) fn fresh(self: &Rc<Self>, task: Task) -> Future {
        let id = self
            .arena
            .borrow_mut()
            .insert(Node::new(State::Pending(0), None));
        let future = Future::attach(self, id);

        let pending = self.register(id, &task);

        self.with_node(id, |node| {
            node.task = Some(task);
            node.state = if pending == 0 {
                State::Ready
            } else {
                State::Pending(pending)
            };
        });

        if pending == 0 {
            self.submit_ready(id);
        }

        future
    }

    /// Points an unsatisfied promise at `source`.
    ///
    /// # Panics
    ///
    /// Panics if the promise was already satisfied.
    pub(crate) fn satisfy_promise(self: &Rc<Self>, id: usize, source: Future) {
        let source_id = source.id();

        assert!(self.is_unsatisfied(id), "promise #{id} satisfied twice");
        self.with_node(id, |node| node.task = Some(Task::Forward(source)));

        let waits = usize::from(self.add_successor(source_id, id));

        let ready = self.with_node(id, |node| {
            let State::Pending(tokens) = node.state else {
                unreachable!("unsatisfied promise is always pending");
            };

            // Trade the external token for the dependency on `source`.
            let tokens = tokens + waits - 1;
            node.state = if tokens == 0 {
                State::Ready
            } else {
                State::Pending(tokens)
            };

            tokens == 0
        });

        if ready {
            self.submit_ready(id);
        }
    }

    /// Appends a ready node to the queue and drains if nobody else is.
    pub(crate) fn submit_ready(self: &Rc<Self>, id: usize) {
        self.ready.borrow_mut().push_back(id);
        self.progress();
    }

    /// Drains the ready-queue unless a drain is already running further
    /// up the stack.
    pub(crate) fn progress(self: &Rc<Self>) {
        if self.draining.get() > 0 {
            return;
        }

        self.drain();
    }

    /// Runs ready nodes in FIFO order until the queue is empty.
    fn drain(self: &Rc<Self>) {
        let _guard = DrainGuard::enter(&self.draining);

        loop {
            let next = self.ready.borrow_mut().pop_front();
            let Some(id) = next else {
                break;
            };

            self.fire(id);
        }
    }

    /// Runs a ready node's task to its next suspension point or to completion.
    fn fire(self: &Rc<Self>, id: usize) {
        let task = self.with_node(id, |node| node.task.take());
        let mut task = task.unwrap_or_else(|| panic!("ready future #{id} has no task"));

        let scheduler = Scheduler {
            inner: self.clone(),
        };

        loop {
            match task.fire(&scheduler) {
                Step::Done(outcome) => {
                    self.enter_done(id, outcome);
                    return;
                }
                Step::Await(next) => {
                    let pending = self.register(id, &next);
                    if pending == 0 {
                        // Everything it waits on is already done: keep going.
                        task = next;
                        continue;
                    }

                    self.with_node(id, |node| {
                        node.task = Some(next);
                        node.state = State::Pending(pending);
                    });
                    return;
                }
            }
        }
    }

    fn enter_done(self: &Rc<Self>, id: usize, outcome: Outcome) {
        let (successors, orphaned) = self.with_node(id, |node| {
            node.state = State::Done(outcome);
            (mem::take(&mut node.successors), node.handles == 0)
        });

        for successor in successors {
            self.resolve_dependency(successor);
        }

        if orphaned {
            let node = self.arena.borrow_mut().remove(id);
            drop(node);
        }

        self.progress();
    }

    /// One dependency of `id` became done.
    fn resolve_dependency(&self, id: usize) {
        let ready = self.with_node(id, |node| {
            let remaining = match node.state {
                State::Pending(n) => n - 1,
                _ => unreachable!("successor #{id} is not pending"),
            };

            node.state = if remaining == 0 {
                State::Ready
            } else {
                State::Pending(remaining)
            };

            remaining == 0
        });

        if ready {
            self.ready.borrow_mut().push_back(id);
        }
    }

    /// Starts queued jobs while running slots are free.
    ///
    /// Jobs whose factory fails are collected into `settled` together with
    /// the failure their promise must receive.
    fn refill(&self, settled: &mut Vec<(Promise, Outcome)>) {
        loop {
            let next = {
                let mut jobs = self.jobs.borrow_mut();
                if jobs.running.len() >= self.concurrency_limit {
                    None
                } else {
                    jobs.queued.pop_front()
                }
            };

            let Some((factory, promise)) = next else {
                break;
            };

            match factory() {
                Ok(job) => self.jobs.borrow_mut().running.push_back((job, promise)),
                Err(err) => {
                    tracing::debug!(error = %err, "queued job failed to start");
                    settled.push((promise, Outcome::failure(err)));
                }
            }
        }
    }

    /// Blocks on the oldest running job and hands its result to its promise.
    ///
    /// Returns `false` if there was no job to join.
    fn join_oldest(self: &Rc<Self>) -> bool {
        let mut settled = Vec::new();
        self.refill(&mut settled);

        let next = self.jobs.borrow_mut().running.pop_front();

        if let Some((job, promise)) = next {
            tracing::trace!("joining oldest running job");

            let outcome = match job.join() {
                Ok(values) => Outcome::Success(values),
                Err(err) => Outcome::Failure(Failure::new(err)),
            };

            settled.insert(0, (promise, outcome));
            self.refill(&mut settled);
        }

        let progressed = !settled.is_empty();
        for (promise, outcome) in settled {
            promise.satisfy(outcome);
        }

        progressed
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let jobs = self.jobs.get_mut();
        jobs.cancel_running();

        // Cancelled jobs are still joined so no child outlives the scheduler.
        for (job, _promise) in jobs.running.drain(..) {
            if let Err(err) = job.join() {
                tracing::debug!(error = %err, "cancelled job failed while joining");
            }
        }
    }
}

/// The cooperative reactor driving every future.
///
/// A `Scheduler` is a cheap handle: clones share the same ready-queue,
/// job window and future arena. It is single-threaded by construction
/// (`!Send`); real parallelism only happens inside [`Job`]s.
///
/// # Examples
///
/// ```rust,ignore
/// let sched = Scheduler::builder().concurrency_limit(4).build();
///
/// let a = sched.ready(1i32);
/// let b = a.bind(|values| Ok(Values::of(values.get::<i32>(0).unwrap_or(0) + 1)));
///
/// assert_eq!(sched.wait(&b).get::<i32>().unwrap(), 2);
/// ```
#[derive(Clone)]
pub struct Scheduler {
    pub(crate) inner: Rc<Inner>,
}

impl Scheduler {
    /// Creates a scheduler with the default configuration.
    pub fn new() -> Self {
        SchedulerBuilder::new().build()
    }

    /// Returns a builder for configuring a scheduler.
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(crate) fn with_config(concurrency_limit: usize, log: Rc<dyn ErrorLog>) -> Self {
        let inner = Inner {
            arena: RefCell::new(Slab::new(64)),
            ready: RefCell::new(VecDeque::new()),
            draining: Cell::new(0),
            jobs: RefCell::new(JobQueue::default()),
            concurrency_limit,
            log,
        };

        Self {
            inner: Rc::new(inner),
        }
    }

    /// Maximum number of jobs running at once.
    pub fn concurrency_limit(&self) -> usize {
        self.inner.concurrency_limit
    }

    /// The error log failures are reported to.
    pub fn error_log(&self) -> Rc<dyn ErrorLog> {
        self.inner.log.clone()
    }

    /// Number of started, not yet joined jobs.
    pub fn running_jobs(&self) -> usize {
        self.inner.jobs.borrow().running.len()
    }

    /// Number of jobs waiting for a running slot.
    pub fn queued_jobs(&self) -> usize {
        self.inner.jobs.borrow().queued.len()
    }

    /// Number of futures currently held in the arena.
    pub fn live_futures(&self) -> usize {
        self.inner.arena_len()
    }

    /// Runs every ready future without blocking.
    ///
    /// A no-op when called while the scheduler is already draining.
    pub fn progress(&self) {
        self.inner.progress();
    }

    /// Drives the scheduler until `target` is done and returns its outcome.
    ///
    /// Ready futures are run first; when none remain, the calling thread
    /// blocks on the oldest running job.
    ///
    /// # Panics
    ///
    /// Panics if `target` can never complete: nothing is ready, no job is
    /// running and `target` is still pending.
    pub fn wait(&self, target: &Future) -> Outcome {
        let inner = &self.inner;

        loop {
            if let Some(outcome) = target.try_outcome() {
                return outcome;
            }

            inner.drain();

            if let Some(outcome) = target.try_outcome() {
                return outcome;
            }

            if !inner.join_oldest() {
                panic!("wait() on a future that can never be satisfied");
            }
        }
    }

    /// Waits for `target` and unpacks its values.
    ///
    /// Application failures surfacing here are reported to the error log,
    /// which marks the run as aborting. Process failures were reported when
    /// they happened and are not logged twice.
    pub fn force(&self, target: &Future) -> Result<Values, Failure> {
        let outcome = self.wait(target);

        if let Outcome::Failure(failure) = &outcome {
            if !failure.error().is_reported() {
                self.inner
                    .log
                    .report_failure("uncaught failure", &format!("{:#}", failure.error()));
            }
        }

        outcome.into_result()
    }

    /// Submits a job produced by `factory`.
    ///
    /// If fewer than `concurrency_limit` jobs are running the factory runs
    /// right away; otherwise it is queued and started, in submission order,
    /// when a running job is joined. The returned future resolves to the
    /// job's result, or to the factory's error if it could not start.
    pub fn launched<F, J>(&self, factory: F) -> Future
    where
        F: FnOnce() -> Result<J, Error> + 'static,
        J: Job + 'static,
    {
        let promise = self.promise();
        let future = promise.future();

        let factory: JobFactory =
            Box::new(move || factory().map(|job| Box::new(job) as Box<dyn Job>));

        let start_now = {
            let jobs = self.inner.jobs.borrow();
            jobs.queued.is_empty() && jobs.running.len() < self.inner.concurrency_limit
        };

        if start_now {
            match factory() {
                Ok(job) => self.inner.jobs.borrow_mut().running.push_back((job, promise)),
                Err(err) => promise.satisfy(Outcome::failure(err)),
            }
        } else {
            self.inner
                .jobs
                .borrow_mut()
                .queued
                .push_back((factory, promise));
        }

        tracing::debug!(
            running = self.running_jobs(),
            queued = self.queued_jobs(),
            "job submitted"
        );

        future
    }

    /// Cancels every running job.
    ///
    /// Cancelled jobs stay in the window: waiting on their futures still
    /// joins them. Also runs when the last scheduler handle is dropped.
    pub fn shutdown(&self) {
        self.inner.jobs.borrow_mut().cancel_running();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("concurrency_limit", &self.inner.concurrency_limit)
            .field("live_futures", &self.live_futures())
            .field("ready", &self.inner.ready.borrow().len())
            .field("running_jobs", &self.running_jobs())
            .field("queued_jobs", &self.queued_jobs())
            .finish()
    }
}
