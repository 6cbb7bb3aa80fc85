use kiln::{BuildLog, Error, ErrorLog, Failure, Job, Scheduler, Values};

use std::cell::RefCell;
use std::rc::Rc;

/// Records what happens to fake jobs, in order.
#[derive(Default)]
struct Tracker {
    events: Vec<String>,
    running: usize,
    peak: usize,
}

impl Tracker {
    fn start(&mut self, id: usize) {
        self.events.push(format!("start {id}"));
        self.running += 1;
        self.peak = self.peak.max(self.running);
    }
}

struct FakeJob {
    id: usize,
    tracker: Rc<RefCell<Tracker>>,
}

impl Job for FakeJob {
    fn join(self: Box<Self>) -> Result<Values, Error> {
        let mut tracker = self.tracker.borrow_mut();
        tracker.events.push(format!("join {}", self.id));
        tracker.running -= 1;

        Ok(Values::of(self.id))
    }

    fn cancel(&mut self) {
        self.tracker
            .borrow_mut()
            .events
            .push(format!("cancel {}", self.id));
    }
}

fn launch_fake(sched: &Scheduler, tracker: &Rc<RefCell<Tracker>>, id: usize) -> kiln::Future {
    let tracker = tracker.clone();

    sched.launched(move || {
        tracker.borrow_mut().start(id);
        Ok(FakeJob { id, tracker })
    })
}

#[test]
fn ready_futures_run_in_fifo_order() {
    let sched = Scheduler::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    let gate = sched.promise();

    let first = gate.future().bind({
        let sched = sched.clone();
        let order = order.clone();
        move |_| {
            order.borrow_mut().push("first");

            // Queued behind `second`, which is already ready.
            for name in ["nested a", "nested b"] {
                let order = order.clone();
                sched.ready(()).bind(move |_| {
                    order.borrow_mut().push(name);
                    Ok(())
                });
            }

            Ok(())
        }
    });

    let second = gate.future().bind({
        let order = order.clone();
        move |_| {
            order.borrow_mut().push("second");
            Ok(())
        }
    });

    gate.satisfy(());

    assert!(first.is_ready());
    assert!(second.is_ready());
    assert_eq!(
        *order.borrow(),
        vec!["first", "second", "nested a", "nested b"]
    );
}

#[test]
fn jobs_beyond_the_limit_are_queued() {
    let sched = Scheduler::builder().concurrency_limit(2).build();
    let tracker = Rc::new(RefCell::new(Tracker::default()));

    let jobs: Vec<_> = (0..3).map(|id| launch_fake(&sched, &tracker, id)).collect();

    assert_eq!(sched.running_jobs(), 2);
    assert_eq!(sched.queued_jobs(), 1);
    assert_eq!(tracker.borrow().events, vec!["start 0", "start 1"]);

    let all = sched.all(&jobs);
    let values = sched.wait(&all).into_result().unwrap();

    let ids: Vec<usize> = (0..values.len()).filter_map(|i| values.get(i)).collect();
    assert_eq!(ids, vec![0, 1, 2]);

    let tracker = tracker.borrow();
    assert_eq!(
        tracker.events,
        vec!["start 0", "start 1", "join 0", "start 2", "join 1", "join 2"]
    );
    assert_eq!(tracker.peak, 2);
    assert_eq!(sched.running_jobs(), 0);
    assert_eq!(sched.queued_jobs(), 0);
}

#[test]
fn failing_factory_fails_its_future() {
    let sched = Scheduler::new();

    let job = sched.launched(|| Err::<FakeJob, _>(Error::msg("no such tool")));

    assert!(job.is_ready());
    assert_eq!(job.explode().unwrap_err().to_string(), "no such tool");
    assert_eq!(sched.running_jobs(), 0);
}

#[test]
fn queued_factory_failure_fails_its_future() {
    let sched = Scheduler::builder().concurrency_limit(1).build();
    let tracker = Rc::new(RefCell::new(Tracker::default()));

    let running = launch_fake(&sched, &tracker, 0);
    let broken = sched.launched(|| Err::<FakeJob, _>(Error::msg("refused")));
    assert_eq!(sched.queued_jobs(), 1);

    let outcome = sched.wait(&broken);

    assert!(running.is_ready());
    assert_eq!(outcome.explode().unwrap_err().to_string(), "refused");
}

#[test]
fn waiting_on_a_done_future_leaves_jobs_alone() {
    let sched = Scheduler::new();
    let tracker = Rc::new(RefCell::new(Tracker::default()));

    let _job = launch_fake(&sched, &tracker, 0);
    let answer = sched.wait(&sched.ready(42i32));

    assert_eq!(answer.get::<i32>().unwrap(), 42);
    assert_eq!(sched.running_jobs(), 1);
    assert_eq!(tracker.borrow().events, vec!["start 0"]);
}

#[test]
#[should_panic(expected = "can never be satisfied")]
fn waiting_on_an_orphaned_promise_panics() {
    let sched = Scheduler::new();

    let promise = sched.promise();
    sched.wait(&promise.future());
}

#[test]
fn force_reports_uncaught_failures() {
    let log = Rc::new(BuildLog::new());
    let sched = Scheduler::builder().error_log(log.clone()).build();

    let failed = sched.failed(Failure::msg("boom"));

    assert!(sched.force(&failed).is_err());
    assert!(log.is_aborting());

    let entries = log.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "uncaught failure");
    assert!(entries[0].fatal);
    assert!(entries[0].message.contains("boom"));
}

#[test]
fn force_returns_values_without_logging() {
    let log = Rc::new(BuildLog::new());
    let sched = Scheduler::builder().error_log(log.clone()).build();

    let values = sched.force(&sched.ready("fine")).unwrap();

    assert_eq!(values.get::<&str>(0), Some("fine"));
    assert!(log.entries().is_empty());
    assert!(!log.is_aborting());
}

#[test]
fn shutdown_cancels_running_jobs() {
    let sched = Scheduler::builder().concurrency_limit(1).build();
    let tracker = Rc::new(RefCell::new(Tracker::default()));

    let job = launch_fake(&sched, &tracker, 0);
    let _queued = launch_fake(&sched, &tracker, 1);

    sched.shutdown();
    assert_eq!(tracker.borrow().events, vec!["start 0", "cancel 0"]);

    // Cancelled jobs are still joined.
    assert_eq!(sched.wait(&job).get::<usize>().unwrap(), 0);
}

#[test]
fn dropping_the_scheduler_cancels_and_joins_running_jobs() {
    let tracker = Rc::new(RefCell::new(Tracker::default()));

    {
        let sched = Scheduler::new();
        let _job = launch_fake(&sched, &tracker, 7);
    }

    assert_eq!(
        tracker.borrow().events,
        vec!["start 7", "cancel 7", "join 7"]
    );
    assert_eq!(tracker.borrow().running, 0);
}

#[test]
fn continuations_may_launch_jobs() {
    let sched = Scheduler::builder().concurrency_limit(1).build();
    let tracker = Rc::new(RefCell::new(Tracker::default()));

    let first = launch_fake(&sched, &tracker, 0);
    let second = first.bind({
        let sched = sched.clone();
        let tracker = tracker.clone();
        move |_| Ok(launch_fake(&sched, &tracker, 1))
    });

    assert_eq!(sched.wait(&second).get::<usize>().unwrap(), 1);
    assert_eq!(
        tracker.borrow().events,
        vec!["start 0", "join 0", "start 1", "join 1"]
    );
}
