use kiln::{BuildLog, Error, ErrorLog, LaunchOptions, Outcome, Scheduler, launch};

use std::rc::Rc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn scheduler() -> (Scheduler, Rc<BuildLog>) {
    init_tracing();

    let log = Rc::new(BuildLog::new());
    let sched = Scheduler::builder()
        .concurrency_limit(2)
        .error_log(log.clone())
        .build();

    (sched, log)
}

fn captured() -> LaunchOptions {
    LaunchOptions::new().capture_stdout(true)
}

#[test]
fn captures_stdout() {
    let (sched, log) = scheduler();

    let out = launch(&sched, ["echo", "hello"], captured());
    let values = sched.force(&out).unwrap();

    assert_eq!(values.get::<String>(0).unwrap(), "hello\n");
    assert_eq!(
        values.get_named("bytes").unwrap().downcast_ref::<Vec<u8>>(),
        Some(&b"hello\n".to_vec())
    );
    assert!(log.entries().is_empty());
}

#[test]
fn uncaptured_stdout_goes_to_the_log() {
    let (sched, log) = scheduler();

    let out = launch(&sched, ["printf", "chatty"], LaunchOptions::new());
    let values = sched.force(&out).unwrap();

    assert_eq!(values.get::<String>(0).unwrap(), "");

    let entries = log.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "printf chatty");
    assert_eq!(entries[0].message, "chatty");
    assert!(!entries[0].fatal);
}

#[test]
fn non_zero_exit_aborts_the_build() {
    let (sched, log) = scheduler();

    let out = launch(&sched, ["sh", "-c", "printf oops >&2; exit 3"], captured());

    let failure = match sched.wait(&out) {
        Outcome::Failure(failure) => failure,
        Outcome::Success(_) => panic!("expected the command to fail"),
    };

    assert!(failure.is_process_abort());
    match failure.error() {
        Error::ProcessAbort { command, stderr } => {
            assert_eq!(command, "sh -c printf oops >&2; exit 3");
            assert_eq!(stderr, "oops");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(log.is_aborting());
    let fatal: Vec<_> = log.entries().into_iter().filter(|e| e.fatal).collect();
    assert_eq!(fatal.len(), 1);
    assert_eq!(fatal[0].message, "oops");
}

#[test]
fn process_failures_are_not_reported_twice() {
    let (sched, log) = scheduler();

    let out = launch(&sched, ["false"], LaunchOptions::new());

    assert!(sched.force(&out).is_err());
    assert_eq!(log.entries().len(), 1);
}

#[test]
fn missing_program_fails() {
    let (sched, log) = scheduler();

    let out = launch(&sched, ["kiln-test-no-such-program"], captured());

    let failure = sched.force(&out).unwrap_err();
    assert!(failure.is_process_abort());
    assert!(log.is_aborting());
}

#[test]
fn runs_in_the_requested_directory() {
    let (sched, _log) = scheduler();
    let dir = tempfile::tempdir().unwrap();

    let out = launch(
        &sched,
        ["sh", "-c", "pwd -P"],
        captured().cwd(dir.path()),
    );
    let cwd = sched.force(&out).unwrap().get::<String>(0).unwrap();

    assert_eq!(
        cwd.trim_end(),
        dir.path().canonicalize().unwrap().to_str().unwrap()
    );
}

#[test]
fn replaces_the_environment() {
    let (sched, _log) = scheduler();

    let path = std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".into());
    let options = captured().env([("PATH", path.as_str()), ("KILN_MARKER", "42")]);

    let out = launch(
        &sched,
        ["sh", "-c", "printf '%s:%s' \"$KILN_MARKER\" \"${HOME:-unset}\""],
        options,
    );

    assert_eq!(
        sched.force(&out).unwrap().get::<String>(0).unwrap(),
        "42:unset"
    );
}

#[test]
fn feeds_stdin_through_the_terminal() {
    let (sched, _log) = scheduler();

    let out = launch(
        &sched,
        ["sh", "-c", "read line; printf '%s' \"$line\""],
        captured().stdin("ping\n"),
    );

    assert_eq!(sched.force(&out).unwrap().get::<String>(0).unwrap(), "ping");
}

#[test]
fn stdin_larger_than_pipe_buf_arrives_in_order() {
    let (sched, _log) = scheduler();

    let input: String = ['a', 'b', 'c']
        .into_iter()
        .map(|letter| format!("{}\n", letter.to_string().repeat(1999)))
        .collect();
    assert!(input.len() > libc::PIPE_BUF);

    let out = launch(
        &sched,
        ["sh", "-c", "read a; read b; read c; printf '%s\\n' \"$a\" \"$b\" \"$c\""],
        captured().stdin(input.as_str()),
    );

    assert_eq!(sched.force(&out).unwrap().get::<String>(0).unwrap(), input);
}

#[test]
fn results_keep_submission_order_under_a_limit() {
    init_tracing();
    let sched = Scheduler::builder().concurrency_limit(1).build();

    let outs: Vec<_> = (0..4)
        .map(|i| launch(&sched, ["sh", "-c", format!("printf {i}").as_str()], captured()))
        .collect();
    assert_eq!(sched.running_jobs(), 1);
    assert_eq!(sched.queued_jobs(), 3);

    let values = sched.force(&sched.all(&outs)).unwrap();
    let printed: Vec<String> = (0..values.len()).filter_map(|i| values.get(i)).collect();

    assert_eq!(printed, vec!["0", "1", "2", "3"]);
}

#[test]
fn large_output_does_not_deadlock() {
    let (sched, _log) = scheduler();

    let out = launch(
        &sched,
        ["sh", "-c", "head -c 1000000 /dev/zero"],
        captured(),
    );
    let values = sched.force(&out).unwrap();

    let bytes = values.get_named("bytes").unwrap().downcast_ref::<Vec<u8>>().unwrap();
    assert_eq!(bytes.len(), 1_000_000);
}

#[test]
fn multiplexer_restarts_after_shutdown() {
    let (sched, _log) = scheduler();

    let first = launch(&sched, ["echo", "one"], captured());
    sched.force(&first).unwrap();

    kiln::process::shutdown();

    let second = launch(&sched, ["echo", "two"], captured());
    assert_eq!(sched.force(&second).unwrap().get::<String>(0).unwrap(), "two\n");
}
