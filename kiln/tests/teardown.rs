use kiln::{LaunchOptions, Scheduler, launch};

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

fn open_fds() -> usize {
    std::fs::read_dir("/proc/self/fd").unwrap().count()
}

fn read_pid(path: &Path) -> i32 {
    let deadline = Instant::now() + Duration::from_secs(5);

    loop {
        if let Some(pid) = std::fs::read_to_string(path)
            .ok()
            .and_then(|text| text.trim().parse().ok())
        {
            return pid;
        }

        assert!(Instant::now() < deadline, "child never wrote its pid");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn dropping_the_scheduler_reaps_running_children() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pid");

    let sched = Scheduler::builder().concurrency_limit(1).build();

    // Start the multiplexer before counting descriptors.
    let warm = launch(&sched, ["true"], LaunchOptions::new());
    sched.force(&warm).unwrap();
    let before = open_fds();

    let script = format!("echo $$ > '{}'; exec sleep 30", pid_file.display());
    let sleeper = launch(
        &sched,
        ["sh", "-c", script.as_str()],
        LaunchOptions::new().capture_stdout(true),
    );
    assert_eq!(sched.running_jobs(), 1);

    let pid = read_pid(&pid_file);
    let proc_entry = format!("/proc/{pid}");
    assert!(Path::new(&proc_entry).exists());

    let started = Instant::now();
    drop(sleeper);
    drop(sched);

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!Path::new(&proc_entry).exists(), "child {pid} was not reaped");
    assert_eq!(open_fds(), before);
}
