use super::job::{ProcessJob, ProcessOutput};
use super::options::LaunchOptions;
use crate::error::Error;
use crate::outcome::{Failure, Value, Values};
use crate::runtime::{Future, Scheduler};

/// Runs `args` as a child process on a pseudo-terminal.
///
/// The child starts once a job slot is free. Its terminal output is
/// captured and shown in the error log whenever non-empty. On exit status 0
/// the future succeeds with the captured stdout as a `String` (empty unless
/// `options.capture_stdout`), plus the exact bytes under the keyword
/// `"bytes"`. Any other status fails the future with
/// [`Error::ProcessAbort`] carrying the command line and terminal output,
/// after reporting it to the error log.
///
/// # Examples
///
/// ```rust,ignore
/// let out = launch(&sched, ["git", "rev-parse", "HEAD"], LaunchOptions::new().capture_stdout(true));
/// let head = sched.force(&out)?.get::<String>(0);
/// ```
pub fn launch<I, S>(sched: &Scheduler, args: I, options: LaunchOptions) -> Future
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    let command = args.join(" ");

    if let Some(cwd) = &options.cwd {
        tracing::info!("(in {})", cwd.display());
    }
    tracing::info!("{command}");

    let job = sched.launched(move || ProcessJob::start(&args, &options));
    let log = sched.error_log();

    sched.spawn(async move {
        let values = match job.await {
            Ok(values) => values,
            Err(failure) => {
                log.report_failure(&command, &describe(&failure));
                return Err(failure);
            }
        };

        let output = values
            .get::<ProcessOutput>(0)
            .ok_or_else(|| Failure::msg("process job produced no output"))?;

        if !output.stderr.is_empty() {
            log.show(&command, &String::from_utf8_lossy(&output.stderr));
        }

        if output.status != 0 {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            log.report_failure(&command, &stderr);

            return Err(Failure::new(Error::ProcessAbort { command, stderr }));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        Ok::<_, Failure>(Values::of(text).with_named("bytes", Value::new(output.stdout)))
    })
}

/// The failure message followed by its chain of causes.
fn describe(failure: &Failure) -> String {
    let mut text = failure.to_string();
    let mut source = std::error::Error::source(failure.error());

    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }

    text
}
