use super::options::LaunchOptions;
use super::spawn;
use crate::error::Error;
use crate::outcome::Values;
use crate::reactor::Multiplexer;
use crate::reactor::io::{Channel, JobIo, Watch, chunked};
use crate::reactor::poller::platform::{exit_code, sys_close, sys_kill, sys_waitpid};
use crate::runtime::Job;

use libc::pid_t;
use std::os::fd::RawFd;
use std::sync::Arc;

/// What a finished child left behind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `128 + signal` when the child was killed by a signal.
    pub status: i32,

    /// Captured stdout; empty unless stdout was captured.
    pub stdout: Vec<u8>,

    /// Everything the child wrote to its terminal.
    pub stderr: Vec<u8>,
}

/// A child process and the streams the multiplexer services for it.
pub(crate) struct ProcessJob {
    pid: pid_t,
    fds: Vec<RawFd>,
    io: Arc<JobIo>,
    command: String,
}

impl ProcessJob {
    /// Forks the child and hands its streams to the multiplexer.
    pub(crate) fn start(args: &[String], options: &LaunchOptions) -> Result<Self, Error> {
        let command = args.join(" ");

        let child = spawn::spawn(args, options).map_err(|source| Error::Spawn {
            command: command.clone(),
            source,
        })?;

        let mut fds = vec![child.pty];
        let mut watches = vec![Watch::Read {
            fd: child.pty,
            channel: Channel::Stderr,
        }];

        if let Some(fd) = child.stdout {
            fds.push(fd);
            watches.push(Watch::Read {
                fd,
                channel: Channel::Stdout,
            });
        }

        if !options.stdin.is_empty() {
            watches.push(Watch::Write {
                fd: child.pty,
                chunks: chunked(&options.stdin, libc::PIPE_BUF),
            });
        }

        let io = Arc::new(JobIo::new(watches.len()));

        if let Err(source) = Multiplexer::global().and_then(|mux| mux.attach(watches, &io)) {
            let _ = sys_kill(child.pid, libc::SIGKILL);
            let _ = sys_waitpid(child.pid);
            for &fd in &fds {
                sys_close(fd);
            }

            return Err(Error::Spawn { command, source });
        }

        tracing::debug!(pid = child.pid, %command, "process started");

        Ok(Self {
            pid: child.pid,
            fds,
            io,
            command,
        })
    }

    fn close_fds(&self) {
        for &fd in &self.fds {
            sys_close(fd);
        }
    }
}

impl Job for ProcessJob {
    fn join(mut self: Box<Self>) -> Result<Values, Error> {
        let status = match sys_waitpid(self.pid) {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(pid = self.pid, error = %err, "waitpid failed");
                self.cancel();
                self.io.wait();
                self.close_fds();
                return Err(Error::Wait {
                    command: self.command.clone(),
                    source: err,
                });
            }
        };

        let (stdout, stderr) = self.io.wait();
        self.close_fds();

        let status = exit_code(status);
        tracing::debug!(pid = self.pid, status, command = %self.command, "process finished");

        Ok(Values::of(ProcessOutput {
            status,
            stdout,
            stderr,
        }))
    }

    fn cancel(&mut self) {
        if let Err(err) = sys_kill(self.pid, libc::SIGTERM) {
            tracing::debug!(pid = self.pid, error = %err, "failed to signal child");
        }
    }
}
