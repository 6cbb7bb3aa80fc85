use super::options::LaunchOptions;
use crate::reactor::poller::platform::{
    sys_close, sys_kill, sys_pipe, sys_set_nonblocking, sys_waitpid,
};

use libc::{c_char, c_int, c_uint, pid_t};
use std::ffi::CString;
use std::io;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::ptr;

/// Exit code of a child that could not exec.
const EXEC_FAILED: c_int = 127;

/// A forked child attached to a pseudo-terminal.
pub(crate) struct Child {
    pub(crate) pid: pid_t,

    /// Master side of the child's terminal. Non-blocking.
    pub(crate) pty: RawFd,

    /// Read side of the stdout pipe, when stdout is captured. Non-blocking.
    pub(crate) stdout: Option<RawFd>,
}

fn cstring(bytes: impl Into<Vec<u8>>) -> io::Result<CString> {
    CString::new(bytes).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "argument contains a NUL byte")
    })
}

fn pointers(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(ptr::null()))
        .collect()
}

/// Everything the child needs, allocated before forking.
struct Exec {
    argv: Vec<CString>,
    envp: Option<Vec<CString>>,
    cwd: Option<CString>,
}

impl Exec {
    fn new(args: &[String], options: &LaunchOptions) -> io::Result<Self> {
        if args.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty command line",
            ));
        }

        let argv = args
            .iter()
            .map(|arg| cstring(arg.as_bytes()))
            .collect::<io::Result<Vec<_>>>()?;

        let envp = options
            .env
            .as_ref()
            .map(|env| {
                env.iter()
                    .map(|(key, value)| cstring(format!("{key}={value}")))
                    .collect::<io::Result<Vec<_>>>()
            })
            .transpose()?;

        let cwd = options
            .cwd
            .as_ref()
            .map(|dir| cstring(dir.as_os_str().as_bytes()))
            .transpose()?;

        Ok(Self { argv, envp, cwd })
    }
}

/// Highest descriptor number the child bothers closing.
fn open_max() -> c_int {
    let max = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    if max < 0 { 1024 } else { max.min(65536) as c_int }
}

/// Body of the forked child. Only async-signal-safe calls from here on.
unsafe fn exec_child(
    argv: &[*const c_char],
    envp: Option<&[*const c_char]>,
    cwd: Option<&CString>,
    stdout: Option<RawFd>,
    open_max: c_int,
) -> ! {
    unsafe {
        if let Some(fd) = stdout {
            if libc::dup2(fd, 1) < 0 {
                libc::_exit(EXEC_FAILED);
            }
        }

        // Everything above stderr goes, including the pipe itself.
        let closed = libc::syscall(libc::SYS_close_range, 3 as c_uint, c_uint::MAX, 0 as c_uint);
        if closed != 0 {
            for fd in 3..open_max {
                libc::close(fd);
            }
        }

        if let Some(dir) = cwd {
            if libc::chdir(dir.as_ptr()) < 0 {
                libc::_exit(EXEC_FAILED);
            }
        }

        match envp {
            Some(envp) => libc::execvpe(argv[0], argv.as_ptr(), envp.as_ptr()),
            None => libc::execvp(argv[0], argv.as_ptr()),
        };

        libc::_exit(EXEC_FAILED)
    }
}

/// Forks `args` onto a fresh pseudo-terminal.
///
/// The child's stdin, stdout and stderr are the terminal, except stdout
/// goes to a pipe when `options.capture_stdout` is set.
pub(crate) fn spawn(args: &[String], options: &LaunchOptions) -> io::Result<Child> {
    let exec = Exec::new(args, options)?;
    let argv = pointers(&exec.argv);
    let envp = exec.envp.as_deref().map(pointers);
    let open_max = open_max();

    let pipe = if options.capture_stdout {
        let (read, write) = sys_pipe()?;

        if let Err(err) = sys_set_nonblocking(read) {
            sys_close(read);
            sys_close(write);
            return Err(err);
        }

        Some((read, write))
    } else {
        None
    };

    let mut master: c_int = -1;
    let pid = unsafe {
        libc::forkpty(
            &mut master,
            ptr::null_mut(),
            ptr::null_mut(),
            ptr::null_mut(),
        )
    };

    if pid < 0 {
        let err = io::Error::last_os_error();
        if let Some((read, write)) = pipe {
            sys_close(read);
            sys_close(write);
        }
        return Err(err);
    }

    if pid == 0 {
        unsafe {
            exec_child(
                &argv,
                envp.as_deref(),
                exec.cwd.as_ref(),
                pipe.map(|(_, write)| write),
                open_max,
            )
        }
    }

    let stdout = pipe.map(|(read, write)| {
        sys_close(write);
        read
    });

    if let Err(err) = sys_set_nonblocking(master) {
        let _ = sys_kill(pid, libc::SIGKILL);
        let _ = sys_waitpid(pid);
        sys_close(master);
        if let Some(fd) = stdout {
            sys_close(fd);
        }
        return Err(err);
    }

    Ok(Child {
        pid,
        pty: master,
        stdout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_command_line() {
        let err = Exec::new(&[], &LaunchOptions::new()).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn rejects_interior_nul() {
        let args = vec!["echo".to_string(), "a\0b".to_string()];
        assert!(Exec::new(&args, &LaunchOptions::new()).is_err());
    }

    #[test]
    fn renders_environment_pairs() {
        let options = LaunchOptions::new().env([("PATH", "/bin"), ("LANG", "C")]);
        let exec = Exec::new(&["env".to_string()], &options).unwrap();

        let envp: Vec<_> = exec
            .envp
            .unwrap()
            .into_iter()
            .map(|s| s.into_string().unwrap())
            .collect();

        assert_eq!(envp, vec!["LANG=C", "PATH=/bin"]);
    }

    #[test]
    fn pointer_arrays_are_null_terminated() {
        let strings = vec![CString::new("a").unwrap(), CString::new("b").unwrap()];
        let ptrs = pointers(&strings);

        assert_eq!(ptrs.len(), 3);
        assert!(ptrs[2].is_null());
    }
}
