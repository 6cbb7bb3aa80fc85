use super::event::Event;
use super::io::{JobIo, ReadStream, Watch, WriteStream};
use super::poller::common::Interest;
use super::poller::platform::{sys_read, sys_write};
use super::poller::{Poller, Waker};

use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};

/// Bytes read per readiness event.
const READ_CHUNK: usize = 32 << 10;

static MULTIPLEXER: OnceLock<Multiplexer> = OnceLock::new();

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Streams currently serviced, keyed by descriptor.
#[derive(Default)]
struct Tables {
    readers: HashMap<RawFd, ReadStream>,
    writers: HashMap<RawFd, WriteStream>,

    /// Set to stop the thread once every stream is finished.
    shutdown: bool,
}

impl Tables {
    fn is_idle(&self) -> bool {
        self.readers.is_empty() && self.writers.is_empty()
    }

    fn interest(&self, fd: RawFd) -> Interest {
        Interest {
            read: self.readers.contains_key(&fd),
            write: self.writers.contains_key(&fd),
        }
    }
}

struct Shared {
    tables: Mutex<Tables>,
    poller: Poller,
    waker: Arc<Waker>,
}

impl Shared {
    /// Brings the poller registration of `fd` in line with the tables.
    fn update_interest(&self, tables: &Tables, fd: RawFd) {
        let interest = tables.interest(fd);

        if interest.is_empty() {
            self.poller.deregister(fd);
        } else if let Err(err) = self.poller.reregister(fd, interest) {
            tracing::warn!(fd, error = %err, "failed to update descriptor interest");
        }
    }

    fn read_ready(&self, fd: RawFd, buffer: &mut [u8]) {
        let mut tables = lock(&self.tables);
        let Some(stream) = tables.readers.get_mut(&fd) else {
            return;
        };

        let n = sys_read(fd, buffer);

        if n > 0 {
            stream.buffer.extend_from_slice(&buffer[..n as usize]);
            return;
        }

        if n < 0 {
            let err = io::Error::last_os_error();
            if matches!(
                err.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) {
                return;
            }

            // A pty master reports EIO once the child side is closed.
            tracing::trace!(fd, error = %err, "read stream closed");
        }

        let Some(stream) = tables.readers.remove(&fd) else {
            return;
        };
        self.update_interest(&tables, fd);
        drop(tables);

        stream.io.finish_read(stream.channel, stream.buffer);
    }

    fn write_ready(&self, fd: RawFd) {
        let mut tables = lock(&self.tables);
        let Some(stream) = tables.writers.get_mut(&fd) else {
            return;
        };

        let finished = match stream.chunks.front_mut() {
            None => true,
            Some(chunk) => {
                let n = sys_write(fd, chunk);

                if n >= 0 {
                    let n = n as usize;
                    if n >= chunk.len() {
                        stream.chunks.pop_front();
                    } else {
                        chunk.drain(..n);
                    }

                    stream.chunks.is_empty()
                } else {
                    let err = io::Error::last_os_error();
                    let transient = matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    );

                    if !transient {
                        tracing::debug!(fd, error = %err, "abandoning stdin of child");
                    }

                    !transient
                }
            }
        };

        if !finished {
            return;
        }

        let Some(stream) = tables.writers.remove(&fd) else {
            return;
        };
        self.update_interest(&tables, fd);
        drop(tables);

        stream.io.finish_write();
    }

    /// Finishes every stream with whatever it has so far.
    fn abandon_all(&self) {
        let (readers, writers) = {
            let mut tables = lock(&self.tables);
            (
                std::mem::take(&mut tables.readers),
                std::mem::take(&mut tables.writers),
            )
        };

        for (fd, stream) in readers {
            self.poller.deregister(fd);
            stream.io.finish_read(stream.channel, stream.buffer);
        }

        for (fd, stream) in writers {
            self.poller.deregister(fd);
            stream.io.finish_write();
        }
    }

    fn service(&self, event: &Event, buffer: &mut [u8]) {
        let fd = event.token as RawFd;

        if event.readable || event.hangup {
            self.read_ready(fd, buffer);
        }

        if event.writable || event.hangup {
            self.write_ready(fd);
        }
    }
}

/// Thread body: services streams until shut down and idle.
fn run(shared: &Shared) {
    let mut events = Vec::with_capacity(64);
    let mut buffer = vec![0u8; READ_CHUNK];

    loop {
        {
            let tables = lock(&shared.tables);
            if tables.shutdown && tables.is_idle() {
                break;
            }
        }

        if let Err(err) = shared.poller.poll(&mut events, None) {
            tracing::error!(error = %err, "multiplexer poll failed");
            shared.abandon_all();
            break;
        }

        for event in &events {
            shared.service(event, &mut buffer);
        }
    }

    tracing::debug!("multiplexer thread stopped");
}

/// The process-wide I/O thread servicing every child process stream.
///
/// Started lazily by the first job that registers streams. Reads are
/// capped at 32 KiB per readiness event; writes send one chunk at a time.
pub(crate) struct Multiplexer {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Multiplexer {
    fn new() -> io::Result<Self> {
        let poller = Poller::new()?;
        let waker = poller.waker();

        Ok(Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables::default()),
                poller,
                waker,
            }),
            thread: Mutex::new(None),
        })
    }

    /// The process-wide multiplexer, created on first use.
    pub(crate) fn global() -> io::Result<&'static Multiplexer> {
        if let Some(multiplexer) = MULTIPLEXER.get() {
            return Ok(multiplexer);
        }

        let fresh = Multiplexer::new()?;
        Ok(MULTIPLEXER.get_or_init(|| fresh))
    }

    /// The multiplexer, if it was ever created.
    pub(crate) fn existing() -> Option<&'static Multiplexer> {
        MULTIPLEXER.get()
    }

    /// Starts the I/O thread if it is not running.
    ///
    /// The returned guard keeps [`Multiplexer::shutdown`] out until the
    /// caller's streams are registered.
    fn ensure_running(&self) -> io::Result<MutexGuard<'_, Option<JoinHandle<()>>>> {
        let mut slot = lock(&self.thread);
        if slot.is_some() {
            return Ok(slot);
        }

        lock(&self.shared.tables).shutdown = false;

        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("kiln-io".into())
            .spawn(move || run(&shared))?;

        tracing::debug!("multiplexer thread started");
        *slot = Some(handle);

        Ok(slot)
    }

    /// Hands the streams of one job to the I/O thread.
    ///
    /// `io` is finished once per watch. On error nothing stays registered.
    pub(crate) fn attach(&self, watches: Vec<Watch>, io: &Arc<JobIo>) -> io::Result<()> {
        let _running = self.ensure_running()?;

        let mut tables = lock(&self.shared.tables);
        let mut fds = Vec::with_capacity(watches.len());

        for watch in watches {
            match watch {
                Watch::Read { fd, channel } => {
                    tables.readers.insert(
                        fd,
                        ReadStream {
                            buffer: Vec::new(),
                            channel,
                            io: io.clone(),
                        },
                    );
                    fds.push(fd);
                }
                Watch::Write { fd, chunks } => {
                    tables.writers.insert(
                        fd,
                        WriteStream {
                            chunks,
                            io: io.clone(),
                        },
                    );
                    fds.push(fd);
                }
            }
        }

        fds.sort_unstable();
        fds.dedup();

        for &fd in &fds {
            let interest = tables.interest(fd);

            if let Err(err) = self.shared.poller.register(fd, interest) {
                for &fd in &fds {
                    tables.readers.remove(&fd);
                    tables.writers.remove(&fd);
                    self.shared.poller.deregister(fd);
                }

                return Err(err);
            }
        }

        Ok(())
    }

    /// Stops the I/O thread once its current streams are finished.
    ///
    /// Blocks until the thread exited. A later [`Multiplexer::attach`]
    /// starts a new one.
    pub(crate) fn shutdown(&self) {
        let mut slot = lock(&self.thread);
        let Some(handle) = slot.take() else {
            return;
        };

        lock(&self.shared.tables).shutdown = true;
        self.shared.waker.wake();

        if handle.join().is_err() {
            tracing::error!("multiplexer thread panicked");
        }
    }
}
