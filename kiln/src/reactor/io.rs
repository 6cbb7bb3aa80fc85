use std::collections::VecDeque;
use std::os::fd::RawFd;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// Which captured output a read stream fills.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Channel {
    Stdout,
    Stderr,
}

/// A stream a job asks the multiplexer to service.
pub(crate) enum Watch {
    /// Read `fd` to end of file into `channel`.
    Read { fd: RawFd, channel: Channel },

    /// Write `chunks` to `fd`, in order.
    Write { fd: RawFd, chunks: VecDeque<Vec<u8>> },
}

/// A descriptor being read to end of file.
pub(crate) struct ReadStream {
    pub(crate) buffer: Vec<u8>,
    pub(crate) channel: Channel,
    pub(crate) io: Arc<JobIo>,
}

/// A descriptor being fed.
pub(crate) struct WriteStream {
    /// Pending data. The front chunk may be partially written.
    pub(crate) chunks: VecDeque<Vec<u8>>,
    pub(crate) io: Arc<JobIo>,
}

struct Outputs {
    /// Streams still being serviced.
    remaining: usize,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Completion latch of one job's streams.
///
/// The multiplexer finishes streams one by one; the job blocks in
/// [`JobIo::wait`] until all of them are finished.
pub(crate) struct JobIo {
    outputs: Mutex<Outputs>,
    done: Condvar,
}

impl JobIo {
    pub(crate) fn new(streams: usize) -> Self {
        Self {
            outputs: Mutex::new(Outputs {
                remaining: streams,
                stdout: Vec::new(),
                stderr: Vec::new(),
            }),
            done: Condvar::new(),
        }
    }

    /// A read stream reached end of file.
    pub(crate) fn finish_read(&self, channel: Channel, data: Vec<u8>) {
        let mut outputs = self.outputs.lock().unwrap_or_else(PoisonError::into_inner);

        match channel {
            Channel::Stdout => outputs.stdout = data,
            Channel::Stderr => outputs.stderr = data,
        }

        Self::finish(&mut outputs, &self.done);
    }

    /// A write stream was fully written or abandoned.
    pub(crate) fn finish_write(&self) {
        let mut outputs = self.outputs.lock().unwrap_or_else(PoisonError::into_inner);
        Self::finish(&mut outputs, &self.done);
    }

    fn finish(outputs: &mut Outputs, done: &Condvar) {
        outputs.remaining = outputs.remaining.saturating_sub(1);
        if outputs.remaining == 0 {
            done.notify_all();
        }
    }

    /// Blocks until every stream is finished; returns `(stdout, stderr)`.
    pub(crate) fn wait(&self) -> (Vec<u8>, Vec<u8>) {
        let mut outputs = self.outputs.lock().unwrap_or_else(PoisonError::into_inner);

        while outputs.remaining > 0 {
            outputs = self
                .done
                .wait(outputs)
                .unwrap_or_else(PoisonError::into_inner);
        }

        (
            std::mem::take(&mut outputs.stdout),
            std::mem::take(&mut outputs.stderr),
        )
    }
}

/// Splits `data` into chunks of at most `chunk` bytes.
pub(crate) fn chunked(data: &[u8], chunk: usize) -> VecDeque<Vec<u8>> {
    data.chunks(chunk.max(1)).map(<[u8]>::to_vec).collect()
}
