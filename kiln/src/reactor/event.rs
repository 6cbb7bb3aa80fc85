/// An I/O event reported by the poller.
///
/// The event indicates whether the file descriptor is readable, writable,
/// or was hung up by its peer.
pub(crate) struct Event {
    /// Token associated with the registered file descriptor.
    ///
    /// The multiplexer uses the descriptor itself as token.
    pub(crate) token: usize,

    /// Data (or end of file) is available.
    pub(crate) readable: bool,

    /// A write would not block.
    pub(crate) writable: bool,

    /// The peer went away or the descriptor is in error.
    pub(crate) hangup: bool,
}
