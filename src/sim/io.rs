//! Console handling for LC-3.
//!
//! The interface for consoles is defined with the [`IODevice`] trait.
//! This is exposed to the simulator with the [`SimIO`] enum.
//!
//! The simulator only touches the console in two places:
//! - the keyboard status register poll (see [`Mem::read`]), which uses [`IODevice::poll_input`]
//! - the trap routines (`GETC`, `OUT`, `PUTS`, `IN`, `PUTSP`, `HALT`),
//!     which use [`IODevice::read_input`] and [`IODevice::write_output`]
//!
//! Besides those two key items, this module also includes:
//! - [`EmptyIO`]: An `IODevice` with no input that discards its output.
//! - [`BufferedIO`]: An `IODevice` holding a buffered implementation for IO.
//! - [`BiChannelIO`]: An `IODevice` holding a threaded/channel implementation for IO.
//! - [`CustomIO`]: An `IODevice` that can be used to wrap around custom IO implementations.
//!
//! [`Mem::read`]: super::mem::Mem::read

use std::collections::VecDeque;
use std::sync::{Arc, RwLock, RwLockWriteGuard, TryLockError};
use std::thread::JoinHandle;

use crossbeam_channel as cbc;

/// A console that can be read from and written to.
pub trait IODevice {
    /// Takes a byte of input if one is available, without blocking.
    fn poll_input(&self) -> Option<u8>;

    /// Takes a byte of input, blocking until one is available.
    ///
    /// This returns `None` once the input is closed (e.g., end of file,
    /// or the input source was cancelled). No byte will ever arrive after that.
    fn read_input(&self) -> Option<u8>;

    /// Writes the bytes to the output and flushes them.
    ///
    /// This returns whether the write was successful or not.
    fn write_output(&self, data: &[u8]) -> bool;

    /// Tries to close this IO device.
    fn close(self);
}
impl dyn IODevice {} // assert IODevice is dyn safe

/// No input, and all output is discarded.
///
/// Input traps (`GETC`, `IN`) fail immediately with this IO,
/// since there is nothing to wait on.
pub struct EmptyIO;
impl IODevice for EmptyIO {
    fn poll_input(&self) -> Option<u8> {
        None
    }

    fn read_input(&self) -> Option<u8> {
        None
    }

    fn write_output(&self, _data: &[u8]) -> bool {
        true
    }

    fn close(self) {}
}

/// IO that reads from an input buffer and writes to an output buffer.
///
/// The buffers can be accessed in code via [`BufferedIO::get_input`] and [`BufferedIO::get_output`].
///
/// Since nothing else can feed the input buffer while the simulator is running,
/// a blocking read on an empty input buffer is treated as the input being closed.
///
/// Note that if a input/output lock guard is acquired from one of the locks of this IO,
/// the input/output becomes temporarily inaccessible to the simulator.
/// Thus, a lock guard should never be leaked otherwise the simulator loses access to the input/output.
#[derive(Clone)]
pub struct BufferedIO {
    input: Arc<RwLock<VecDeque<u8>>>,
    output: Arc<RwLock<Vec<u8>>>
}
impl BufferedIO {
    /// Creates a new BufferedIO.
    pub fn new() -> Self {
        Self { input: Default::default(), output: Default::default() }
    }
    /// Creates a new BufferedIO from already defined buffers.
    pub fn with_bufs(input: Arc<RwLock<VecDeque<u8>>>, output: Arc<RwLock<Vec<u8>>>) -> Self {
        Self { input, output }
    }

    fn try_input(&self) -> Option<RwLockWriteGuard<'_, VecDeque<u8>>> {
        match self.input.try_write() {
            Ok(g) => Some(g),
            Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
    fn try_output(&self) -> Option<RwLockWriteGuard<'_, Vec<u8>>> {
        match self.output.try_write() {
            Ok(g) => Some(g),
            Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Gets a reference to the input buffer.
    pub fn get_input(&self) -> &Arc<RwLock<VecDeque<u8>>> {
        &self.input
    }
    /// Gets a reference to the output buffer.
    pub fn get_output(&self) -> &Arc<RwLock<Vec<u8>>> {
        &self.output
    }
}
impl Default for BufferedIO {
    fn default() -> Self {
        Self::new()
    }
}
impl IODevice for BufferedIO {
    fn poll_input(&self) -> Option<u8> {
        self.try_input()?.pop_front()
    }

    fn read_input(&self) -> Option<u8> {
        self.try_input()?.pop_front()
    }

    fn write_output(&self, data: &[u8]) -> bool {
        match self.try_output() {
            Some(mut out) => {
                out.extend_from_slice(data);
                true
            },
            None => false
        }
    }

    fn close(self) {}
}

/// A helper struct for [`BiChannelIO::new`],
/// indicating the channel is closed and no more reads/writes will come from it.
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Stop;

/// An IO that reads from one channel and writes to another.
///
/// A reader thread feeds bytes into the input channel. A key is "available"
/// (for [`IODevice::poll_input`]) when the reader thread has a byte waiting.
/// A blocking read waits on the channel, and returns `None` once the reader thread stops.
/// That is how an embedding application cancels a pending `GETC`/`IN`:
/// have the reader return [`Stop`].
///
/// A writer thread drains the output channel.
pub struct BiChannelIO {
    read_data:    cbc::Receiver<u8>,
    #[allow(unused)]
    read_handler: JoinHandle<()>,

    write_data:    cbc::Sender<u8>,
    write_handler: JoinHandle<()>
}
impl BiChannelIO {
    /// Creates a new bi-channel IO device with the given reader and writer.
    ///
    /// This calls the reader function every time the IO input receives a byte.
    /// The reader function should block until a byte is ready, or return Stop
    /// if there are no more bytes to read.
    ///
    /// This calls the writer function every time a byte needs to be written to the
    /// IO output. The writer is expected to flush.
    ///
    /// This uses threads to read and write from input and output. As such,
    /// the reader keeps consuming input even when the simulator is not reading it.
    /// Bytes that are not read yet queue up in the input channel,
    /// so the reader always gets to see the next byte (e.g., an interrupt key).
    pub fn new(
        mut reader: impl FnMut() -> Result<u8, Stop> + Send + 'static,
        mut writer: impl FnMut(u8) -> Result<(), Stop> + Send + 'static
    ) -> Self {
        let (read_tx, read_rx) = cbc::unbounded();
        let (write_tx, write_rx) = cbc::unbounded();

        // Reader thread:
        let read_handler = std::thread::spawn(move || loop {
            let Ok(byte) = reader() else { return };
            let Ok(()) = read_tx.send(byte) else { return };
        });

        // Writer thread:
        let write_handler = std::thread::spawn(move || {
            for byte in write_rx {
                let Ok(()) = writer(byte) else { return };
            }
        });

        Self {
            read_data: read_rx,
            read_handler,
            write_data: write_tx,
            write_handler
        }
    }

    /// Creates a bi-channel IO device with stdin being the read data and stdout being the write data.
    ///
    /// Note that unless the terminal is in raw mode, data is only sent once a new line is typed.
    /// Additionally, this flushes stdout every time a byte is written.
    pub fn stdio() -> Self {
        use std::io::{self, BufRead, Write};

        Self::new(
            || {
                let mut stdin = io::stdin().lock();
                let &[byte, ..] = stdin.fill_buf().map_err(|_| Stop)? else {
                    // end of file
                    return Err(Stop);
                };

                stdin.consume(1);
                Ok(byte)
            },
            |byte| {
                let mut stdout = io::stdout().lock();
                stdout.write_all(&[byte]).map_err(|_| Stop)?;
                stdout.flush().map_err(|_| Stop)
            }
        )
    }
}

impl IODevice for BiChannelIO {
    fn poll_input(&self) -> Option<u8> {
        match self.read_data.try_recv() {
            Ok(b) => Some(b),
            Err(cbc::TryRecvError::Empty) => None,
            // this can occur if the read handler stopped or panicked.
            // however, this just means no key will come, so just return None
            Err(cbc::TryRecvError::Disconnected) => None,
        }
    }

    fn read_input(&self) -> Option<u8> {
        self.read_data.recv().ok()
    }

    fn write_output(&self, data: &[u8]) -> bool {
        data.iter().all(|&b| self.write_data.send(b).is_ok())
    }

    fn close(self) {
        let Self {
            read_data,
            read_handler: _,
            write_data,
            write_handler
        } = self;

        // Drop the channels.
        std::mem::drop(read_data);
        std::mem::drop(write_data);

        // Wait for the write handler to drain and join.
        //
        // The read handler is not joined, because it can hang on reading,
        // which prevents it from seeing the channel is disconnected.
        if write_handler.join().is_err() {
            log::warn!("console writer thread panicked");
        }
    }
}

// `Box<dyn IODevice>` does not work.
// It doesn't implement IODevice because it doesn't implement close
// (because you can't close on an unsized dyn IODevice).
//
// So, this puts the device in an Option
// and closes it by taking it out, which only requires &mut Self.
trait IODeviceMutClosable {
    fn poll_input(&self) -> Option<u8>;
    fn read_input(&self) -> Option<u8>;
    fn write_output(&self, data: &[u8]) -> bool;

    /// Closes but doesn't consume the object.
    ///
    /// The object should not be used after this point.
    fn take_close(&mut self);
}
impl<D: IODevice> IODeviceMutClosable for Option<D> {
    fn poll_input(&self) -> Option<u8> {
        self.as_ref()?.poll_input()
    }
    fn read_input(&self) -> Option<u8> {
        self.as_ref()?.read_input()
    }
    fn write_output(&self, data: &[u8]) -> bool {
        self.as_ref().is_some_and(|d| d.write_output(data))
    }
    fn take_close(&mut self) {
        if let Some(d) = self.take() {
            d.close()
        }
    }
}

/// An opaque box that holds custom defined IO.
///
/// This can be used to use a different implementation of IO
/// than the ones implemented in this module.
pub struct CustomIO(Box<dyn IODeviceMutClosable + Send + Sync>);
impl CustomIO {
    /// Creates a new custom IO.
    pub fn new(device: impl IODevice + Send + Sync + 'static) -> Self {
        CustomIO(Box::new(Some(device)))
    }
}
impl IODevice for CustomIO {
    fn poll_input(&self) -> Option<u8> {
        self.0.poll_input()
    }

    fn read_input(&self) -> Option<u8> {
        self.0.read_input()
    }

    fn write_output(&self, data: &[u8]) -> bool {
        self.0.write_output(data)
    }

    fn close(mut self) {
        self.0.take_close();
        std::mem::drop(self)
    }
}

/// All the variants of IO accepted by the Simulator.
#[derive(Default)]
pub enum SimIO {
    /// No IO. This corresponds to the implementation of [`EmptyIO`].
    #[default]
    Empty,
    /// A buffered implementation. See [`BufferedIO`].
    Buffered(BufferedIO),
    /// A bi-channel IO implementation. See [`BiChannelIO`].
    BiChannel(BiChannelIO),
    /// A custom IO implementation. See [`CustomIO`].
    Custom(CustomIO)
}
impl std::fmt::Debug for SimIO {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            SimIO::Empty => "Empty",
            SimIO::Buffered(_) => "Buffered",
            SimIO::BiChannel(_) => "BiChannel",
            SimIO::Custom(_) => "Custom",
        };
        f.debug_tuple("SimIO").field(&kind).finish()
    }
}
impl From<EmptyIO> for SimIO {
    fn from(_value: EmptyIO) -> Self {
        SimIO::Empty
    }
}
impl From<BufferedIO> for SimIO {
    fn from(value: BufferedIO) -> Self {
        SimIO::Buffered(value)
    }
}
impl From<BiChannelIO> for SimIO {
    fn from(value: BiChannelIO) -> Self {
        SimIO::BiChannel(value)
    }
}
impl From<CustomIO> for SimIO {
    fn from(value: CustomIO) -> Self {
        SimIO::Custom(value)
    }
}
impl IODevice for SimIO {
    fn poll_input(&self) -> Option<u8> {
        match self {
            SimIO::Empty => EmptyIO.poll_input(),
            SimIO::Buffered(io) => io.poll_input(),
            SimIO::BiChannel(io) => io.poll_input(),
            SimIO::Custom(io) => io.poll_input(),
        }
    }

    fn read_input(&self) -> Option<u8> {
        match self {
            SimIO::Empty => EmptyIO.read_input(),
            SimIO::Buffered(io) => io.read_input(),
            SimIO::BiChannel(io) => io.read_input(),
            SimIO::Custom(io) => io.read_input(),
        }
    }

    fn write_output(&self, data: &[u8]) -> bool {
        match self {
            SimIO::Empty => EmptyIO.write_output(data),
            SimIO::Buffered(io) => io.write_output(data),
            SimIO::BiChannel(io) => io.write_output(data),
            SimIO::Custom(io) => io.write_output(data),
        }
    }

    fn close(self) {
        match self {
            SimIO::Empty => EmptyIO.close(),
            SimIO::Buffered(io) => io.close(),
            SimIO::BiChannel(io) => io.close(),
            SimIO::Custom(io) => io.close()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_buffered_io() {
        let io = BufferedIO::new();
        io.get_input().write().unwrap().extend(b"xy");

        assert_eq!(io.poll_input(), Some(b'x'));
        assert_eq!(io.read_input(), Some(b'y'));
        assert_eq!(io.read_input(), None);

        assert!(io.write_output(b"hi"));
        assert!(io.write_output(b"!"));
        assert_eq!(&*io.get_output().read().unwrap(), b"hi!");
    }

    #[test]
    fn test_buffered_io_locked() {
        let io = BufferedIO::new();
        let guard = io.get_output().write().unwrap();
        assert!(!io.write_output(b"nope"));
        std::mem::drop(guard);
        assert!(io.write_output(b"ok"));
    }

    #[test]
    fn test_bichannel_read_until_stop() {
        let mut input = b"ab".iter().copied();
        let io = BiChannelIO::new(
            move || input.next().ok_or(Stop),
            |_| Ok(())
        );

        assert_eq!(io.read_input(), Some(b'a'));
        assert_eq!(io.read_input(), Some(b'b'));
        // reader stopped, so the blocking read is cancelled instead of hanging
        assert_eq!(io.read_input(), None);
        assert_eq!(io.poll_input(), None);
        io.close();
    }

    #[test]
    fn test_bichannel_poll() {
        let (tx, rx) = cbc::unbounded::<u8>();
        let io = BiChannelIO::new(
            move || rx.recv().map_err(|_| Stop),
            |_| Ok(())
        );

        assert_eq!(io.poll_input(), None);
        tx.send(b'q').unwrap();

        // give the reader thread time to forward the byte
        let mut polled = None;
        for _ in 0..100 {
            polled = io.poll_input();
            if polled.is_some() { break; }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(polled, Some(b'q'));
        io.close();
    }

    #[test]
    fn test_bichannel_close_drains_output() {
        let written = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&written);
        let io = BiChannelIO::new(
            || Err(Stop),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        );

        assert!(io.write_output(b"HALT\n"));
        io.close();
        assert_eq!(written.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_bichannel_reader_not_blocked_by_unread_input() {
        let consumed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&consumed);
        let mut input = b"abc".iter().copied();
        let io = BiChannelIO::new(
            move || {
                let byte = input.next().ok_or(Stop)?;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(byte)
            },
            |_| Ok(())
        );

        // nothing reads the input, but the reader still gets through all of it
        for _ in 0..100 {
            if consumed.load(Ordering::SeqCst) == 3 { break; }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(consumed.load(Ordering::SeqCst), 3);

        assert_eq!(io.read_input(), Some(b'a'));
        assert_eq!(io.read_input(), Some(b'b'));
        assert_eq!(io.read_input(), Some(b'c'));
        assert_eq!(io.read_input(), None);
        io.close();
    }

    #[test]
    fn test_custom_io() {
        let buf = BufferedIO::new();
        buf.get_input().write().unwrap().push_back(b'c');

        let io = SimIO::from(CustomIO::new(buf.clone()));
        assert_eq!(io.read_input(), Some(b'c'));
        assert!(io.write_output(b"d"));
        io.close();
        assert_eq!(&*buf.get_output().read().unwrap(), b"d");
    }
}
