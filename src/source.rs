//! Frame sources.
//!
//! A [`FrameSource`] is a blocking byte stream with a read timeout. A read
//! returns the number of bytes delivered; `0` means the timeout expired
//! without data. Sources must keep delivering when the consumer discards what
//! it reads, so the acquisition loop reads even while processing is disabled.
//!
//! Implementations:
//!
//! - [`UdpFrameSource`]: one datagram per frame from a bound UDP socket.
//! - [`FileFrameSource`]: replays a capture file of back-to-back frames.
//! - [`ChannelFrameSource`]: in-process source fed through a [`FrameFeeder`].
//!
//! [`open_source`] maps a stream identity (`udp://...`, `file://...`) to one
//! of the network or file sources.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::net::UdpSocket;
use std::path::Path;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info};

use crate::error::{BsaError, Result};
use crate::frame::FRAME_SIZE;

/// A blocking stream of frame bytes.
pub trait FrameSource: Send {
    /// Read up to `buf.len()` bytes, waiting at most `timeout`.
    ///
    /// Returns `Ok(0)` on timeout.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read(buf, timeout)
    }
}

/// Open the frame source named by a stream identity.
///
/// Supported forms are `udp://<host:port>` and `file://<path>`.
pub fn open_source(stream_name: &str) -> Result<Box<dyn FrameSource>> {
    if let Some(addr) = stream_name.strip_prefix("udp://") {
        return Ok(Box::new(UdpFrameSource::bind(addr)?));
    }
    if let Some(path) = stream_name.strip_prefix("file://") {
        return Ok(Box::new(FileFrameSource::open(path)?));
    }
    Err(BsaError::UnsupportedStream {
        name: stream_name.to_string(),
    })
}

/// Frame source reading one datagram per frame.
pub struct UdpFrameSource {
    socket: UdpSocket,
    timeout: Option<Duration>,
}

impl UdpFrameSource {
    /// Bind a UDP socket on `addr`.
    pub fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        info!(addr = %socket.local_addr()?, "Listening for BSA stream datagrams");
        Ok(Self {
            socket,
            timeout: None,
        })
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl FrameSource for UdpFrameSource {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if self.timeout != Some(timeout) {
            self.socket.set_read_timeout(Some(timeout))?;
            self.timeout = Some(timeout);
        }

        match self.socket.recv(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

/// Frame source replaying a file of concatenated frames.
///
/// Each read returns the next [`FRAME_SIZE`] bytes. After the end of the
/// file every read waits for the timeout and returns `0`.
pub struct FileFrameSource {
    reader: BufReader<File>,
    period: Option<Duration>,
    exhausted: bool,
}

impl FileFrameSource {
    /// Open a capture file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Replaying BSA stream from file");
        Ok(Self {
            reader: BufReader::new(file),
            period: None,
            exhausted: false,
        })
    }

    /// Pause for `period` before delivering each frame.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }
}

impl FrameSource for FileFrameSource {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if self.exhausted {
            std::thread::sleep(timeout);
            return Ok(0);
        }
        if let Some(period) = self.period {
            std::thread::sleep(period);
        }

        let want = buf.len().min(FRAME_SIZE);
        let mut got = 0;
        while got < want {
            match self.reader.read(&mut buf[got..want]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if got < want {
            debug!(trailing = got, "End of replay file");
            self.exhausted = true;
        }
        Ok(got)
    }
}

/// In-process frame source fed by a [`FrameFeeder`].
///
/// Each message is delivered by exactly one read. Messages longer than the
/// read buffer are truncated to the buffer length.
pub struct ChannelFrameSource {
    rx: Receiver<Vec<u8>>,
}

/// Sending half of a [`ChannelFrameSource`].
#[derive(Clone)]
pub struct FrameFeeder {
    tx: Sender<Vec<u8>>,
}

impl ChannelFrameSource {
    /// Create a source with room for `capacity` queued messages.
    ///
    /// A capacity of `0` makes every send rendezvous with a read.
    pub fn bounded(capacity: usize) -> (FrameFeeder, Self) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (FrameFeeder { tx }, Self { rx })
    }

    /// Create a source with an unbounded queue.
    pub fn unbounded() -> (FrameFeeder, Self) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (FrameFeeder { tx }, Self { rx })
    }
}

impl FrameSource for ChannelFrameSource {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => {
                let n = msg.len().min(buf.len());
                buf[..n].copy_from_slice(&msg[..n]);
                Ok(n)
            }
            Err(RecvTimeoutError::Timeout) => Ok(0),
            Err(RecvTimeoutError::Disconnected) => {
                // Behave like an idle link rather than spinning.
                std::thread::sleep(timeout);
                Ok(0)
            }
        }
    }
}

impl FrameFeeder {
    /// Queue a message, blocking while the queue is full.
    ///
    /// Returns `false` once the source has been dropped.
    pub fn send(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.tx.send(bytes.into()).is_ok()
    }

    /// Queue a message, waiting at most `timeout` for room.
    pub fn send_timeout(&self, bytes: impl Into<Vec<u8>>, timeout: Duration) -> bool {
        self.tx.send_timeout(bytes.into(), timeout).is_ok()
    }

    /// Queue a message without blocking.
    pub fn try_send(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.tx.try_send(bytes.into()).is_ok()
    }

    /// Number of messages not yet read.
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const T: Duration = Duration::from_millis(20);

    #[test]
    fn test_channel_source_delivers_and_times_out() {
        let (feeder, mut source) = ChannelFrameSource::unbounded();
        let mut buf = [0u8; 8];

        assert!(feeder.send(vec![1, 2, 3]));
        assert_eq!(source.read(&mut buf, T).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);

        assert_eq!(source.read(&mut buf, T).unwrap(), 0);
    }

    #[test]
    fn test_channel_source_truncates_to_buffer() {
        let (feeder, mut source) = ChannelFrameSource::unbounded();
        let mut buf = [0u8; 4];
        feeder.send(vec![9u8; 10]);
        assert_eq!(source.read(&mut buf, T).unwrap(), 4);
        assert_eq!(feeder.pending(), 0);
    }

    #[test]
    fn test_channel_source_disconnected_is_timeout() {
        let (feeder, mut source) = ChannelFrameSource::unbounded();
        drop(feeder);
        let mut buf = [0u8; 4];
        assert_eq!(source.read(&mut buf, T).unwrap(), 0);
    }

    #[test]
    fn test_file_source_replays_frames_then_idles() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[1u8; FRAME_SIZE]).unwrap();
        file.write_all(&[2u8; FRAME_SIZE]).unwrap();
        file.write_all(&[3u8; 10]).unwrap();
        file.flush().unwrap();

        let mut source = FileFrameSource::open(file.path()).unwrap();
        let mut buf = vec![0u8; FRAME_SIZE + 4];

        assert_eq!(source.read(&mut buf, T).unwrap(), FRAME_SIZE);
        assert_eq!(buf[0], 1);
        assert_eq!(source.read(&mut buf, T).unwrap(), FRAME_SIZE);
        assert_eq!(buf[0], 2);
        assert_eq!(source.read(&mut buf, T).unwrap(), 10);
        assert_eq!(source.read(&mut buf, T).unwrap(), 0);
    }

    #[test]
    fn test_udp_source_receives_datagram() {
        let mut source = UdpFrameSource::bind("127.0.0.1:0").unwrap();
        let addr = source.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&[7u8; FRAME_SIZE], addr).unwrap();

        let mut buf = vec![0u8; FRAME_SIZE + 4];
        assert_eq!(
            source.read(&mut buf, Duration::from_secs(1)).unwrap(),
            FRAME_SIZE
        );
        assert_eq!(source.read(&mut buf, T).unwrap(), 0);
    }

    #[test]
    fn test_open_source_rejects_unknown_scheme() {
        let err = open_source("tcp://localhost:1").err().unwrap();
        assert!(matches!(err, BsaError::UnsupportedStream { .. }));
        assert!(open_source("file:///definitely/not/here.bin").is_err());
    }
}
