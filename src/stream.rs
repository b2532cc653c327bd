//! Byte stream collaborators consumed by the sound codecs
//!
//! Readers only need positioned reads; every `Read + Seek + Send` type
//! (files, `Cursor<Vec<u8>>`, `Cursor<&[u8]>`) is an [`InputStream`] for
//! free. The symphonia-backed decoders require `Send`.

use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};

/// Seekable source of bytes
pub trait InputStream: Send {
    /// Read up to `buf.len()` bytes, returning how many were read (0 at end)
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Move to an absolute position, returning the new position
    fn seek(&mut self, position: u64) -> io::Result<u64>;

    /// Current position
    fn tell(&mut self) -> io::Result<u64>;

    /// Total size of the stream in bytes
    fn size(&mut self) -> io::Result<u64>;
}

impl<T: Read + Seek + Send> InputStream for T {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    #[inline]
    fn seek(&mut self, position: u64) -> io::Result<u64> {
        Seek::seek(self, SeekFrom::Start(position))
    }

    #[inline]
    fn tell(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    fn size(&mut self) -> io::Result<u64> {
        let position = self.stream_position()?;
        let end = Seek::seek(self, SeekFrom::End(0))?;
        Seek::seek(self, SeekFrom::Start(position))?;
        Ok(end)
    }
}

/// Seekable sink of bytes used by the sound file writers
pub trait OutputStream: Write + Seek {}

impl<T: Write + Seek> OutputStream for T {}

/// Fill `buf` from `stream`, stopping early only at end of stream
///
/// Returns the number of bytes read.
pub fn read_full(stream: &mut dyn InputStream, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read exactly `N` bytes, or `None` if the stream ends first
pub(crate) fn read_array<const N: usize>(stream: &mut dyn InputStream) -> io::Result<Option<[u8; N]>> {
    let mut bytes = [0u8; N];
    let n = read_full(stream, &mut bytes)?;
    Ok((n == N).then_some(bytes))
}

/// In-memory sinks shared by the codec tests
#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::io::{self, Cursor, Seek, SeekFrom, Write};
    use std::rc::Rc;

    /// Sink whose bytes stay reachable after a writer takes ownership of it
    #[derive(Clone, Default)]
    pub(crate) struct SharedSink(Rc<RefCell<Cursor<Vec<u8>>>>);

    impl SharedSink {
        pub(crate) fn bytes(&self) -> Vec<u8> {
            self.0.borrow().get_ref().clone()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Write::write(&mut *self.0.borrow_mut(), buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for SharedSink {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            Seek::seek(&mut *self.0.borrow_mut(), pos)
        }
    }
}
