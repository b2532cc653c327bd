//! Codec registry: format sniffing and reader/writer construction
//!
//! Readers are tried in registration order; the first whose sniffer
//! accepts the stream wins, so stricter formats belong first.

use std::any::TypeId;
use std::fs::File;
use std::io::{self, Cursor};
use std::path::Path;
use std::sync::{OnceLock, PoisonError, RwLock};

use tracing::{debug, info};

use crate::codec::{SoundFileReader, SoundFileWriter};
use crate::error::Result;
use crate::flac::{FlacReader, FlacWriter};
use crate::ogg::OggVorbisReader;
use crate::stream::InputStream;
use crate::wav::{WavReader, WavWriter};

type ReaderFactory = fn() -> Box<dyn SoundFileReader>;
type Sniffer = fn(&mut dyn InputStream) -> io::Result<bool>;
type WriterFactory = fn() -> Box<dyn SoundFileWriter>;
type PathCheck = fn(&Path) -> bool;

struct ReaderEntry {
    type_id: TypeId,
    create: ReaderFactory,
    check: Sniffer,
}

struct WriterEntry {
    type_id: TypeId,
    create: WriterFactory,
    check: PathCheck,
}

fn new_reader<T: SoundFileReader + Default + 'static>() -> Box<dyn SoundFileReader> {
    Box::new(T::default())
}

fn new_writer<T: SoundFileWriter + Default + 'static>() -> Box<dyn SoundFileWriter> {
    Box::new(T::default())
}

/// Ordered table of sound file readers and writers
#[derive(Default)]
pub struct Registry {
    readers: Vec<ReaderEntry>,
    writers: Vec<WriterEntry>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in codecs
    ///
    /// Readers: WAV, FLAC, Ogg Vorbis. Writers: WAV, FLAC.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register_reader::<WavReader>();
        registry.register_reader::<FlacReader>();
        registry.register_reader::<OggVorbisReader>();

        registry.register_writer::<WavWriter>();
        registry.register_writer::<FlacWriter>();

        registry
    }

    /// Append reader `T`; registering the same type twice has no effect
    pub fn register_reader<T: SoundFileReader + Default + 'static>(&mut self) {
        if self.is_reader_registered::<T>() {
            return;
        }
        self.readers.push(ReaderEntry {
            type_id: TypeId::of::<T>(),
            create: new_reader::<T>,
            check: T::check,
        });
    }

    /// Remove reader `T` if present
    pub fn unregister_reader<T: SoundFileReader + 'static>(&mut self) {
        self.readers.retain(|e| e.type_id != TypeId::of::<T>());
    }

    /// Check whether reader `T` is registered
    pub fn is_reader_registered<T: SoundFileReader + 'static>(&self) -> bool {
        self.readers.iter().any(|e| e.type_id == TypeId::of::<T>())
    }

    /// Append writer `T`; registering the same type twice has no effect
    pub fn register_writer<T: SoundFileWriter + Default + 'static>(&mut self) {
        if self.is_writer_registered::<T>() {
            return;
        }
        self.writers.push(WriterEntry {
            type_id: TypeId::of::<T>(),
            create: new_writer::<T>,
            check: T::check,
        });
    }

    /// Remove writer `T` if present
    pub fn unregister_writer<T: SoundFileWriter + 'static>(&mut self) {
        self.writers.retain(|e| e.type_id != TypeId::of::<T>());
    }

    /// Check whether writer `T` is registered
    pub fn is_writer_registered<T: SoundFileWriter + 'static>(&self) -> bool {
        self.writers.iter().any(|e| e.type_id == TypeId::of::<T>())
    }

    /// Number of registered readers
    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    /// Number of registered writers
    pub fn writer_count(&self) -> usize {
        self.writers.len()
    }

    /// Find a reader for the content of `stream`
    ///
    /// Returns `Ok(None)` when no registered format matches. The stream is
    /// left at position 0 on a match. Seek failures are hard errors; a
    /// sniffer that fails to read counts as "no match".
    pub fn create_reader_from_stream(
        &self,
        stream: &mut dyn InputStream,
    ) -> Result<Option<Box<dyn SoundFileReader>>> {
        for entry in &self.readers {
            stream.seek(0)?;
            match (entry.check)(stream) {
                Ok(true) => {
                    stream.seek(0)?;
                    return Ok(Some((entry.create)()));
                }
                Ok(false) => {}
                Err(e) => debug!(error = %e, "sniffer failed, trying next format"),
            }
        }
        debug!("no registered reader accepts the stream");
        Ok(None)
    }

    /// Find a reader for the file at `path`
    pub fn create_reader_from_filename(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Option<Box<dyn SoundFileReader>>> {
        let mut file = File::open(path)?;
        self.create_reader_from_stream(&mut file)
    }

    /// Find a reader for an in-memory file
    pub fn create_reader_from_memory(
        &self,
        data: &[u8],
    ) -> Result<Option<Box<dyn SoundFileReader>>> {
        self.create_reader_from_stream(&mut Cursor::new(data))
    }

    /// Find a writer whose file name convention matches `path`
    pub fn create_writer_from_filename(
        &self,
        path: impl AsRef<Path>,
    ) -> Option<Box<dyn SoundFileWriter>> {
        let path = path.as_ref();
        self.writers
            .iter()
            .find(|e| (e.check)(path))
            .map(|e| (e.create)())
    }
}

/// Process-wide registry, populated with the defaults on first use
pub fn global() -> &'static RwLock<Registry> {
    static GLOBAL: OnceLock<RwLock<Registry>> = OnceLock::new();
    GLOBAL.get_or_init(|| {
        let registry = Registry::with_defaults();
        info!(
            readers = registry.reader_count(),
            writers = registry.writer_count(),
            "initialized sound codec registry"
        );
        RwLock::new(registry)
    })
}

/// Run `f` with shared access to the global registry
pub(crate) fn with_global<R>(f: impl FnOnce(&Registry) -> R) -> R {
    let guard = global().read().unwrap_or_else(PoisonError::into_inner);
    f(&guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Info;

    /// Accepts every stream
    #[derive(Default)]
    struct Greedy;

    impl SoundFileReader for Greedy {
        fn check(_: &mut dyn InputStream) -> io::Result<bool> {
            Ok(true)
        }

        fn open(&mut self, _: Box<dyn InputStream>) -> Result<Info> {
            Ok(Info {
                sample_count: 7,
                ..Info::default()
            })
        }

        fn seek(&mut self, _: u64) -> Result<()> {
            Ok(())
        }

        fn read(&mut self, _: &mut [i16]) -> Result<usize> {
            Ok(0)
        }
    }

    /// Fails every sniff with an I/O error
    #[derive(Default)]
    struct Broken;

    impl SoundFileReader for Broken {
        fn check(_: &mut dyn InputStream) -> io::Result<bool> {
            Err(io::Error::new(io::ErrorKind::Other, "sniff failed"))
        }

        fn open(&mut self, _: Box<dyn InputStream>) -> Result<Info> {
            unreachable!("never selected")
        }

        fn seek(&mut self, _: u64) -> Result<()> {
            Ok(())
        }

        fn read(&mut self, _: &mut [i16]) -> Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_registration_is_idempotent() {
        let mut registry = Registry::new();
        registry.register_reader::<WavReader>();
        registry.register_reader::<WavReader>();
        assert_eq!(registry.reader_count(), 1);
        assert!(registry.is_reader_registered::<WavReader>());
        assert!(!registry.is_reader_registered::<FlacReader>());

        registry.unregister_reader::<WavReader>();
        assert_eq!(registry.reader_count(), 0);
        registry.unregister_reader::<WavReader>();
    }

    #[test]
    fn test_defaults() {
        let registry = Registry::with_defaults();
        assert_eq!(registry.reader_count(), 3);
        assert!(registry.is_reader_registered::<OggVorbisReader>());
        assert_eq!(registry.writer_count(), 2);
        assert!(registry.is_writer_registered::<WavWriter>());
        assert!(registry.is_writer_registered::<FlacWriter>());
    }

    #[test]
    fn test_broken_sniffer_is_skipped() {
        let mut registry = Registry::new();
        registry.register_reader::<Broken>();
        registry.register_reader::<Greedy>();

        let mut reader = registry
            .create_reader_from_memory(b"anything")
            .unwrap()
            .expect("greedy reader matches");
        let info = reader.open(Box::new(Cursor::new(Vec::<u8>::new()))).unwrap();
        assert_eq!(info.sample_count, 7);
    }

    #[test]
    fn test_writer_lookup_by_extension() {
        let registry = Registry::with_defaults();
        assert!(registry.create_writer_from_filename("a.wav").is_some());
        assert!(registry.create_writer_from_filename("a.FLAC").is_some());
        assert!(registry.create_writer_from_filename("a.ogg").is_none());
        assert!(Registry::new().create_writer_from_filename("a.wav").is_none());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let registry = Registry::with_defaults();
        assert!(matches!(
            registry.create_reader_from_filename("/definitely/not/here.wav"),
            Err(crate::Error::Io(_))
        ));
    }

    #[test]
    fn test_global_is_populated_once() {
        let first = global() as *const _;
        let second = global() as *const _;
        assert_eq!(first, second);
        assert!(with_global(|r| r.is_reader_registered::<WavReader>()));
    }
}
