//! Growable packet buffer with typed, order-dependent extraction
//!
//! Values are appended in the order the sender writes them and must be
//! extracted in the same order with the same types; the wire format
//! carries no type tags.
//!
//! # Wire format
//!
//! ```text
//! bool          1 byte, 0 or 1
//! i8/u8         1 byte
//! i16/u16       2 bytes big-endian
//! i32/u32/f32   4 bytes big-endian (floats as IEEE-754 bits)
//! i64/u64/f64   8 bytes big-endian
//! string        u32 byte length + UTF-8 bytes
//! wide string   u32 code point count + count * 4 bytes big-endian UTF-32
//! ```
//!
//! A read that finds fewer bytes than it needs returns the type's default
//! value, leaves the cursor where it was and marks the packet invalid.
//! Invalidity is sticky until [`Packet::clear`].

/// Byte size of one wide-string code unit
const WIDE_UNIT_SIZE: usize = 4;

/// Typed byte buffer used to frame messages for a transport peer
#[derive(Debug)]
pub struct Packet {
    data: Vec<u8>,
    read_pos: usize,
    is_valid: bool,
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies share no storage. The copy starts reading from the beginning
/// and is valid regardless of the source's state.
impl Clone for Packet {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            read_pos: 0,
            is_valid: true,
        }
    }
}

impl From<Vec<u8>> for Packet {
    fn from(data: Vec<u8>) -> Self {
        Self {
            data,
            read_pos: 0,
            is_valid: true,
        }
    }
}

impl From<&[u8]> for Packet {
    fn from(data: &[u8]) -> Self {
        Self::from(data.to_vec())
    }
}

impl Packet {
    /// Create an empty packet
    #[inline]
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            read_pos: 0,
            is_valid: true,
        }
    }

    /// Create an empty packet with room for `capacity` bytes
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            read_pos: 0,
            is_valid: true,
        }
    }

    /// Append raw bytes to the end of the packet
    #[inline]
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Empty the packet and reset the cursor and validity flag
    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
        self.is_valid = true;
    }

    /// Packet contents
    ///
    /// The borrow ends before any further write, so the slice can never
    /// observe a reallocation.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of bytes in the packet
    #[inline]
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Consume the packet and return its bytes
    #[inline]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Current extraction offset
    #[inline]
    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    /// Bytes left to extract
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_pos
    }

    /// True once every byte has been extracted
    #[inline]
    pub fn end_of_packet(&self) -> bool {
        self.read_pos == self.data.len()
    }

    /// False once any extraction has under-read
    #[inline]
    pub fn can_read(&self) -> bool {
        self.is_valid
    }

    /// Write any [`Pack`] value
    #[inline]
    pub fn write<T: Pack + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.pack(self);
        self
    }

    /// Read any [`Unpack`] value
    #[inline]
    pub fn read<T: Unpack>(&mut self) -> T {
        T::unpack(self)
    }

    /// Write a bool as a single 0/1 byte
    #[inline]
    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write_u8(u8::from(value))
    }

    /// Write an i8 value
    #[inline]
    pub fn write_i8(&mut self, value: i8) -> &mut Self {
        self.append(&value.to_be_bytes());
        self
    }

    /// Write a u8 value
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.data.push(value);
        self
    }

    /// Write an i16 value (big-endian)
    #[inline]
    pub fn write_i16(&mut self, value: i16) -> &mut Self {
        self.append(&value.to_be_bytes());
        self
    }

    /// Write a u16 value (big-endian)
    #[inline]
    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        self.append(&value.to_be_bytes());
        self
    }

    /// Write an i32 value (big-endian)
    #[inline]
    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.append(&value.to_be_bytes());
        self
    }

    /// Write a u32 value (big-endian)
    #[inline]
    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.append(&value.to_be_bytes());
        self
    }

    /// Write an i64 value (big-endian)
    #[inline]
    pub fn write_i64(&mut self, value: i64) -> &mut Self {
        self.append(&value.to_be_bytes());
        self
    }

    /// Write a u64 value (big-endian)
    #[inline]
    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.append(&value.to_be_bytes());
        self
    }

    /// Write an f32 value (big-endian IEEE-754)
    #[inline]
    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        self.append(&value.to_be_bytes());
        self
    }

    /// Write an f64 value (big-endian IEEE-754)
    #[inline]
    pub fn write_f64(&mut self, value: f64) -> &mut Self {
        self.append(&value.to_be_bytes());
        self
    }

    /// Write a UTF-8 string with a u32 byte-length prefix
    ///
    /// Strings longer than `u32::MAX` bytes are cut at the last character
    /// boundary that fits, so the reader always gets valid UTF-8.
    #[inline]
    pub fn write_string(&mut self, value: &str) -> &mut Self {
        let prefix = utf8_prefix(value, u32::MAX as usize);
        self.write_u32(prefix.len() as u32);
        self.append(prefix.as_bytes());
        self
    }

    /// Write a string as UTF-32 code points with a u32 count prefix
    #[inline]
    pub fn write_wide_string(&mut self, value: &str) -> &mut Self {
        let count = value.chars().count();
        self.write_u32(u32::try_from(count).unwrap_or(u32::MAX));
        self.data.reserve(count * WIDE_UNIT_SIZE);
        for c in value.chars().take(u32::MAX as usize) {
            self.write_u32(u32::from(c));
        }
        self
    }

    /// Read a bool (any non-zero byte is true)
    #[inline]
    pub fn read_bool(&mut self) -> bool {
        self.read_u8() != 0
    }

    /// Read an i8 value
    #[inline]
    pub fn read_i8(&mut self) -> i8 {
        self.take::<1>().map(i8::from_be_bytes).unwrap_or_default()
    }

    /// Read a u8 value
    #[inline]
    pub fn read_u8(&mut self) -> u8 {
        self.take::<1>().map(u8::from_be_bytes).unwrap_or_default()
    }

    /// Read an i16 value (big-endian)
    #[inline]
    pub fn read_i16(&mut self) -> i16 {
        self.take::<2>().map(i16::from_be_bytes).unwrap_or_default()
    }

    /// Read a u16 value (big-endian)
    #[inline]
    pub fn read_u16(&mut self) -> u16 {
        self.take::<2>().map(u16::from_be_bytes).unwrap_or_default()
    }

    /// Read an i32 value (big-endian)
    #[inline]
    pub fn read_i32(&mut self) -> i32 {
        self.take::<4>().map(i32::from_be_bytes).unwrap_or_default()
    }

    /// Read a u32 value (big-endian)
    #[inline]
    pub fn read_u32(&mut self) -> u32 {
        self.take::<4>().map(u32::from_be_bytes).unwrap_or_default()
    }

    /// Read an i64 value (big-endian)
    #[inline]
    pub fn read_i64(&mut self) -> i64 {
        self.take::<8>().map(i64::from_be_bytes).unwrap_or_default()
    }

    /// Read a u64 value (big-endian)
    #[inline]
    pub fn read_u64(&mut self) -> u64 {
        self.take::<8>().map(u64::from_be_bytes).unwrap_or_default()
    }

    /// Read an f32 value (big-endian IEEE-754)
    #[inline]
    pub fn read_f32(&mut self) -> f32 {
        self.take::<4>().map(f32::from_be_bytes).unwrap_or_default()
    }

    /// Read an f64 value (big-endian IEEE-754)
    #[inline]
    pub fn read_f64(&mut self) -> f64 {
        self.take::<8>().map(f64::from_be_bytes).unwrap_or_default()
    }

    /// Read a length-prefixed UTF-8 string
    ///
    /// Invalid UTF-8 is treated like an under-read.
    pub fn read_string(&mut self) -> String {
        self.read_prefixed(1, |bytes| {
            std::str::from_utf8(bytes).ok().map(str::to_owned)
        })
    }

    /// Read a count-prefixed UTF-32 string
    ///
    /// Code units that are not Unicode scalar values are treated like an
    /// under-read.
    pub fn read_wide_string(&mut self) -> String {
        self.read_prefixed(WIDE_UNIT_SIZE, |bytes| {
            bytes
                .chunks_exact(WIDE_UNIT_SIZE)
                .map(|unit| char::from_u32(u32::from_be_bytes([unit[0], unit[1], unit[2], unit[3]])))
                .collect()
        })
    }

    /// Shared body of the string readers: u32 element count, then
    /// `count * unit_size` bytes handed to `decode`.
    fn read_prefixed<F>(&mut self, unit_size: usize, decode: F) -> String
    where
        F: FnOnce(&[u8]) -> Option<String>,
    {
        let start = self.read_pos;
        let count = self.read_u32();
        if !self.is_valid {
            return String::new();
        }

        let Some(len) = (count as usize).checked_mul(unit_size) else {
            self.invalidate(start);
            return String::new();
        };
        if !self.check_size(len) {
            self.read_pos = start;
            return String::new();
        }

        match decode(&self.data[self.read_pos..self.read_pos + len]) {
            Some(value) => {
                self.read_pos += len;
                value
            }
            None => {
                self.invalidate(start);
                String::new()
            }
        }
    }

    /// Extract exactly `N` bytes, or nothing
    #[inline]
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        if !self.check_size(N) {
            return None;
        }
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.data[self.read_pos..self.read_pos + N]);
        self.read_pos += N;
        Some(bytes)
    }

    /// Latch the validity flag off unless `size` bytes remain
    #[inline]
    fn check_size(&mut self, size: usize) -> bool {
        self.is_valid = self.is_valid && self.remaining() >= size;
        self.is_valid
    }

    #[inline]
    fn invalidate(&mut self, rewind_to: usize) {
        self.is_valid = false;
        self.read_pos = rewind_to;
    }
}

/// Types that can be written into a [`Packet`]
pub trait Pack {
    /// Append `self` in its wire representation
    fn pack(&self, packet: &mut Packet);
}

/// Types that can be extracted from a [`Packet`]
///
/// Implementations return the type's default value when the packet is
/// invalid or too short.
pub trait Unpack: Sized {
    /// Extract the next value
    fn unpack(packet: &mut Packet) -> Self;
}

macro_rules! impl_packable {
    ($($ty:ty => $write:ident, $read:ident;)*) => {
        $(
            impl Pack for $ty {
                #[inline]
                fn pack(&self, packet: &mut Packet) {
                    packet.$write(*self);
                }
            }

            impl Unpack for $ty {
                #[inline]
                fn unpack(packet: &mut Packet) -> Self {
                    packet.$read()
                }
            }
        )*
    };
}

impl_packable! {
    bool => write_bool, read_bool;
    i8 => write_i8, read_i8;
    u8 => write_u8, read_u8;
    i16 => write_i16, read_i16;
    u16 => write_u16, read_u16;
    i32 => write_i32, read_i32;
    u32 => write_u32, read_u32;
    i64 => write_i64, read_i64;
    u64 => write_u64, read_u64;
    f32 => write_f32, read_f32;
    f64 => write_f64, read_f64;
}

impl Pack for str {
    #[inline]
    fn pack(&self, packet: &mut Packet) {
        packet.write_string(self);
    }
}

impl Pack for String {
    #[inline]
    fn pack(&self, packet: &mut Packet) {
        packet.write_string(self);
    }
}

impl Unpack for String {
    #[inline]
    fn unpack(packet: &mut Packet) -> Self {
        packet.read_string()
    }
}

/// Longest prefix of `value` at most `max` bytes long ending on a char boundary
fn utf8_prefix(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
