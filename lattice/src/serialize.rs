//! Wire codec: maps typed values onto flat byte buffers in the configured
//! network byte order.
//!
//! Serialization appends to a [`ByteBuffer`] and cannot fail; deserialization
//! reads from a slice through an explicit cursor and fails with
//! `Error::Truncated` whenever the cursor would pass the end of the buffer.
//! Composites get their impls from `#[derive(Record)]`, which walks fields in
//! declaration order.

use crate::error::{Error, Result};
use byteorder::ByteOrder;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// Scratch buffer type used throughout the wire layer.
pub type ByteBuffer = Vec<u8>;

/// Byte order used on the wire. Little endian unless the `big-endian`
/// feature is enabled; both peers must be built the same way.
#[cfg(not(feature = "big-endian"))]
pub type NetOrder = byteorder::LittleEndian;

#[cfg(feature = "big-endian")]
pub type NetOrder = byteorder::BigEndian;

pub trait Serialize {
    fn serialize(&self, buf: &mut ByteBuffer);
}

pub trait Deserialize: Sized {
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self>;
}

/// Takes `count` bytes starting at the cursor, advancing it. The only way
/// the cursor moves past the end of the buffer is by returning `Truncated`
/// first.
#[inline]
pub fn take_bytes<'a>(buf: &'a [u8], pos: &mut usize, count: usize) -> Result<&'a [u8]> {
    let end = pos.checked_add(count).ok_or(Error::Truncated)?;

    if end > buf.len() {
        return Err(Error::Truncated);
    }

    let slice = &buf[*pos..end];
    *pos = end;
    Ok(slice)
}

/// Appends a raw byte run without a length prefix.
#[inline]
pub fn serialize_bytes(buf: &mut ByteBuffer, bytes: &[u8]) {
    buf.extend_from_slice(bytes);
}

/// Reads a raw byte run of known size.
#[inline]
pub fn deserialize_bytes(buf: &[u8], pos: &mut usize, out: &mut [u8]) -> Result<()> {
    let raw = take_bytes(buf, pos, out.len())?;
    out.copy_from_slice(raw);
    Ok(())
}

impl Serialize for u8 {
    #[inline]
    fn serialize(&self, buf: &mut ByteBuffer) {
        buf.push(*self);
    }
}

impl Deserialize for u8 {
    #[inline]
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        Ok(take_bytes(buf, pos, 1)?[0])
    }
}

impl Serialize for i8 {
    #[inline]
    fn serialize(&self, buf: &mut ByteBuffer) {
        buf.push(*self as u8);
    }
}

impl Deserialize for i8 {
    #[inline]
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        Ok(take_bytes(buf, pos, 1)?[0] as i8)
    }
}

macro_rules! impl_scalar {
    ($($ty:ty, $size:expr, $write:ident, $read:ident;)*) => {$(
        impl Serialize for $ty {
            #[inline]
            fn serialize(&self, buf: &mut ByteBuffer) {
                let mut raw = [0u8; $size];
                NetOrder::$write(&mut raw, *self);
                buf.extend_from_slice(&raw);
            }
        }

        impl Deserialize for $ty {
            #[inline]
            fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
                let raw = take_bytes(buf, pos, $size)?;
                Ok(NetOrder::$read(raw))
            }
        }
    )*};
}

impl_scalar! {
    u16, 2, write_u16, read_u16;
    u32, 4, write_u32, read_u32;
    u64, 8, write_u64, read_u64;
    u128, 16, write_u128, read_u128;
    i16, 2, write_i16, read_i16;
    i32, 4, write_i32, read_i32;
    i64, 8, write_i64, read_i64;
    i128, 16, write_i128, read_i128;
    f32, 4, write_f32, read_f32;
    f64, 8, write_f64, read_f64;
}

// Sizes and counts travel at the platform pointer width, like the original
// size_t payloads. Peers must share a pointer width.
#[cfg(target_pointer_width = "64")]
impl Serialize for usize {
    #[inline]
    fn serialize(&self, buf: &mut ByteBuffer) {
        (*self as u64).serialize(buf);
    }
}

#[cfg(target_pointer_width = "64")]
impl Deserialize for usize {
    #[inline]
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        Ok(u64::deserialize(buf, pos)? as usize)
    }
}

#[cfg(target_pointer_width = "32")]
impl Serialize for usize {
    #[inline]
    fn serialize(&self, buf: &mut ByteBuffer) {
        (*self as u32).serialize(buf);
    }
}

#[cfg(target_pointer_width = "32")]
impl Deserialize for usize {
    #[inline]
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        Ok(u32::deserialize(buf, pos)? as usize)
    }
}

#[cfg(target_pointer_width = "64")]
impl Serialize for isize {
    #[inline]
    fn serialize(&self, buf: &mut ByteBuffer) {
        (*self as i64).serialize(buf);
    }
}

#[cfg(target_pointer_width = "64")]
impl Deserialize for isize {
    #[inline]
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        Ok(i64::deserialize(buf, pos)? as isize)
    }
}

#[cfg(target_pointer_width = "32")]
impl Serialize for isize {
    #[inline]
    fn serialize(&self, buf: &mut ByteBuffer) {
        (*self as i32).serialize(buf);
    }
}

#[cfg(target_pointer_width = "32")]
impl Deserialize for isize {
    #[inline]
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        Ok(i32::deserialize(buf, pos)? as isize)
    }
}

impl Serialize for char {
    #[inline]
    fn serialize(&self, buf: &mut ByteBuffer) {
        (*self as u32).serialize(buf);
    }
}

impl Deserialize for char {
    #[inline]
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        let raw = u32::deserialize(buf, pos)?;
        ::std::char::from_u32(raw).ok_or(Error::InvalidUtf8)
    }
}

impl Serialize for bool {
    #[inline]
    fn serialize(&self, buf: &mut ByteBuffer) {
        buf.push(if *self { 1 } else { 0 });
    }
}

impl Deserialize for bool {
    #[inline]
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        Ok(u8::deserialize(buf, pos)? != 0)
    }
}

/// Boolean arrays pack one bit per value, LSB first within each byte,
/// `ceil(N / 8)` bytes total.
impl<const N: usize> Serialize for [bool; N] {
    fn serialize(&self, buf: &mut ByteBuffer) {
        let start = buf.len();
        buf.resize(start + (N + 7) / 8, 0);

        for (index, &value) in self.iter().enumerate() {
            if value {
                buf[start + index / 8] |= 1 << (index % 8);
            }
        }
    }
}

impl<const N: usize> Deserialize for [bool; N] {
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        let raw = take_bytes(buf, pos, (N + 7) / 8)?;
        let mut out = [false; N];

        for (index, slot) in out.iter_mut().enumerate() {
            *slot = raw[index / 8] & (1 << (index % 8)) != 0;
        }

        Ok(out)
    }
}

// Fixed arrays of scalar elements: N consecutive element serializations.
// Generated per element type; a blanket array impl would collide with the
// bit-packed bool form.
macro_rules! impl_scalar_array {
    ($($ty:ty),*) => {$(
        impl<const N: usize> Serialize for [$ty; N] {
            fn serialize(&self, buf: &mut ByteBuffer) {
                for value in self.iter() {
                    value.serialize(buf);
                }
            }
        }

        impl<const N: usize> Deserialize for [$ty; N] {
            fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
                let mut out = [<$ty>::default(); N];

                for slot in out.iter_mut() {
                    *slot = Deserialize::deserialize(buf, pos)?;
                }

                Ok(out)
            }
        }
    )*};
}

impl_scalar_array!(u8, i8, u16, i16, u32, i32, u64, i64, u128, i128, f32, f64, usize, isize);

impl<T: Serialize> Serialize for Vec<T> {
    fn serialize(&self, buf: &mut ByteBuffer) {
        self.len().serialize(buf);

        for value in self {
            value.serialize(buf);
        }
    }
}

impl<T: Deserialize> Deserialize for Vec<T> {
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        let count = usize::deserialize(buf, pos)?;
        // Cap the preallocation by the bytes actually left; a hostile count
        // must not drive the allocator.
        let mut out = Vec::with_capacity(count.min(buf.len() - *pos));

        for _ in 0..count {
            out.push(T::deserialize(buf, pos)?);
        }

        Ok(out)
    }
}

impl<T: Serialize> Serialize for VecDeque<T> {
    fn serialize(&self, buf: &mut ByteBuffer) {
        self.len().serialize(buf);

        for value in self {
            value.serialize(buf);
        }
    }
}

impl<T: Deserialize> Deserialize for VecDeque<T> {
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        let count = usize::deserialize(buf, pos)?;
        let mut out = VecDeque::with_capacity(count.min(buf.len() - *pos));

        for _ in 0..count {
            out.push_back(T::deserialize(buf, pos)?);
        }

        Ok(out)
    }
}

impl Serialize for String {
    fn serialize(&self, buf: &mut ByteBuffer) {
        self.len().serialize(buf);
        buf.extend_from_slice(self.as_bytes());
    }
}

impl Deserialize for String {
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        let count = usize::deserialize(buf, pos)?;
        let raw = take_bytes(buf, pos, count)?;

        String::from_utf8(raw.to_vec()).map_err(|_| Error::InvalidUtf8)
    }
}

impl<K: Serialize, V: Serialize> Serialize for BTreeMap<K, V> {
    fn serialize(&self, buf: &mut ByteBuffer) {
        self.len().serialize(buf);

        for (key, value) in self {
            key.serialize(buf);
            value.serialize(buf);
        }
    }
}

impl<K: Deserialize + Ord, V: Deserialize> Deserialize for BTreeMap<K, V> {
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        let count = usize::deserialize(buf, pos)?;
        let mut out = BTreeMap::new();

        for _ in 0..count {
            let key = K::deserialize(buf, pos)?;
            let value = V::deserialize(buf, pos)?;
            out.insert(key, value);
        }

        Ok(out)
    }
}

impl<K: Serialize, V: Serialize> Serialize for HashMap<K, V> {
    fn serialize(&self, buf: &mut ByteBuffer) {
        self.len().serialize(buf);

        for (key, value) in self {
            key.serialize(buf);
            value.serialize(buf);
        }
    }
}

impl<K, V> Deserialize for HashMap<K, V>
where
    K: Deserialize + Eq + ::std::hash::Hash,
    V: Deserialize,
{
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        let count = usize::deserialize(buf, pos)?;
        let mut out = HashMap::with_capacity(count.min(buf.len() - *pos));

        for _ in 0..count {
            let key = K::deserialize(buf, pos)?;
            let value = V::deserialize(buf, pos)?;
            out.insert(key, value);
        }

        Ok(out)
    }
}

impl<T: Serialize> Serialize for BTreeSet<T> {
    fn serialize(&self, buf: &mut ByteBuffer) {
        self.len().serialize(buf);

        for value in self {
            value.serialize(buf);
        }
    }
}

impl<T: Deserialize + Ord> Deserialize for BTreeSet<T> {
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        let count = usize::deserialize(buf, pos)?;
        let mut out = BTreeSet::new();

        for _ in 0..count {
            out.insert(T::deserialize(buf, pos)?);
        }

        Ok(out)
    }
}

impl<T: Serialize> Serialize for HashSet<T> {
    fn serialize(&self, buf: &mut ByteBuffer) {
        self.len().serialize(buf);

        for value in self {
            value.serialize(buf);
        }
    }
}

impl<T: Deserialize + Eq + ::std::hash::Hash> Deserialize for HashSet<T> {
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        let count = usize::deserialize(buf, pos)?;
        let mut out = HashSet::with_capacity(count.min(buf.len() - *pos));

        for _ in 0..count {
            out.insert(T::deserialize(buf, pos)?);
        }

        Ok(out)
    }
}

impl<T: Serialize> Serialize for Box<T> {
    #[inline]
    fn serialize(&self, buf: &mut ByteBuffer) {
        (**self).serialize(buf);
    }
}

impl<T: Deserialize> Deserialize for Box<T> {
    #[inline]
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        Ok(Box::new(T::deserialize(buf, pos)?))
    }
}

/// Optionals travel as a presence flag followed by the value when present.
impl<T: Serialize> Serialize for Option<T> {
    fn serialize(&self, buf: &mut ByteBuffer) {
        match self {
            Some(value) => {
                true.serialize(buf);
                value.serialize(buf);
            }
            None => false.serialize(buf),
        }
    }
}

impl<T: Deserialize> Deserialize for Option<T> {
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        if bool::deserialize(buf, pos)? {
            Ok(Some(T::deserialize(buf, pos)?))
        } else {
            Ok(None)
        }
    }
}

macro_rules! impl_tuple {
    ($($ty:ident => $idx:tt),+) => {
        impl<$($ty: Serialize),+> Serialize for ($($ty,)+) {
            fn serialize(&self, buf: &mut ByteBuffer) {
                $(self.$idx.serialize(buf);)+
            }
        }

        impl<$($ty: Deserialize),+> Deserialize for ($($ty,)+) {
            fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
                Ok(($(<$ty as Deserialize>::deserialize(buf, pos)?,)+))
            }
        }
    };
}

impl_tuple!(T0 => 0);
impl_tuple!(T0 => 0, T1 => 1);
impl_tuple!(T0 => 0, T1 => 1, T2 => 2);
impl_tuple!(T0 => 0, T1 => 1, T2 => 2, T3 => 3);
impl_tuple!(T0 => 0, T1 => 1, T2 => 2, T3 => 3, T4 => 4);
impl_tuple!(T0 => 0, T1 => 1, T2 => 2, T3 => 3, T4 => 4, T5 => 5);
impl_tuple!(T0 => 0, T1 => 1, T2 => 2, T3 => 3, T4 => 4, T5 => 5, T6 => 6);
impl_tuple!(T0 => 0, T1 => 1, T2 => 2, T3 => 3, T4 => 4, T5 => 5, T6 => 6, T7 => 7);
impl_tuple!(T0 => 0, T1 => 1, T2 => 2, T3 => 3, T4 => 4, T5 => 5, T6 => 6, T7 => 7, T8 => 8);
impl_tuple!(T0 => 0, T1 => 1, T2 => 2, T3 => 3, T4 => 4, T5 => 5, T6 => 6, T7 => 7, T8 => 8, T9 => 9);
impl_tuple!(T0 => 0, T1 => 1, T2 => 2, T3 => 3, T4 => 4, T5 => 5, T6 => 6, T7 => 7, T8 => 8, T9 => 9, T10 => 10);
impl_tuple!(T0 => 0, T1 => 1, T2 => 2, T3 => 3, T4 => 4, T5 => 5, T6 => 6, T7 => 7, T8 => 8, T9 => 9, T10 => 10, T11 => 11);
