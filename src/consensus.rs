//! Binary encoding of swap data: persisted swap states, contracts exchanged between participants
//! and funding references.
//!
//! Ledger types are converted with [`CanonicalBytes`], following the encoding of their own
//! ledger, and embedded in swap records as length prefixed vectors of bytes. Integers are little
//! endian and vectors are prefixed with a `u16` length.

use thiserror::Error;

use std::error;
use std::io;
use std::str;

/// Encoding and decoding errors and data transformation errors.
#[derive(Error, Debug)]
pub enum Error {
    /// The type is not defined in the consensus.
    #[error("Unknown consensus type")]
    UnknownType,
    /// And I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// A generic parsing error.
    #[error("Parsing error: {0}")]
    ParseFailed(&'static str),
    /// Any Consensus error not part of this list.
    #[error("Consensus error: {0}")]
    Other(Box<dyn error::Error + Send + Sync>),
}

impl Error {
    /// Creates a new error of type [`Self::Other`] with an arbitrary payload. Useful to carry
    /// lower-level errors.
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Self::Other(error.into())
    }

    /// Consumes the `Error`, returning its inner error (if any).
    ///
    /// If this [`enum@Error`] was constructed via [`new`] then this function will return [`Some`],
    /// otherwise it will return [`None`].
    ///
    /// [`new`]: Error::new
    ///
    pub fn into_inner(self) -> Option<Box<dyn error::Error + Send + Sync>> {
        match self {
            Self::Other(error) => Some(error),
            _ => None,
        }
    }
}

/// Data represented in a canonical bytes format. The implementer **MUST** use the strict encoding
/// dictated by the blockchain consensus without any length prefix. Length prefix is done during
/// the serialization with [`wrap_in_vec`] and [`unwrap_from_vec`].
pub trait CanonicalBytes {
    /// Returns the canonical bytes representation of the element.
    fn as_canonical_bytes(&self) -> Vec<u8>;

    /// Parse a supposedly canonical bytes representation of an element and return it, return an
    /// error if not canonical.
    fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, Error>
    where
        Self: Sized;
}

impl<T> CanonicalBytes for Option<T>
where
    T: CanonicalBytes,
{
    fn as_canonical_bytes(&self) -> Vec<u8> {
        match self {
            Some(t) => t.as_canonical_bytes(),
            None => vec![],
        }
    }

    fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, Error>
    where
        Self: Sized,
    {
        match bytes.len() {
            0 => Ok(None),
            _ => Ok(Some(T::from_canonical_bytes(bytes)?)),
        }
    }
}

/// Encode an object into a vector of bytes. The vector can be [`deserialize`]d to retrieve the
/// data.
pub fn serialize<T: Encodable + std::fmt::Debug + ?Sized>(data: &T) -> Vec<u8> {
    let mut encoder = Vec::new();
    // writing into a vector never fails
    let len = data.consensus_encode(&mut encoder).unwrap_or_default();
    debug_assert_eq!(len, encoder.len());
    encoder
}

/// Decode an object from bytes produced by [`serialize`]. Trailing bytes are an error, a record
/// is always decoded entirely.
pub fn deserialize<T: Decodable>(data: &[u8]) -> Result<T, Error> {
    let mut decoder = io::Cursor::new(data);
    let rv = Decodable::consensus_decode(&mut decoder)?;
    match decoder.position() as usize == data.len() {
        true => Ok(rv),
        false => Err(Error::ParseFailed(
            "data not consumed entirely when explicitly deserializing",
        )),
    }
}

/// Data which can be encoded in a consensus-consistent way.
pub trait Encodable {
    /// Encode an object with a well-defined format, should only ever error if the underlying
    /// encoder errors. If successful, returns size of the encoded object in bytes.
    ///
    /// The only errors returned are errors propagated from the writer.
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error>;
}

/// Data which can be decoded in a consensus-consistent way.
pub trait Decodable: Sized {
    /// Decode an object with a well-defined format
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, Error>;
}

/// Encode a [`CanonicalBytes`] element as a length prefixed vector of bytes.
pub fn wrap_in_vec<T, W>(t: &T, writer: &mut W) -> Result<usize, io::Error>
where
    T: CanonicalBytes,
    W: io::Write,
{
    t.as_canonical_bytes().consensus_encode(writer)
}

/// Decode a length prefixed vector of bytes into a [`CanonicalBytes`] element.
pub fn unwrap_from_vec<T, D>(d: &mut D) -> Result<T, Error>
where
    T: CanonicalBytes,
    D: io::Read,
{
    let bytes: Vec<u8> = Decodable::consensus_decode(d)?;
    T::from_canonical_bytes(&bytes)
}

impl<T> Encodable for Vec<T>
where
    T: Encodable,
{
    #[inline]
    fn consensus_encode<S: io::Write>(&self, s: &mut S) -> Result<usize, io::Error> {
        if self.len() > u16::MAX as usize {
            return Err(io::Error::new(io::ErrorKind::Other, "Value is too long"));
        }
        let mut len = (self.len() as u16).consensus_encode(s)?;
        for t in self {
            len += t.consensus_encode(s)?;
        }
        Ok(len)
    }
}

impl<T> Decodable for Vec<T>
where
    T: Decodable,
{
    #[inline]
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, Error> {
        let len = u16::consensus_decode(d)?;
        let mut ret = Vec::<T>::with_capacity(len as usize);
        for _ in 0..len {
            ret.push(Decodable::consensus_decode(d)?);
        }
        Ok(ret)
    }
}

macro_rules! impl_fixed_array {
    ($len: expr) => {
        impl Encodable for [u8; $len] {
            #[inline]
            fn consensus_encode<S: io::Write>(&self, s: &mut S) -> Result<usize, io::Error> {
                s.write_all(&self[..])?;
                Ok($len)
            }
        }

        impl Decodable for [u8; $len] {
            #[inline]
            fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, Error> {
                let mut buffer = [0u8; $len];
                d.read_exact(&mut buffer)?;
                Ok(buffer)
            }
        }
    };
}

impl_fixed_array!(16);
impl_fixed_array!(20);
impl_fixed_array!(32);

macro_rules! impl_le_int {
    ($ty: ty, $len: expr) => {
        impl Encodable for $ty {
            #[inline]
            fn consensus_encode<S: io::Write>(&self, s: &mut S) -> Result<usize, io::Error> {
                s.write_all(&self.to_le_bytes())?;
                Ok($len)
            }
        }

        impl Decodable for $ty {
            #[inline]
            fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, Error> {
                let mut buffer = [0u8; $len];
                d.read_exact(&mut buffer)?;
                Ok(<$ty>::from_le_bytes(buffer))
            }
        }
    };
}

impl_le_int!(u8, 1);
impl_le_int!(u16, 2);
impl_le_int!(u32, 4);
impl_le_int!(u64, 8);
impl_le_int!(u128, 16);

impl<T> Encodable for Option<T>
where
    T: Encodable,
{
    #[inline]
    fn consensus_encode<S: io::Write>(&self, s: &mut S) -> Result<usize, io::Error> {
        match self {
            Some(t) => {
                s.write_all(&[1u8])?;
                let len = t.consensus_encode(s)?;
                Ok(1 + len)
            }
            None => s.write_all(&[0u8]).map(|_| 1),
        }
    }
}

impl<T> Decodable for Option<T>
where
    T: Decodable,
{
    #[inline]
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, Error> {
        match u8::consensus_decode(d)? {
            1u8 => Ok(Some(Decodable::consensus_decode(d)?)),
            0u8 => Ok(None),
            _ => Err(Error::UnknownType),
        }
    }
}

impl CanonicalBytes for String {
    fn as_canonical_bytes(&self) -> Vec<u8> {
        self.as_bytes().into()
    }

    fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, Error>
    where
        Self: Sized,
    {
        Ok(str::from_utf8(bytes).map_err(Error::new)?.into())
    }
}

impl Encodable for String {
    #[inline]
    fn consensus_encode<S: io::Write>(&self, s: &mut S) -> Result<usize, io::Error> {
        Vec::<u8>::from(self.as_bytes()).consensus_encode(s)
    }
}

impl Decodable for String {
    #[inline]
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, Error> {
        let bytes: Vec<u8> = Decodable::consensus_decode(d)?;
        Ok(str::from_utf8(bytes.as_ref()).map_err(Error::new)?.into())
    }
}

/// Implements `StrictEncode` and `StrictDecode` on a type implementing [`Encodable`] and
/// [`Decodable`].
#[macro_export]
macro_rules! impl_strict_encoding {
    ($thing:ty) => {
        impl strict_encoding::StrictEncode for $thing {
            fn strict_encode<E: ::std::io::Write>(
                &self,
                mut e: E,
            ) -> Result<usize, strict_encoding::Error> {
                $crate::consensus::Encodable::consensus_encode(self, &mut e)
                    .map_err(strict_encoding::Error::from)
            }
        }

        impl strict_encoding::StrictDecode for $thing {
            fn strict_decode<D: ::std::io::Read>(
                mut d: D,
            ) -> Result<Self, strict_encoding::Error> {
                $crate::consensus::Decodable::consensus_decode(&mut d)
                    .map_err(|e| strict_encoding::Error::DataIntegrityError(e.to_string()))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endianness_test() {
        assert_eq!(&[0xef, 0xbe, 0xad, 0xde], &serialize(&0xdeadbeefu32)[..]);
        assert_eq!(
            deserialize::<u32>(&[0xef, 0xbe, 0xad, 0xde]).unwrap(),
            0xdeadbeef
        );
        assert_eq!(&[0x01], &serialize(&0x01u8)[..]);
        assert_eq!(deserialize::<u8>(&[0x01]).unwrap(), 0x01);
    }

    #[test]
    fn length_prefixed_vec() {
        let vec: Vec<u8> = vec![0xde, 0xad, 0xbe, 0xef];
        assert_eq!(serialize(&vec), vec![0x04, 0x00, 0xde, 0xad, 0xbe, 0xef]);
        let vec = vec![0x41; u16::MAX.into()];
        assert_eq!(deserialize::<Vec<u8>>(&serialize(&vec)[..]).unwrap(), vec);
        // one element too many for the length prefix
        let mut writer = vec![];
        assert!(vec![0x41u8; u16::MAX as usize + 1]
            .consensus_encode(&mut writer)
            .is_err());
    }

    #[test]
    fn reject_trailing_bytes() {
        assert!(deserialize::<u16>(&[0x01, 0x00, 0xff]).is_err());
    }

    #[test]
    fn optional_values() {
        assert_eq!(serialize(&Some(0x2au8)), vec![0x01, 0x2a]);
        assert_eq!(serialize(&None::<u8>), vec![0x00]);
        assert!(matches!(
            deserialize::<Option<u8>>(&[0x02, 0x2a]),
            Err(Error::UnknownType)
        ));
        // an empty canonical representation is none
        assert_eq!(Option::<String>::from_canonical_bytes(&[]).unwrap(), None);
        assert_eq!(
            Some(String::from("0xabc")).as_canonical_bytes(),
            b"0xabc".to_vec()
        );
    }

    #[test]
    fn strings_and_wrapped_bytes() {
        let account = String::from("0x5fbdb2315678afecb367f032d93f642f64180aa3");
        assert_eq!(deserialize::<String>(&serialize(&account)).unwrap(), account);
        assert!(deserialize::<String>(&[0x01, 0x00, 0xff]).is_err());

        let mut writer = vec![];
        wrap_in_vec(&account, &mut writer).unwrap();
        let unwrapped: String = unwrap_from_vec(&mut io::Cursor::new(writer)).unwrap();
        assert_eq!(unwrapped, account);
    }
}
