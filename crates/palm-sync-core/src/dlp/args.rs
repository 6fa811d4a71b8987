//! DLP argument headers, argument slots and the typed argument map.
//!
//! Every DLP argument is preceded by a header whose first byte carries the
//! argument id in the low six bits and the header form in the top two:
//!
//! | form  | bits   | layout                            | max length |
//! |-------|--------|-----------------------------------|------------|
//! | Tiny  | `0x00` | id, len:8                         | 255        |
//! | Small | `0x80` | id, pad, len:16                   | 65535      |
//! | Long  | `0x40` | id, pad, len:32 (decode only)     | 2^32 - 1   |

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CodecError, CodecResult, ProtocolError};
use crate::wire::WireRead;

/// Header form bit for tiny arguments.
pub const TINY_FORM: u8 = 0x00;
/// Header form bit for small arguments.
pub const SMALL_FORM: u8 = 0x80;
/// Header form bit for long arguments.
pub const LONG_FORM: u8 = 0x40;

const FORM_MASK: u8 = 0xC0;
const ID_MASK: u8 = 0x3F;

/// Largest argument the request encoder accepts.
pub const MAX_ARG_SIZE: usize = u16::MAX as usize;

/// Wire identity of an argument slot: 0x20 plus the slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArgId(pub u8);

impl ArgId {
    /// Id of the first argument of a command.
    pub const FIRST: Self = Self(0x20);
    /// Id of the second argument of a command.
    pub const SECOND: Self = Self(0x21);

    pub const fn from_index(index: u8) -> Self {
        Self(0x20 + index)
    }

    pub const fn index(self) -> u8 {
        self.0 - 0x20
    }
}

impl fmt::Display for ArgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Header form of an encoded argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgForm {
    Tiny,
    Small,
    Long,
}

/// Decoded argument header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgHeader {
    pub id: ArgId,
    pub form: ArgForm,
    pub len: usize,
}

impl ArgHeader {
    /// Pick the smallest form that fits `len`.
    pub fn for_len(id: ArgId, len: usize) -> Option<Self> {
        let form = if len <= u8::MAX as usize {
            ArgForm::Tiny
        } else if len <= MAX_ARG_SIZE {
            ArgForm::Small
        } else {
            return None;
        };
        Some(Self { id, form, len })
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        match self.form {
            ArgForm::Tiny => {
                buf.put_u8(self.id.0 | TINY_FORM);
                buf.put_u8(self.len as u8);
            }
            ArgForm::Small => {
                buf.put_u8(self.id.0 | SMALL_FORM);
                buf.put_u8(0);
                buf.put_u16(self.len as u16);
            }
            ArgForm::Long => {
                buf.put_u8(self.id.0 | LONG_FORM);
                buf.put_u8(0);
                buf.put_u32(self.len as u32);
            }
        }
    }

    pub fn decode(data: &mut Bytes) -> CodecResult<Self> {
        let first = data.take_u8()?;
        let id = ArgId(first & ID_MASK);
        let (form, len) = match first & FORM_MASK {
            TINY_FORM => (ArgForm::Tiny, usize::from(data.take_u8()?)),
            SMALL_FORM => {
                data.skip(1)?;
                (ArgForm::Small, usize::from(data.take_u16()?))
            }
            LONG_FORM => {
                data.skip(1)?;
                (ArgForm::Long, data.take_u32()? as usize)
            }
            other => {
                return Err(CodecError::InvalidValue {
                    field: "DLP argument header",
                    value: format!("{other:#04x}"),
                })
            }
        };
        Ok(Self { id, form, len })
    }
}

/// Upcasting support for argument values.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A value that can be carried as a DLP argument.
pub trait DlpArg: AsAny + Send + Sync {
    /// Serialized size in bytes.
    fn encoded_len(&self) -> usize;

    /// Append the serialized value.
    fn encode(&self, buf: &mut BytesMut);

    /// Reject values whose embedded length fields would overflow. `encode`
    /// may only be called on values that pass.
    fn check(&self) -> CodecResult<()> {
        Ok(())
    }

    /// Human-readable form for logs.
    fn describe(&self) -> String;

    /// Concrete type name, used in error messages.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// An argument value that can be decoded from its serialized bytes.
pub trait DecodeArg: DlpArg + Sized {
    fn decode(data: &mut Bytes) -> CodecResult<Self>;
}

fn downcast_ref<T: DlpArg + 'static>(value: &dyn DlpArg) -> Option<&T> {
    AsAny::as_any(value).downcast_ref::<T>()
}

fn accepts<T: DlpArg + 'static>(value: &dyn DlpArg) -> bool {
    AsAny::as_any(value).is::<T>()
}

fn decode_boxed<T: DecodeArg + 'static>(mut data: Bytes) -> CodecResult<Box<dyn DlpArg>> {
    let value = T::decode(&mut data)?;
    if !data.is_empty() {
        tracing::trace!(
            trailing = data.len(),
            arg = std::any::type_name::<T>(),
            "ignoring trailing argument bytes"
        );
    }
    Ok(Box::new(value))
}

/// One position in a command's request or response argument list.
#[derive(Clone, Copy)]
pub struct ArgSlot {
    pub id: ArgId,
    pub name: &'static str,
    pub optional: bool,
    type_name: &'static str,
    decode: fn(Bytes) -> CodecResult<Box<dyn DlpArg>>,
    accepts: fn(&dyn DlpArg) -> bool,
}

impl ArgSlot {
    /// A slot that must always be present.
    pub fn required<T: DecodeArg + 'static>(index: u8, name: &'static str) -> Self {
        Self::new::<T>(index, name, false)
    }

    /// A slot that may be absent.
    pub fn optional<T: DecodeArg + 'static>(index: u8, name: &'static str) -> Self {
        Self::new::<T>(index, name, true)
    }

    fn new<T: DecodeArg + 'static>(index: u8, name: &'static str, optional: bool) -> Self {
        Self {
            id: ArgId::from_index(index),
            name,
            optional,
            type_name: std::any::type_name::<T>(),
            decode: decode_boxed::<T>,
            accepts: accepts::<T>,
        }
    }

    /// Name of the concrete type this slot holds.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Decode serialized bytes into this slot's concrete type.
    pub fn decode(&self, data: Bytes) -> CodecResult<Box<dyn DlpArg>> {
        (self.decode)(data)
    }

    /// Whether `value` has this slot's concrete type.
    pub fn accepts(&self, value: &dyn DlpArg) -> bool {
        (self.accepts)(value)
    }
}

impl fmt::Debug for ArgSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgSlot")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("optional", &self.optional)
            .field("type", &self.type_name)
            .finish()
    }
}

/// Typed argument values keyed by slot id.
#[derive(Default)]
pub struct ArgMap {
    values: HashMap<ArgId, Box<dyn DlpArg>>,
}

impl ArgMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with<T: DlpArg + 'static>(mut self, id: ArgId, value: T) -> Self {
        self.insert(id, value);
        self
    }

    /// Insert a value, replacing any previous one for `id`.
    pub fn insert<T: DlpArg + 'static>(&mut self, id: ArgId, value: T) {
        self.values.insert(id, Box::new(value));
    }

    /// Insert an already boxed value.
    pub fn insert_boxed(&mut self, id: ArgId, value: Box<dyn DlpArg>) {
        self.values.insert(id, value);
    }

    /// Typed lookup. Returns `None` when absent or of another type.
    pub fn get<T: DlpArg + 'static>(&self, id: ArgId) -> Option<&T> {
        self.values.get(&id).and_then(|v| downcast_ref::<T>(&**v))
    }

    /// Untyped lookup.
    pub fn get_dyn(&self, id: ArgId) -> Option<&dyn DlpArg> {
        self.values.get(&id).map(|v| &**v)
    }

    /// Remove and return a typed value.
    pub fn take<T: DlpArg + 'static>(&mut self, id: ArgId) -> Option<T> {
        if self.get::<T>(id).is_none() {
            return None;
        }
        let boxed = self.values.remove(&id)?;
        AsAny::into_any(boxed).downcast::<T>().ok().map(|b| *b)
    }

    /// Typed lookup that reports a missing value as a protocol error.
    pub fn require<T: DlpArg + 'static>(
        &self,
        command: &'static str,
        slot: &'static str,
        id: ArgId,
    ) -> Result<&T, ProtocolError> {
        match self.get_dyn(id) {
            None => Err(ProtocolError::MissingArgument {
                command,
                name: slot,
            }),
            Some(value) => downcast_ref::<T>(value).ok_or_else(|| ProtocolError::ArgumentType {
                name: slot,
                expected: std::any::type_name::<T>(),
                actual: value.type_name().to_string(),
            }),
        }
    }

    pub fn contains(&self, id: ArgId) -> bool {
        self.values.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Ids present, in ascending order.
    pub fn ids(&self) -> Vec<ArgId> {
        let mut ids: Vec<ArgId> = self.values.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl fmt::Debug for ArgMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for id in self.ids() {
            if let Some(value) = self.get_dyn(id) {
                map.entry(&id, &value.describe());
            }
        }
        map.finish()
    }
}

/// Raw bytes, for arguments whose structure is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawArg(pub Bytes);

impl DlpArg for RawArg {
    fn encoded_len(&self) -> usize {
        self.0.len()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.0);
    }

    fn describe(&self) -> String {
        if self.0.len() <= 32 {
            format!("RawArg({})", hex::encode(&self.0))
        } else {
            format!("RawArg({}... {} bytes)", hex::encode(&self.0[..32]), self.0.len())
        }
    }
}

impl DecodeArg for RawArg {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        Ok(Self(std::mem::take(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiny_header() {
        let header = ArgHeader::for_len(ArgId::FIRST, 200).unwrap();
        assert_eq!(header.form, ArgForm::Tiny);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(&buf[..], &[0x20, 200]);
    }

    #[test]
    fn test_small_header() {
        let header = ArgHeader::for_len(ArgId::SECOND, 300).unwrap();
        assert_eq!(header.form, ArgForm::Small);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(&buf[..], &[0xa1, 0x00, 0x01, 0x2c]);
        assert_eq!(ArgHeader::decode(&mut buf.freeze()).unwrap(), header);
    }

    #[test]
    fn test_oversize_has_no_header() {
        assert!(ArgHeader::for_len(ArgId::FIRST, 70_000).is_none());
    }

    #[test]
    fn test_long_header_decodes() {
        let mut data = Bytes::from_static(&[0x60, 0x00, 0x00, 0x01, 0x00, 0x00]);
        let header = ArgHeader::decode(&mut data).unwrap();
        assert_eq!(header.id, ArgId::FIRST);
        assert_eq!(header.form, ArgForm::Long);
        assert_eq!(header.len, 65_536);
    }

    #[test]
    fn test_invalid_form_bits() {
        let mut data = Bytes::from_static(&[0xe0, 0x00]);
        assert!(ArgHeader::decode(&mut data).is_err());
    }

    #[test]
    fn test_map_typed_access() {
        let mut map = ArgMap::new().with(ArgId::FIRST, RawArg(Bytes::from_static(b"ab")));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get::<RawArg>(ArgId::FIRST).unwrap().0, Bytes::from_static(b"ab"));
        assert!(map.get::<RawArg>(ArgId::SECOND).is_none());

        let err = map
            .require::<RawArg>("Test", "missing", ArgId::SECOND)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::MissingArgument { .. }));

        let taken = map.take::<RawArg>(ArgId::FIRST).unwrap();
        assert_eq!(taken.0.len(), 2);
        assert!(map.is_empty());
    }

    #[test]
    fn test_slot_decode_and_type_check() {
        let slot = ArgSlot::required::<RawArg>(0, "data");
        assert_eq!(slot.id, ArgId::FIRST);
        let value = slot.decode(Bytes::from_static(b"xyz")).unwrap();
        assert!(slot.accepts(&*value));
        assert!(value.describe().contains("78797a"));
    }

    #[test]
    fn test_map_debug_uses_describe() {
        let map = ArgMap::new().with(ArgId::FIRST, RawArg(Bytes::from_static(b"\x01")));
        let debug = format!("{map:?}");
        assert!(debug.contains("RawArg(01)"));
    }
}
