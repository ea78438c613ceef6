//! Struct descriptors: the ordered, named, typed field list attached to
//! every record type and serialized into the trace header.

use crate::error::Error;
use crate::trace::scalar::{RecordBuf, Scalar};

/// Entry kind written before each field's scalar code. Nested entries do
/// not exist in this format; every entry is a raw value.
pub const ENTRY_RAWVALUE: u8 = 0;

/// One named, typed field of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDesc {
    pub name: &'static str,
    pub scalar: Scalar,
}

/// Ordered field list of one record type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructDesc {
    entries: Vec<EntryDesc>,
}

impl StructDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &'static str, scalar: Scalar) {
        self.entries.push(EntryDesc { name, scalar });
    }

    pub fn entries(&self) -> &[EntryDesc] {
        &self.entries
    }

    /// Emits the descriptor:
    /// `u32 entry_count; { str name; u8 ENTRY_RAWVALUE; u8 scalar_code; }*`
    pub fn write_desc(&self, buf: &mut RecordBuf<'_>) -> Result<(), Error> {
        buf.put_u32(self.entries.len() as u32);
        for entry in &self.entries {
            buf.put_str(entry.name)?;
            buf.put_u8(ENTRY_RAWVALUE);
            buf.put_u8(entry.scalar.code());
        }
        Ok(())
    }
}

/// A value that can travel in the trace: a wire name, a descriptor and an
/// encoder emitting the fields in descriptor order.
///
/// Implementations come from the [`record!`](crate::record) macro, which
/// generates the descriptor and the encoder from one field list so the two
/// cannot drift.
pub trait Record: 'static {
    /// Type name written into the trace header.
    const TYPE_NAME: &'static str;

    /// Ordered field list.
    fn descriptor() -> StructDesc
    where
        Self: Sized;

    /// Appends the field values in descriptor order.
    fn encode(&self, buf: &mut RecordBuf<'_>) -> Result<(), Error>;
}

/// Declares a record type: wire name, then `"wire_field" => field: scalar`
/// pairs in wire order.
///
/// ```ignore
/// record!(AcquisitionDuration, "acqduration", {
///     "start" => start: u64,
///     "end" => end: u64,
/// });
/// ```
#[macro_export]
macro_rules! record {
    ($ty:ident, $type_name:literal, {
        $( $wire_name:literal => $field:ident : $scalar:ident ),+ $(,)?
    }) => {
        impl $crate::trace::Record for $ty {
            const TYPE_NAME: &'static str = $type_name;

            fn descriptor() -> $crate::trace::StructDesc {
                let mut desc = $crate::trace::StructDesc::new();
                $( desc.push($wire_name, $crate::record!(@scalar $scalar)); )+
                desc
            }

            fn encode(
                &self,
                buf: &mut $crate::trace::RecordBuf<'_>,
            ) -> Result<(), $crate::error::Error> {
                $( $crate::record!(@put buf, $scalar, self.$field); )+
                Ok(())
            }
        }
    };

    (@scalar u8) => { $crate::trace::Scalar::U8 };
    (@scalar i8) => { $crate::trace::Scalar::I8 };
    (@scalar u16) => { $crate::trace::Scalar::U16 };
    (@scalar i16) => { $crate::trace::Scalar::I16 };
    (@scalar u32) => { $crate::trace::Scalar::U32 };
    (@scalar i32) => { $crate::trace::Scalar::I32 };
    (@scalar u64) => { $crate::trace::Scalar::U64 };
    (@scalar i64) => { $crate::trace::Scalar::I64 };
    (@scalar str) => { $crate::trace::Scalar::Str };

    (@put $buf:ident, u8, $v:expr) => { $buf.put_u8($v) };
    (@put $buf:ident, i8, $v:expr) => { $buf.put_i8($v) };
    (@put $buf:ident, u16, $v:expr) => { $buf.put_u16($v) };
    (@put $buf:ident, i16, $v:expr) => { $buf.put_i16($v) };
    (@put $buf:ident, u32, $v:expr) => { $buf.put_u32($v) };
    (@put $buf:ident, i32, $v:expr) => { $buf.put_i32($v) };
    (@put $buf:ident, u64, $v:expr) => { $buf.put_u64($v) };
    (@put $buf:ident, i64, $v:expr) => { $buf.put_i64($v) };
    (@put $buf:ident, str, $v:expr) => { $buf.put_str(&$v)? };
}
