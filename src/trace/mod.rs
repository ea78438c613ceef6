//! Self-describing trace serialization substrate.
//!
//! A trace file carries its own schema: the header enumerates every record
//! layout, then a stream of length-less, schema-driven records follows. A
//! reader that has never seen this binary can decode every record from the
//! header alone; a new field or record type only needs its descriptor
//! registered before the trace is opened.
//!
//! File layout (all integers big-endian):
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ u8   format_version              (= 1)                  │
//! │ u8   compressed_flag             (= 0, reserved)        │
//! │ u8   descriptor_count                                   │
//! ├─────────────────────────────────────────────────────────┤
//! │ descriptor_count times:                                 │
//! │   u8   type_id                                          │
//! │   str  type_name                                        │
//! │   u32  field_count                                      │
//! │   field_count times:                                    │
//! │     str  field_name                                     │
//! │     u8   entry_kind              (= 0 = RAWVALUE)       │
//! │     u8   scalar_code                                    │
//! ├─────────────────────────────────────────────────────────┤
//! │ record stream: { u8 type_id; payload }*                 │
//! └─────────────────────────────────────────────────────────┘
//! ```
//! `str` is `u16 length_including_nul`, the bytes, then a NUL.

mod desc;
mod registry;
mod scalar;

pub use desc::{ENTRY_RAWVALUE, EntryDesc, Record, StructDesc};
pub use registry::{Registry, TypeEntry};
pub use scalar::{RecordBuf, Scalar};

/// Version byte leading every trace file.
pub const FORMAT_VERSION: u8 = 1;
