#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Lyric object file format.
//!
//! An object is a 64-byte [`Header`] followed by aligned sections:
//! string blob, string offset table, descriptor tables (postcard-encoded
//! [`ObjectTables`]) and the bytecode blob holding every proc.
//!
//! [`ObjectBuilder`] writes objects, [`LyricObject`] loads and validates them,
//! [`Loader`] implementations locate them, and [`dump`] renders them as text.

mod address;
mod builder;
mod descriptors;
mod dump;
mod error;
mod header;
mod instruction;
mod iterator;
mod linkage;
mod loader;
mod object;
mod opcode;
mod proc;

#[cfg(test)]
mod builder_tests;
#[cfg(test)]
mod dump_tests;
#[cfg(test)]
mod header_tests;
#[cfg(test)]
mod instruction_tests;
#[cfg(test)]
mod loader_tests;
#[cfg(test)]
mod object_tests;
#[cfg(test)]
mod proc_tests;

pub use address::{
    Address, INVALID_ADDRESS, descriptor_address, descriptor_offset, is_far, is_near, is_valid,
    link_address, link_offset,
};
pub use builder::ObjectBuilder;
pub use descriptors::{
    ActionDescriptor, BindingDescriptor, CallDescriptor, CallFlags, CompositeDescriptor,
    ConceptDescriptor, ExistentialDescriptor, FieldDescriptor, ImportDescriptor, LinkDescriptor,
    LiteralDescriptor, MethodDescriptor, NamespaceDescriptor, ObjectTables, ParameterDescriptor,
    PluginSpecifier, StaticDescriptor, SymbolDescriptor, TypeDescriptor, TypeKind,
};
pub use dump::{dump, format_op};
pub use error::{ObjectError, Result};
pub use header::{Header, flags};
pub use instruction::{OpCell, Operands};
pub use iterator::BytecodeIterator;
pub use linkage::{AccessType, CallMode, DeriveType, ImportFlags, Intrinsic, LinkageSection};
pub use loader::{ChainLoader, DirectoryLoader, Loader, LoaderError, MemoryLoader, OBJECT_EXTENSION};
pub use object::{ByteStorage, LyricObject};
pub use opcode::{Opcode, OperandLayout, op_flags};
pub use proc::{
    LEXICAL_ARGUMENT, LEXICAL_LOCAL, NO_PARENT_CHECK, PROC_HEADER_SIZE, ProcCheck, ProcCleanup,
    ProcException, ProcInfo, ProcLayout, ProcLexical, encode_proc,
};

/// Magic bytes identifying a Lyric object file.
pub const MAGIC: [u8; 4] = *b"LYO1";

/// Current object format version.
pub const VERSION: u32 = 1;

/// Section alignment in bytes.
pub const SECTION_ALIGN: usize = 64;

/// Size of the fixed file header.
pub const HEADER_SIZE: usize = 64;
