//! Bit and byte level readers shared by every parser in the workspace

pub mod bit_reader;
pub mod bit_writer;
pub mod byte_reader;

pub use bit_reader::{BitReader, BitResult};
pub use bit_writer::BitWriter;
pub use byte_reader::{ByteReader, ByteResult};
