// # CellStore
//
// The on-disk format a frozen `CellCache` gets compacted into: a data
// block holding every cell, a fixed-width offset index and a
// variable-width key index over it, and a trailer. Building and
// compacting whole CellStore files end to end is outside this crate's
// scope (see `SPEC_FULL.md`); what lives here is the file format itself,
// grounded in the original's `Data------` / `IdxFix----` / `IdxVar----`
// block magic numbers.

pub mod decompressor;
pub mod format;
mod reader;
mod writer;

pub use decompressor::KeyDecompressorNone;
pub use format::Trailer;
pub use reader::CellStoreReader;
pub use writer::CellStoreWriter;
