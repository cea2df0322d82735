// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Error types shared between modules

use crate::atlas::AtlasError;
use crate::raster::RasterizeError;
use std::collections::TryReserveError;
use thiserror::Error;

/// Allocation failure
///
/// Returned when growing the atlas buffer, the skyline or any part of the
/// glyph cache fails. The operation which failed has no effect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Error)]
#[error("memory allocation failed")]
pub struct MemoryError;

impl From<TryReserveError> for MemoryError {
    fn from(_: TryReserveError) -> Self {
        MemoryError
    }
}

impl From<smallvec::CollectionAllocErr> for MemoryError {
    fn from(_: smallvec::CollectionAllocErr) -> Self {
        MemoryError
    }
}

/// Malformed request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("font size must be positive and finite")]
    InvalidFontSize,
    #[error("outline thickness is not finite")]
    NonFiniteThickness,
    #[error("outline thickness is negative")]
    NegativeThickness,
    #[error("outline thickness is too large")]
    ThicknessTooLarge,
    #[error("padded glyph size overflows")]
    GlyphTooLarge,
    #[error("signed distance fields require a single-channel atlas (depth {0})")]
    SdfRequiresGray(u8),
    #[error("invalid atlas operation")]
    Atlas(#[source] AtlasError),
}

/// Glyph load failure
///
/// Any of these aborts the load of a single glyph. Nothing is registered in
/// the glyph cache when a load fails.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Memory(#[from] MemoryError),
    /// No space for the glyph; the atlas may be enlarged and the load retried
    #[error("texture atlas is full (requested {width}x{height})")]
    AtlasFull { width: u32, height: u32 },
    #[error("rasterization failed")]
    Rasterize(#[from] RasterizeError),
    #[error("invalid argument")]
    Argument(#[from] ArgumentError),
}

impl From<AtlasError> for LoadError {
    fn from(err: AtlasError) -> Self {
        match err {
            AtlasError::Full { width, height } => LoadError::AtlasFull { width, height },
            AtlasError::Memory(err) => LoadError::Memory(err),
            err => LoadError::Argument(ArgumentError::Atlas(err)),
        }
    }
}
