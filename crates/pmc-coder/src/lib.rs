#![warn(missing_docs)]

//! Adaptive multi-symbol range coder for the progressive mesh codec.
//!
//! [`range_coder`] implements the arithmetic-coding primitive (narrow an
//! interval by a `[cum_freq, cum_freq + freq) / total_freq` fraction,
//! renormalize in whole bytes). [`model::AdaptiveModel`] layers a
//! self-adapting frequency table on top so callers only ever deal in
//! symbol indices, never frequencies directly.

mod model;
mod range_coder;

pub use model::AdaptiveModel;
pub use range_coder::{RangeDecoder, RangeEncoder};

use thiserror::Error;

/// Errors raised while encoding or decoding through an [`AdaptiveModel`].
#[derive(Error, Debug)]
pub enum CoderError {
    /// Caller tried to encode a symbol outside the model's alphabet.
    #[error("symbol {0} is out of range for a {1}-symbol alphabet")]
    SymbolOutOfRange(usize, usize),

    /// The decoded bitstream produced a cumulative-frequency value no
    /// symbol's interval covers; the stream is corrupted.
    #[error("corrupted range-coded stream: {0}")]
    CorruptedStream(String),
}
