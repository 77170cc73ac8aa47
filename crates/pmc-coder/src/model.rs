//! Quasi-static adaptive frequency models layered on the range coder.
//!
//! Each model owns a small alphabet's per-symbol counts. Encoding a symbol
//! bumps its count by `INCREMENT`; once the running total would exceed
//! `MAX_TOTAL` every count is halved (floor, minimum 1) to keep the model
//! "quasi-static" — it adapts, but slowly enough that a single outlier
//! batch can't swamp the statistics built up over previous ones.

use crate::range_coder::{RangeDecoder, RangeEncoder};
use crate::CoderError;

const INCREMENT: u32 = 24;
const MAX_TOTAL: u32 = 1 << 15;

/// An adaptive frequency table over a fixed-size alphabet.
#[derive(Debug, Clone)]
pub struct AdaptiveModel {
    freq: Vec<u32>,
    total: u32,
}

impl AdaptiveModel {
    /// A model over `alphabet_size` symbols, each initially equiprobable.
    pub fn new(alphabet_size: usize) -> Self {
        assert!(alphabet_size > 0, "model alphabet must be non-empty");
        Self { freq: vec![1; alphabet_size], total: alphabet_size as u32 }
    }

    /// Number of symbols in the alphabet.
    pub fn alphabet_size(&self) -> usize {
        self.freq.len()
    }

    fn cum_freq(&self, symbol: usize) -> u32 {
        self.freq[..symbol].iter().sum()
    }

    fn update(&mut self, symbol: usize) {
        self.freq[symbol] += INCREMENT;
        self.total += INCREMENT;
        if self.total > MAX_TOTAL {
            self.total = 0;
            for f in &mut self.freq {
                *f = (*f >> 1).max(1);
                self.total += *f;
            }
        }
    }

    /// Encode `symbol` and update its statistics.
    pub fn encode(&mut self, enc: &mut RangeEncoder, symbol: usize) -> Result<(), CoderError> {
        if symbol >= self.freq.len() {
            return Err(CoderError::SymbolOutOfRange(symbol, self.freq.len()));
        }
        let cum = self.cum_freq(symbol);
        let f = self.freq[symbol];
        enc.encode(cum, f, self.total);
        self.update(symbol);
        Ok(())
    }

    /// Decode one symbol and update its statistics, mirroring `encode`.
    pub fn decode(&mut self, dec: &mut RangeDecoder<'_>) -> Result<usize, CoderError> {
        let target = dec.decode_freq(self.total);
        let mut acc = 0u32;
        let mut symbol = self.freq.len();
        for (i, &f) in self.freq.iter().enumerate() {
            if target < acc + f {
                symbol = i;
                break;
            }
            acc += f;
        }
        if symbol == self.freq.len() {
            return Err(CoderError::CorruptedStream(
                "range decoder target exceeded model total".into(),
            ));
        }
        dec.decode_update(acc, self.freq[symbol]);
        self.update(symbol);
        Ok(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_an_adapting_model() {
        let symbols = [0usize, 0, 0, 1, 2, 0, 0, 3, 1, 0, 0, 2, 0];
        let mut enc_model = AdaptiveModel::new(4);
        let mut enc = RangeEncoder::new();
        for &s in &symbols {
            enc_model.encode(&mut enc, s).unwrap();
        }
        let bytes = enc.finish();

        let mut dec_model = AdaptiveModel::new(4);
        let mut dec = RangeDecoder::new(&bytes);
        let mut out = Vec::new();
        for _ in 0..symbols.len() {
            out.push(dec_model.decode(&mut dec).unwrap());
        }
        assert_eq!(out, symbols);
    }

    #[test]
    fn rejects_out_of_alphabet_symbol() {
        let mut model = AdaptiveModel::new(3);
        let mut enc = RangeEncoder::new();
        let err = model.encode(&mut enc, 5).unwrap_err();
        assert!(matches!(err, CoderError::SymbolOutOfRange(5, 3)));
    }

    #[test]
    fn rescales_without_losing_round_trip_correctness() {
        // Drive one symbol's frequency up past MAX_TOTAL repeatedly to
        // exercise the halving rescale path.
        let mut symbols = Vec::new();
        for i in 0..3000 {
            symbols.push(if i % 13 == 0 { 1 } else { 0 });
        }
        let mut enc_model = AdaptiveModel::new(2);
        let mut enc = RangeEncoder::new();
        for &s in &symbols {
            enc_model.encode(&mut enc, s).unwrap();
        }
        let bytes = enc.finish();

        let mut dec_model = AdaptiveModel::new(2);
        let mut dec = RangeDecoder::new(&bytes);
        for &expected in &symbols {
            assert_eq!(dec_model.decode(&mut dec).unwrap(), expected);
        }
    }
}
