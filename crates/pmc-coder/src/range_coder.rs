//! Byte-oriented carry-propagating range coder (the LZMA scheme): a 32-bit
//! range register renormalized in whole bytes, with a deferred-carry cache
//! so a borrow can ripple back through a run of `0xFF` bytes already
//! written. Chosen over a carryless (Subbotin) variant because the carry
//! handling is a few extra lines and lets [`RangeEncoder`]/[`RangeDecoder`]
//! stay allocation-free per symbol.

const TOP: u32 = 1 << 24;

/// Encodes symbols into a byte buffer given a cumulative-frequency
/// interval `[cum_freq, cum_freq + freq)` out of `total_freq`.
pub struct RangeEncoder {
    low: u64,
    range: u32,
    cache: u8,
    cache_size: u64,
    out: Vec<u8>,
    started: bool,
}

impl RangeEncoder {
    /// A fresh encoder writing into a new buffer.
    pub fn new() -> Self {
        Self {
            low: 0,
            range: 0xFFFF_FFFF,
            cache: 0,
            cache_size: 1,
            out: Vec::new(),
            started: false,
        }
    }

    /// Narrow the current interval to `[cum_freq, cum_freq + freq)` out of
    /// `total_freq`. Caller guarantees `cum_freq + freq <= total_freq` and
    /// `total_freq <= 1 << 16` (so `range / total_freq` never underflows
    /// to zero at the top of the renormalized range).
    pub fn encode(&mut self, cum_freq: u32, freq: u32, total_freq: u32) {
        debug_assert!(freq > 0);
        debug_assert!(cum_freq + freq <= total_freq);
        let r = self.range / total_freq;
        self.low += (r as u64) * (cum_freq as u64);
        self.range = r * freq;
        while self.range < TOP {
            self.shift_low();
            self.range <<= 8;
        }
    }

    fn shift_low(&mut self) {
        if self.low < 0xFF00_0000u64 || self.low > 0xFFFF_FFFFu64 {
            let carry = (self.low >> 32) as u8;
            if self.started {
                self.out.push(self.cache.wrapping_add(carry));
            }
            for _ in 1..self.cache_size {
                self.out.push(0xFFu8.wrapping_add(carry));
            }
            self.cache = (self.low >> 24) as u8;
            self.cache_size = 0;
            self.started = true;
        }
        self.cache_size += 1;
        self.low = (self.low << 8) & 0xFFFF_FFFF;
    }

    /// Flush the remaining state and return the encoded bytes.
    pub fn finish(mut self) -> Vec<u8> {
        for _ in 0..5 {
            self.shift_low();
        }
        self.out
    }
}

impl Default for RangeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes symbols previously written by [`RangeEncoder`].
pub struct RangeDecoder<'a> {
    range: u32,
    code: u32,
    input: &'a [u8],
    pos: usize,
}

impl<'a> RangeDecoder<'a> {
    /// Begin decoding `input`, which must be the exact byte slice produced
    /// by [`RangeEncoder::finish`].
    pub fn new(input: &'a [u8]) -> Self {
        let mut d = Self { range: 0xFFFF_FFFF, code: 0, input, pos: 0 };
        for _ in 0..4 {
            d.code = (d.code << 8) | d.next_byte() as u32;
        }
        d
    }

    fn next_byte(&mut self) -> u8 {
        let b = self.input.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        b
    }

    /// The cumulative-frequency value the next symbol must cover, given
    /// `total_freq`. Always in `[0, total_freq)`.
    pub fn decode_freq(&mut self, total_freq: u32) -> u32 {
        self.range /= total_freq;
        (self.code / self.range).min(total_freq - 1)
    }

    /// Consume the interval `[cum_freq, cum_freq + freq)` identified by a
    /// prior [`RangeDecoder::decode_freq`] call.
    pub fn decode_update(&mut self, cum_freq: u32, freq: u32) {
        self.code -= cum_freq * self.range;
        self.range *= freq;
        while self.range < TOP {
            self.code = (self.code << 8) | self.next_byte() as u32;
            self.range <<= 8;
        }
    }
}
