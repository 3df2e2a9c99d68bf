//! IEEE-754 single-precision encoding for float constants.
//!
//! Float literals arrive as `f64` and are stored in the constant pool as
//! big-endian 32-bit patterns. The conversion is done by hand, scaling the
//! magnitude into `[1, 2)` and peeling mantissa bits off one at a time, so
//! overflow to infinity and the rounding step are explicit and reportable.
//!
//! ```text
//!  31  30      23 22                    0
//! +---+----------+-----------------------+
//! | s | exponent |       mantissa        |
//! +---+----------+-----------------------+
//! ```

const MANTISSA_BITS: u32 = 23;
const MANTISSA_MASK: u32 = (1 << MANTISSA_BITS) - 1;
const EXPONENT_BIAS: i32 = 127;
const MAX_EXPONENT: i32 = 127;
const MIN_EXPONENT: i32 = -126;

/// Canonical quiet NaN.
pub const NAN_BYTES: [u8; 4] = [0x7f, 0xc0, 0x00, 0x00];
/// Positive infinity.
pub const POSITIVE_INFINITY_BYTES: [u8; 4] = [0x7f, 0x80, 0x00, 0x00];
/// Negative infinity.
pub const NEGATIVE_INFINITY_BYTES: [u8; 4] = [0xff, 0x80, 0x00, 0x00];

/// What an encoded value turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatClass {
    /// A finite value (normal, denormal or zero)
    Normal,
    /// Positive infinity, either given or produced by overflow
    PositiveInfinity,
    /// Negative infinity, either given or produced by overflow
    NegativeInfinity,
    /// Not a number
    Nan,
}

/// Result of [`encode_single`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedFloat {
    /// Big-endian single-precision bit pattern
    pub bytes: [u8; 4],
    /// Classification of the encoded value
    pub class: FloatClass,
}

impl EncodedFloat {
    fn infinity(negative: bool) -> Self {
        if negative {
            Self {
                bytes: NEGATIVE_INFINITY_BYTES,
                class: FloatClass::NegativeInfinity,
            }
        } else {
            Self {
                bytes: POSITIVE_INFINITY_BYTES,
                class: FloatClass::PositiveInfinity,
            }
        }
    }
}

/// A decoded single-precision value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Float32 {
    /// Finite value
    Finite(f32),
    /// Not a number
    Nan,
    /// Positive infinity
    PositiveInfinity,
    /// Negative infinity
    NegativeInfinity,
}

/// Encodes `value` as an IEEE-754 single.
///
/// Magnitudes too large for the format become the correctly signed infinity;
/// magnitudes too small for a normal number become denormals. The mantissa is
/// rounded up when the discarded remainder is more than half a unit.
pub fn encode_single(value: f64) -> EncodedFloat {
    if value.is_nan() {
        return EncodedFloat {
            bytes: NAN_BYTES,
            class: FloatClass::Nan,
        };
    }

    let negative = value.is_sign_negative();
    let mut magnitude = value.abs();
    if magnitude.is_infinite() {
        return EncodedFloat::infinity(negative);
    }

    let mut exponent: i32 = 0;
    let mut biased: u32;

    if magnitude >= 1.0 {
        while magnitude >= 2.0 {
            magnitude /= 2.0;
            exponent += 1;
            if exponent > MAX_EXPONENT {
                return EncodedFloat::infinity(negative);
            }
        }
        magnitude -= 1.0;
        biased = (exponent + EXPONENT_BIAS) as u32;
    } else {
        while magnitude < 1.0 && exponent > MIN_EXPONENT {
            magnitude *= 2.0;
            exponent -= 1;
        }
        if magnitude >= 1.0 {
            magnitude -= 1.0;
            biased = (exponent + EXPONENT_BIAS) as u32;
        } else {
            // Denormal: stored exponent 0, no implicit leading one.
            biased = 0;
        }
    }

    let mut mantissa: u32 = 0;
    for _ in 0..MANTISSA_BITS {
        magnitude *= 2.0;
        mantissa <<= 1;
        if magnitude >= 1.0 {
            mantissa |= 1;
            magnitude -= 1.0;
        }
    }

    if magnitude * 2.0 > 1.0 {
        mantissa += 1;
        if mantissa > MANTISSA_MASK {
            mantissa = 0;
            biased += 1;
            if biased >= 0xff {
                return EncodedFloat::infinity(negative);
            }
        }
    }

    let bits = (u32::from(negative) << 31) | (biased << MANTISSA_BITS) | mantissa;
    EncodedFloat {
        bytes: bits.to_be_bytes(),
        class: FloatClass::Normal,
    }
}

/// Decodes a big-endian IEEE-754 single.
pub fn decode_single(bytes: [u8; 4]) -> Float32 {
    let bits = u32::from_be_bytes(bytes);
    let negative = bits >> 31 == 1;
    let exponent = ((bits >> MANTISSA_BITS) & 0xff) as i32;
    let mantissa = bits & MANTISSA_MASK;

    let magnitude = match exponent {
        0xff if mantissa == 0 => {
            return if negative {
                Float32::NegativeInfinity
            } else {
                Float32::PositiveInfinity
            };
        }
        0xff => return Float32::Nan,
        0 => f64::from(mantissa) * pow2(MIN_EXPONENT - MANTISSA_BITS as i32),
        _ => {
            (1.0 + f64::from(mantissa) * pow2(-(MANTISSA_BITS as i32)))
                * pow2(exponent - EXPONENT_BIAS)
        }
    };

    let value = if negative { -magnitude } else { magnitude };
    Float32::Finite(value as f32)
}

/// Exact power of two for exponents inside the normal `f64` range.
fn pow2(exp: i32) -> f64 {
    debug_assert!((-1022..=1023).contains(&exp));
    f64::from_bits(((exp + 1023) as u64) << 52)
}
