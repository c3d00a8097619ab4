//! Packed plane coefficients and the numeric-format boundary.
//!
//! The binning pipeline always produces IEEE floats plus an explicit
//! overflow-rescale factor; the target's actual numeric format is applied
//! only here, selected by configuration rather than compile-time branching.

/// Screen-space line equation of a transformed plane.
///
/// `eval(px, py) = a*px + b*py + c` over pixel coordinates measured from the
/// top-left viewport corner is proportional to the plane's inverse depth
/// along that pixel's eye ray, pre-multiplied by the overflow rescale.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PackedPlane {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    /// Camera-space plane distance, kept alongside the line equation for
    /// the downstream consumer.
    pub d: f32,
}

impl PackedPlane {
    #[inline]
    pub fn eval(&self, px: f32, py: f32) -> f32 {
        self.a * px + self.b * py + self.c
    }

    /// Inverse depth along the pixel ray at (px, py). The packed line
    /// equation carries `-rescale / depth`, so the caller supplies the
    /// rescale to undo.
    #[inline]
    pub fn inv_depth_at(&self, px: f32, py: f32, overflow_rescale: f32) -> f32 {
        -self.eval(px, py) / overflow_rescale
    }
}

/// Numeric format the emission consumer expects coefficients in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoefficientFormat {
    /// Full IEEE-754 single precision, passed through bit-for-bit.
    #[default]
    Ieee,
    /// Reduced-precision "20-bit safe" float: sign, 8-bit exponent and the
    /// top 11 mantissa bits survive; the rest is truncated. The overflow
    /// rescale chosen by the projection state guarantees the exponent stays
    /// in range.
    SafeFixed20,
}

/// Coefficients encoded for the consumer, one 32-bit word per term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodedCoefficient {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

impl CoefficientFormat {
    pub fn encode(self, packed: &PackedPlane) -> EncodedCoefficient {
        match self {
            CoefficientFormat::Ieee => EncodedCoefficient {
                a: packed.a.to_bits(),
                b: packed.b.to_bits(),
                c: packed.c.to_bits(),
                d: packed.d.to_bits(),
            },
            CoefficientFormat::SafeFixed20 => EncodedCoefficient {
                a: truncate_to_20(packed.a),
                b: truncate_to_20(packed.b),
                c: truncate_to_20(packed.c),
                d: truncate_to_20(packed.d),
            },
        }
    }
}

/// Keep the top 20 significant bits of an f32 (sign + exponent + 11 mantissa
/// bits), zeroing the remainder.
#[inline]
fn truncate_to_20(value: f32) -> u32 {
    value.to_bits() & 0xFFFF_F000
}
