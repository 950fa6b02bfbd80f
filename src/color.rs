//! sRGB color parsing and WCAG luminance / contrast math.
//!
//! Colors travel through the system as hex strings (`#RRGGBB`, uppercase).
//! [`Rgb`] is the parsed 8-bit form used for interpolation and luminance.
//!
//! # Invalid input
//!
//! [`Rgb::parse`] reports malformed input as a typed [`ColorParseError`].
//! The string-level helpers ([`relative_luminance`], [`contrast_ratio`]) treat
//! an unparseable color as black: luminance 0. Palette generation never fails
//! on a bad seed; it degrades to a black-centered ramp instead.

use std::fmt;

use thiserror::Error;
use tracing::debug;

/// WCAG luminance weights for the linearized R, G, B channels.
const LUMINANCE_WEIGHTS: (f64, f64, f64) = (0.2126, 0.7152, 0.0722);

/// Linearization threshold from the WCAG 2.0 relative luminance definition.
const LINEAR_THRESHOLD: f64 = 0.039_28;

/// Error returned when a hex color string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorParseError {
    #[error("empty color string")]
    Empty,

    #[error("invalid hex length {0} (expected 3 or 6 digits)")]
    InvalidLength(usize),

    #[error("invalid hex digit in {0:?}")]
    InvalidHex(String),
}

/// An opaque 8-bit sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(0xFF, 0xFF, 0xFF);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RGB`, `#RRGGBB`, `RGB` or `RRGGBB` (any case).
    ///
    /// Short forms expand by doubling each digit, so `#0AF` is `#00AAFF`.
    pub fn parse(input: &str) -> Result<Self, ColorParseError> {
        let digits = input.strip_prefix('#').unwrap_or(input);
        if digits.is_empty() {
            return Err(ColorParseError::Empty);
        }

        let nibble = |c: u8| -> Result<u8, ColorParseError> {
            match c {
                b'0'..=b'9' => Ok(c - b'0'),
                b'a'..=b'f' => Ok(c - b'a' + 10),
                b'A'..=b'F' => Ok(c - b'A' + 10),
                _ => Err(ColorParseError::InvalidHex(input.to_string())),
            }
        };

        let bytes = digits.as_bytes();
        match bytes.len() {
            3 => Ok(Self::new(
                nibble(bytes[0])? * 17,
                nibble(bytes[1])? * 17,
                nibble(bytes[2])? * 17,
            )),
            6 => {
                let pair = |hi: u8, lo: u8| -> Result<u8, ColorParseError> {
                    Ok((nibble(hi)? << 4) | nibble(lo)?)
                };
                Ok(Self::new(
                    pair(bytes[0], bytes[1])?,
                    pair(bytes[2], bytes[3])?,
                    pair(bytes[4], bytes[5])?,
                ))
            }
            n => Err(ColorParseError::InvalidLength(n)),
        }
    }

    /// Parse, falling back to black on malformed input.
    pub fn parse_or_black(input: &str) -> Self {
        Self::parse(input).unwrap_or_else(|e| {
            debug!("Treating color {:?} as black: {}", input, e);
            Self::BLACK
        })
    }

    /// Canonical `#RRGGBB` uppercase form.
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Channel-wise linear blend in raw 8-bit space.
    ///
    /// `t = 0` yields `self`, `t = 1` yields `other`. Each channel is clamped
    /// to `[0, 255]` and rounded independently.
    pub fn mix(self, other: Rgb, t: f64) -> Rgb {
        let lerp = |a: u8, b: u8| -> u8 {
            let (a, b) = (f64::from(a), f64::from(b));
            (a + (b - a) * t).clamp(0.0, 255.0).round() as u8
        };
        Rgb::new(
            lerp(self.r, other.r),
            lerp(self.g, other.g),
            lerp(self.b, other.b),
        )
    }

    /// WCAG 2.0 relative luminance in `[0, 1]`.
    pub fn relative_luminance(self) -> f64 {
        fn linearize(channel: u8) -> f64 {
            let v = f64::from(channel) / 255.0;
            if v <= LINEAR_THRESHOLD {
                v / 12.92
            } else {
                ((v + 0.055) / 1.055).powf(2.4)
            }
        }

        let (wr, wg, wb) = LUMINANCE_WEIGHTS;
        wr * linearize(self.r) + wg * linearize(self.g) + wb * linearize(self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Relative luminance of a hex color; unparseable input yields 0.
pub fn relative_luminance(hex: &str) -> f64 {
    match Rgb::parse(hex) {
        Ok(rgb) => rgb.relative_luminance(),
        Err(e) => {
            debug!("Luminance of invalid color {:?} is 0: {}", hex, e);
            0.0
        }
    }
}

/// WCAG contrast ratio between two hex colors, rounded to 2 decimals.
///
/// Always `>= 1.0` and symmetric in its arguments.
pub fn contrast_ratio(a: &str, b: &str) -> f64 {
    let la = relative_luminance(a);
    let lb = relative_luminance(b);
    let (lighter, darker) = if la >= lb { (la, lb) } else { (lb, la) };
    round2((lighter + 0.05) / (darker + 0.05))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
