//! Hex color parsing for asset average colors

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ColorError {
    #[error("Color must start with '#': {0:?}")]
    MissingHash(String),
    #[error("Color must have 3 or 6 hex digits: {0:?}")]
    InvalidLength(String),
    #[error("Invalid hex digit in color: {0:?}")]
    InvalidDigit(String),
}

/// 8-bit RGB triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Parse "#RRGGBB" or the "#RGB" shorthand into an [`Rgb`].
pub fn parse_hex_color(s: &str) -> Result<Rgb, ColorError> {
    let digits = s
        .strip_prefix('#')
        .ok_or_else(|| ColorError::MissingHash(s.to_string()))?;

    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ColorError::InvalidDigit(s.to_string()));
    }

    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16).map_err(|_| ColorError::InvalidDigit(s.to_string()))
    };

    match digits.len() {
        6 => Ok(Rgb::new(channel(0..2)?, channel(2..4)?, channel(4..6)?)),
        // #RGB expands each nibble: #8AF -> #88AAFF
        3 => {
            let r = channel(0..1)?;
            let g = channel(1..2)?;
            let b = channel(2..3)?;
            Ok(Rgb::new(r * 17, g * 17, b * 17))
        }
        _ => Err(ColorError::InvalidLength(s.to_string())),
    }
}
