//! BIND image decoding
//!
//! A TN3270E BIND-IMAGE record carries the SNA BIND request unit the host
//! used to start the LU-LU session. The session only needs three things from
//! it: the screen geometry, the primary LU name and the maximum RU sizes.
//! Every field is read with bounds checks, so a BIND shorter than its own
//! declared fields never reads past the end of the image.

use std::fmt;

use log::{debug, warn};
use thiserror::Error;

use super::codes::*;
use crate::protocol_common::ebcdic::ebcdic_name;

/// Default and alternate screen sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenGeometry {
    pub default_rows: u16,
    pub default_cols: u16,
    pub alt_rows: u16,
    pub alt_cols: u16,
}

impl ScreenGeometry {
    pub fn new(default_rows: u16, default_cols: u16, alt_rows: u16, alt_cols: u16) -> Self {
        Self {
            default_rows,
            default_cols,
            alt_rows,
            alt_cols,
        }
    }

    /// 24x80 for both default and alternate
    pub fn model_2() -> Self {
        Self::new(MODEL_2_ROWS, MODEL_2_COLS, MODEL_2_ROWS, MODEL_2_COLS)
    }
}

impl fmt::Display for ScreenGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} (alternate {}x{})",
            self.default_rows, self.default_cols, self.alt_rows, self.alt_cols
        )
    }
}

/// Bounds a BIND-derived geometry must respect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryLimits {
    pub min_rows: u16,
    pub min_cols: u16,
    pub max_rows: u16,
    pub max_cols: u16,
}

impl GeometryLimits {
    /// Check both screen sizes. Returns a human-readable reason on failure.
    pub fn check(&self, geometry: &ScreenGeometry) -> Result<(), String> {
        let sizes = [
            ("default", geometry.default_rows, geometry.default_cols),
            ("alternate", geometry.alt_rows, geometry.alt_cols),
        ];
        for (which, rows, cols) in sizes {
            if rows < self.min_rows || cols < self.min_cols {
                return Err(format!(
                    "{which} size {rows}x{cols} is smaller than the minimum {}x{}",
                    self.min_rows, self.min_cols
                ));
            }
            if rows > self.max_rows || cols > self.max_cols {
                return Err(format!(
                    "{which} size {rows}x{cols} is larger than the maximum {}x{}",
                    self.max_rows, self.max_cols
                ));
            }
        }
        Ok(())
    }
}

impl Default for GeometryLimits {
    fn default() -> Self {
        Self {
            min_rows: MODEL_2_ROWS,
            min_cols: MODEL_2_COLS,
            max_rows: MODEL_2_ROWS,
            max_cols: MODEL_2_COLS,
        }
    }
}

/// What the screen-size fields of a BIND said
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindGeometry {
    /// The image is too short or the format byte is not one we know
    Absent,
    Accepted(ScreenGeometry),
    /// Sizes were present but outside the configured limits
    Rejected { proposed: ScreenGeometry, reason: String },
}

/// Decoding failures that discard the whole image
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("empty BIND image")]
    Empty,
    #[error("not a BIND request unit (0x{0:02x})")]
    NotBind(u8),
}

/// The parts of a BIND image the session uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindImage {
    pub plu_name: Option<String>,
    pub max_ru_primary: Option<u32>,
    pub max_ru_secondary: Option<u32>,
    pub screen_size_format: Option<u8>,
    pub geometry: BindGeometry,
}

impl BindImage {
    /// Decode a BIND image and validate its geometry against `limits`
    pub fn parse(image: &[u8], limits: &GeometryLimits) -> Result<Self, BindError> {
        let ru = *image.first().ok_or(BindError::Empty)?;
        if ru != BIND_RU {
            return Err(BindError::NotBind(ru));
        }

        let max_ru_secondary = image.get(BIND_OFF_MAXRU_SEC).and_then(|&b| decode_max_ru(b));
        let max_ru_primary = image.get(BIND_OFF_MAXRU_PRI).and_then(|&b| decode_max_ru(b));
        let screen_size_format = image.get(BIND_OFF_SSIZE).copied();

        let geometry = match screen_size_format.and_then(|ss| layout(ss, image, limits)) {
            None => {
                debug!("BIND carries no usable screen size ({screen_size_format:02x?})");
                BindGeometry::Absent
            }
            Some(proposed) => match limits.check(&proposed) {
                Ok(()) => BindGeometry::Accepted(proposed),
                Err(reason) => {
                    warn!("BIND screen size {proposed} rejected: {reason}");
                    BindGeometry::Rejected { proposed, reason }
                }
            },
        };

        Ok(Self {
            plu_name: plu_name(image),
            max_ru_primary,
            max_ru_secondary,
            screen_size_format,
            geometry,
        })
    }
}

/// Geometry selected by the screen-size format byte
fn layout(format: u8, image: &[u8], limits: &GeometryLimits) -> Option<ScreenGeometry> {
    let field = |off: usize| image.get(off).map(|&b| u16::from(b));
    match format {
        BIND_SS_MODEL2 | BIND_SS_MODEL2_ALT => Some(ScreenGeometry::model_2()),
        BIND_SS_MODEL2_DEFAULT_MAX_ALT => Some(ScreenGeometry::new(
            MODEL_2_ROWS,
            MODEL_2_COLS,
            limits.max_rows,
            limits.max_cols,
        )),
        BIND_SS_DEFAULT_EQUALS_ALT => {
            let rows = field(BIND_OFF_RD)?;
            let cols = field(BIND_OFF_CD)?;
            Some(ScreenGeometry::new(rows, cols, rows, cols))
        }
        BIND_SS_EXPLICIT => Some(ScreenGeometry::new(
            field(BIND_OFF_RD)?,
            field(BIND_OFF_CD)?,
            field(BIND_OFF_RA)?,
            field(BIND_OFF_CA)?,
        )),
        _ => None,
    }
}

fn plu_name(image: &[u8]) -> Option<String> {
    let len = usize::from(*image.get(BIND_OFF_PLU_NAME_LEN)?).min(BIND_PLU_NAME_MAX);
    if len == 0 {
        return None;
    }
    let name = image.get(BIND_OFF_PLU_NAME..BIND_OFF_PLU_NAME + len)?;
    Some(ebcdic_name(name))
}

/// Decode a max-RU-size byte: mantissa in the high nibble, power of two in
/// the low nibble. Without the high bit the size is unspecified.
pub fn decode_max_ru(byte: u8) -> Option<u32> {
    if byte & 0x80 == 0 {
        return None;
    }
    let mantissa = u32::from(byte >> 4);
    let exponent = u32::from(byte & 0x0F);
    Some(mantissa << exponent)
}
