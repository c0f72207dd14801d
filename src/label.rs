//! Codecs for the mounting positions that the experiment smuggles through
//! DWM1001 configuration fields.
//!
//! Each onboard unit knows where its antennas sit on the vehicle, but the
//! firmware gives us no side channel to share that with the ranging peer. Two
//! tricks from the field deployment work around it:
//!
//! - A master (tag) module carries its own mounting offsets in its shell
//!   `label` field, as 8 base64-encoded bytes.
//! - A slave (anchor) module leaks its mounting offsets through the anchor
//!   position and quality-factor integers of every ranging report it
//!   participates in, at fixed byte offsets.
//!
//! Offsets decode to millimeters. The end side (front or rear of the vehicle)
//! rides along as a small integer code, Modulo-3 in the slave's unsigned z
//! field.

use crate::report::AnchorReading;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which end of the vehicle an antenna is mounted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum EndSide {
    /// Front end.
    A,
    /// Rear end.
    B,
    /// The side code was not one we recognize.
    Unknown,
}

/// Side codes as carried on the wire: 1 = B, 2 = A.
impl From<u8> for EndSide {
    fn from(code: u8) -> Self {
        match code {
            1 => EndSide::B,
            2 => EndSide::A,
            _ => EndSide::Unknown,
        }
    }
}

impl fmt::Display for EndSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndSide::A => write!(f, "A"),
            EndSide::B => write!(f, "B"),
            EndSide::Unknown => write!(f, "?"),
        }
    }
}

/// An antenna's mounting position on its vehicle, in millimeters:
/// x along the travel axis measured from the bumper plane, y lateral,
/// z height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct InfoPosition {
    /// Longitudinal offset, mm.
    pub x_mm: i32,
    /// Lateral offset, mm.
    pub y_mm: i32,
    /// Height, mm. Carried unsigned on the wire.
    pub z_mm: i32,
    /// Associates the antenna with its hosting unit.
    pub assoc_id: u8,
    /// Which vehicle end the antenna serves.
    pub side: EndSide,
}

impl InfoPosition {
    /// A zeroed position with unknown side, used when no label is deployed.
    pub fn unknown() -> Self {
        InfoPosition {
            x_mm: 0,
            y_mm: 0,
            z_mm: 0,
            assoc_id: 0,
            side: EndSide::Unknown,
        }
    }
}

/// Returned when a label field cannot be decoded.
#[derive(Debug)]
pub enum LabelError {
    /// The label was not valid base64.
    Base64(base64::DecodeError),
    /// The label decoded to fewer than the 8 bytes we need.
    TooShort(usize),
}

impl fmt::Display for LabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelError::Base64(e) => write!(f, "label is not valid base64: {}", e),
            LabelError::TooShort(n) => write!(f, "label decoded to {} bytes, need 8", n),
        }
    }
}

impl std::error::Error for LabelError {}

impl From<base64::DecodeError> for LabelError {
    fn from(value: base64::DecodeError) -> Self {
        LabelError::Base64(value)
    }
}

/// Decodes a master module's mounting position from its shell `label` field.
///
/// Layout of the 8 decoded bytes, all little-endian, positions in
/// centimeters: x (i16), y (i16), z (u16), association id (u8), side code
/// (u8).
pub fn decode_master_label(label: &str) -> Result<InfoPosition, LabelError> {
    let bytes = STANDARD.decode(label.trim())?;
    if bytes.len() < 8 {
        return Err(LabelError::TooShort(bytes.len()));
    }

    Ok(InfoPosition {
        x_mm: i16::from_le_bytes([bytes[0], bytes[1]]) as i32 * 10,
        y_mm: i16::from_le_bytes([bytes[2], bytes[3]]) as i32 * 10,
        z_mm: u16::from_le_bytes([bytes[4], bytes[5]]) as i32 * 10,
        assoc_id: bytes[6],
        side: EndSide::from(bytes[7]),
    })
}

/// Recovers a foreign slave's mounting position from the raw anchor integers
/// of a ranging report.
///
/// Only reports from the accelerometer-enabled firmware carry this encoding;
/// on the OEM firmware the recovered values are meaningless. The 4-byte
/// little-endian x, y, z fields plus the quality factor byte are laid out as
/// a 13-byte record and re-sliced: association id at byte 1, x at bytes 2-3
/// (i16), y at bytes 6-7 (i16), z at bytes 10-11 (u16), positions in
/// centimeters. The end side is the unsigned z value Modulo 3.
pub fn recover_slave_info(reading: &AnchorReading) -> InfoPosition {
    let mut raw = [0u8; 13];
    raw[0..4].copy_from_slice(&reading.x_mm.to_le_bytes());
    raw[4..8].copy_from_slice(&reading.y_mm.to_le_bytes());
    raw[8..12].copy_from_slice(&reading.z_mm.to_le_bytes());
    raw[12] = reading.qf.unwrap_or(0);

    let z = u16::from_le_bytes([raw[10], raw[11]]);
    InfoPosition {
        x_mm: i16::from_le_bytes([raw[2], raw[3]]) as i32 * 10,
        y_mm: i16::from_le_bytes([raw[6], raw[7]]) as i32 * 10,
        z_mm: z as i32 * 10,
        assoc_id: raw[1],
        side: EndSide::from((z % 3) as u8),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(x: i32, y: i32, z: i32, qf: u8) -> AnchorReading {
        AnchorReading {
            idx: 0,
            id: "459A".to_owned(),
            x_mm: x,
            y_mm: y,
            z_mm: z,
            dist_mm: 2833,
            qf: Some(qf),
        }
    }

    #[test]
    fn master_label_round_trip() {
        // x = 120 cm, y = -30 cm, z = 80 cm, id 7, side A
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&120i16.to_le_bytes());
        bytes.extend_from_slice(&(-30i16).to_le_bytes());
        bytes.extend_from_slice(&80u16.to_le_bytes());
        bytes.push(7);
        bytes.push(2);
        let label = STANDARD.encode(&bytes);

        let pos = decode_master_label(&label).unwrap();

        assert_eq!(
            pos,
            InfoPosition {
                x_mm: 1200,
                y_mm: -300,
                z_mm: 800,
                assoc_id: 7,
                side: EndSide::A,
            }
        );
    }

    #[test]
    fn master_label_side_b_and_unknown() {
        let mut bytes = vec![0u8; 8];
        bytes[7] = 1;
        let pos = decode_master_label(&STANDARD.encode(&bytes)).unwrap();
        assert_eq!(pos.side, EndSide::B);

        bytes[7] = 9;
        let pos = decode_master_label(&STANDARD.encode(&bytes)).unwrap();
        assert_eq!(pos.side, EndSide::Unknown);
    }

    #[test]
    fn bad_labels_are_rejected() {
        assert!(matches!(
            decode_master_label("not@base64!"),
            Err(LabelError::Base64(_))
        ));
        assert!(matches!(
            decode_master_label(&STANDARD.encode([1, 2, 3])),
            Err(LabelError::TooShort(3))
        ));
    }

    #[test]
    fn slave_recovery_from_field_capture() {
        // Raw anchor integers captured during the field test; the slave had
        // encoded x = 190 cm (bytes 2-3 of x), y = -92 cm, z = 97 cm.
        let x = i32::from_le_bytes([0, 0, 190, 0]);
        let y = i32::from_le_bytes([0, 0, 164, 255]); // -92 as i16 LE
        let z = i32::from_le_bytes([0, 0, 97, 0]);

        let info = recover_slave_info(&reading(x, y, z, 100));

        assert_eq!(info.x_mm, 1900);
        assert_eq!(info.y_mm, -920);
        assert_eq!(info.z_mm, 970);
        assert_eq!(info.assoc_id, 0);
        // 97 % 3 == 1 -> side B
        assert_eq!(info.side, EndSide::B);
    }

    #[test]
    fn slave_side_from_z_modulus() {
        let z_for = |code: u16| i32::from_le_bytes([0, 0, code.to_le_bytes()[0], 0]);

        // z % 3: 2 -> A, 1 -> B, 0 -> unknown
        assert_eq!(
            recover_slave_info(&reading(0, 0, z_for(2), 0)).side,
            EndSide::A
        );
        assert_eq!(
            recover_slave_info(&reading(0, 0, z_for(4), 0)).side,
            EndSide::B
        );
        assert_eq!(
            recover_slave_info(&reading(0, 0, z_for(3), 0)).side,
            EndSide::Unknown
        );
    }

    #[test]
    fn missing_qf_defaults_to_zero() {
        let mut r = reading(0, 0, 0, 0);
        r.qf = None;
        let info = recover_slave_info(&r);
        assert_eq!(info.x_mm, 0);
        assert_eq!(info.side, EndSide::Unknown);
    }
}
