//! Decoders for the DWM1001 location-engine report lines that the modules
//! stream over UART.
//!
//! Two firmware flavors are supported:
//!
//! - The OEM firmware in `lec` mode reports decimal meters:
//!
//!   ```text
//!   DIST,4,AN0,022E,7.94,8.03,0.00,3.38,AN1,9280,7.95,0.00,0.00,5.49,POS,6.95,5.37,-1.97,52
//!   ```
//!
//! - The accelerometer-enabled firmware reports integer millimeters:
//!
//!   ```text
//!   DIST,4;[AN0,C584,160,0,-1510]=[1176,100];[AN1,8287,-2700,0,1340]=[2801,100];POS=[502,827,803,58];ACC=[-512,768,9449];UWBLOCALTIME,38439537;
//!   ```
//!
//! At high update rates the firmware interleaves reports and emits convoluted
//! lines with truncated or duplicated anchor segments. The decoder scans for
//! individual segments and skips the malformed ones instead of discarding the
//! whole line.

use nom::{
    bytes::complete::tag,
    character::complete::{
        char, i32 as nom_i32, one_of, u32 as nom_u32, u64 as nom_u64, u8 as nom_u8,
    },
    combinator::map,
    multi::count,
    number::complete::double,
    sequence::{preceded, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which DWM1001 firmware produced the report line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
pub enum Firmware {
    /// Decawave OEM firmware, `lec` shell mode, decimal meters.
    Oem,
    /// The accelerometer-enabled firmware, integer millimeters.
    AccelEnabled,
}

/// One anchor's entry in a ranging report. Coordinates and distance are
/// normalized to millimeters for both firmware flavors. The raw integer
/// fields are kept as reported because the accelerometer-enabled firmware
/// smuggles the anchor's mounting position through them (see
/// [`crate::label::recover_slave_info`]).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AnchorReading {
    /// Slot index of the anchor in the report (the `N` of `ANN`).
    pub idx: u8,
    /// Four-hex-digit short address, uppercase.
    pub id: String,
    /// Reported x, in millimeters.
    pub x_mm: i32,
    /// Reported y, in millimeters.
    pub y_mm: i32,
    /// Reported z, in millimeters.
    pub z_mm: i32,
    /// Measured range to the anchor, in millimeters.
    pub dist_mm: i32,
    /// Quality factor, only present on the accelerometer-enabled firmware.
    pub qf: Option<u8>,
}

/// The module's own position estimate, when the location engine solved one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PositionEstimate {
    /// Estimated x, in millimeters.
    pub x_mm: i32,
    /// Estimated y, in millimeters.
    pub y_mm: i32,
    /// Estimated z, in millimeters.
    pub z_mm: i32,
    /// Solver quality factor, 0-100.
    pub qf: u8,
}

/// Accelerometer sample attached to a report, raw sensor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Acceleration {
    #[allow(missing_docs)]
    pub x: i32,
    #[allow(missing_docs)]
    pub y: i32,
    #[allow(missing_docs)]
    pub z: i32,
}

/// A decoded `DIST` report line.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct RangingReport {
    /// Every anchor segment that could be salvaged from the line.
    pub anchors: Vec<AnchorReading>,
    /// Estimated position, if the location engine produced one.
    pub est_pos: Option<PositionEstimate>,
    /// Accelerometer sample, accelerometer-enabled firmware only.
    pub acc: Option<Acceleration>,
    /// Module-local timestamp in milliseconds, accelerometer-enabled only.
    pub local_time_ms: Option<u64>,
}

/// Returned when a line cannot be decoded as a ranging report.
#[derive(Debug)]
pub enum ReportError {
    /// The line does not begin with `DIST` and is not a report at all.
    NotAReport(String),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::NotAReport(line) => write!(f, "not a DIST report line: {:?}", line),
        }
    }
}

impl std::error::Error for ReportError {}

fn parse_short_id(s: &str) -> IResult<&str, String> {
    map(
        count(one_of("0123456789ABCDEFabcdef"), 4),
        |cs: Vec<char>| cs.into_iter().map(|c| c.to_ascii_uppercase()).collect(),
    )(s)
}

/// Meters with two decimals, as printed by the OEM firmware.
fn meters_as_mm(s: &str) -> IResult<&str, i32> {
    map(double, |m| (m * 1000.0).round() as i32)(s)
}

/// `AN0,022E,7.94,8.03,0.00,3.38`
fn oem_anchor(s: &str) -> IResult<&str, AnchorReading> {
    map(
        tuple((
            preceded(tag("AN"), nom_u8),
            preceded(char(','), parse_short_id),
            preceded(char(','), meters_as_mm),
            preceded(char(','), meters_as_mm),
            preceded(char(','), meters_as_mm),
            preceded(char(','), meters_as_mm),
        )),
        |(idx, id, x_mm, y_mm, z_mm, dist_mm)| AnchorReading {
            idx,
            id,
            x_mm,
            y_mm,
            z_mm,
            dist_mm,
            qf: None,
        },
    )(s)
}

/// `[AN0,C584,160,0,-1510]=[1176,100];`
fn accel_anchor(s: &str) -> IResult<&str, AnchorReading> {
    map(
        tuple((
            preceded(tag("[AN"), nom_u8),
            preceded(char(','), parse_short_id),
            preceded(char(','), nom_i32),
            preceded(char(','), nom_i32),
            preceded(char(','), nom_i32),
            preceded(tag("]=["), nom_i32),
            preceded(char(','), nom_u8),
            tag("];"),
        )),
        |(idx, id, x_mm, y_mm, z_mm, dist_mm, qf, _)| AnchorReading {
            idx,
            id,
            x_mm,
            y_mm,
            z_mm,
            dist_mm,
            qf: Some(qf),
        },
    )(s)
}

/// `POS,6.95,5.37,-1.97,52`
fn oem_position(s: &str) -> IResult<&str, PositionEstimate> {
    map(
        tuple((
            preceded(tag("POS,"), meters_as_mm),
            preceded(char(','), meters_as_mm),
            preceded(char(','), meters_as_mm),
            preceded(char(','), nom_u8),
        )),
        |(x_mm, y_mm, z_mm, qf)| PositionEstimate { x_mm, y_mm, z_mm, qf },
    )(s)
}

/// `POS=[502,827,803,58];`
fn accel_position(s: &str) -> IResult<&str, PositionEstimate> {
    map(
        tuple((
            preceded(tag("POS=["), nom_i32),
            preceded(char(','), nom_i32),
            preceded(char(','), nom_i32),
            preceded(char(','), nom_u8),
            tag("];"),
        )),
        |(x_mm, y_mm, z_mm, qf, _)| PositionEstimate { x_mm, y_mm, z_mm, qf },
    )(s)
}

/// `ACC=[-512,768,9449];`
fn accel_acc(s: &str) -> IResult<&str, Acceleration> {
    map(
        tuple((
            preceded(tag("ACC=["), nom_i32),
            preceded(char(','), nom_i32),
            preceded(char(','), nom_i32),
            tag("];"),
        )),
        |(x, y, z, _)| Acceleration { x, y, z },
    )(s)
}

/// `UWBLOCALTIME,38439537;`
fn accel_local_time(s: &str) -> IResult<&str, u64> {
    map(
        tuple((preceded(tag("UWBLOCALTIME,"), nom_u64), char(';'))),
        |(t, _)| t,
    )(s)
}

/// Scans `line` for every occurrence of `marker` and attempts `parser` there,
/// collecting the hits. A failed attempt advances past the marker, so one
/// garbled segment never takes the rest of the line with it.
fn salvage_scan<'a, T>(
    line: &'a str,
    marker: &str,
    parser: impl Fn(&'a str) -> IResult<&'a str, T>,
) -> Vec<T> {
    let mut found = Vec::new();
    let mut rest = line;
    while let Some(at) = rest.find(marker) {
        let candidate = &rest[at..];
        match parser(candidate) {
            Ok((leftover, item)) => {
                found.push(item);
                rest = leftover;
            }
            Err(_) => {
                rest = &candidate[marker.len()..];
            }
        }
    }
    found
}

fn first_match<'a, T>(
    line: &'a str,
    marker: &str,
    parser: impl Fn(&'a str) -> IResult<&'a str, T>,
) -> Option<T> {
    salvage_scan(line, marker, parser).into_iter().next()
}

impl RangingReport {
    /// Decodes one UART line as a ranging report of the given firmware
    /// flavor. Anchor readings appear in line order; duplicated segments for
    /// the same slot are all kept, matching the salvage behavior of the
    /// original field scripts.
    pub fn parse(line: &str, firmware: Firmware) -> Result<Self, ReportError> {
        let line = line.trim();
        if !line.starts_with("DIST") {
            return Err(ReportError::NotAReport(line.to_owned()));
        }

        let report = match firmware {
            Firmware::Oem => RangingReport {
                anchors: salvage_scan(line, "AN", oem_anchor),
                est_pos: first_match(line, "POS,", oem_position),
                acc: None,
                local_time_ms: None,
            },
            Firmware::AccelEnabled => RangingReport {
                anchors: salvage_scan(line, "[AN", accel_anchor),
                est_pos: first_match(line, "POS=[", accel_position),
                acc: first_match(line, "ACC=[", accel_acc),
                local_time_ms: first_match(line, "UWBLOCALTIME,", accel_local_time),
            },
        };

        Ok(report)
    }

    /// The anchor count the firmware claimed, which can exceed the number of
    /// readings that survived salvage.
    pub fn declared_count(line: &str) -> Option<u32> {
        first_match(line, "DIST,", |s| preceded(tag("DIST,"), nom_u32)(s))
    }
}
