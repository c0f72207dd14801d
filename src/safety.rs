//! Maps a vehicle end's detection list to the proximity alert the driver
//! display consumes.

use crate::accumulator::Detection;
use crate::label::EndSide;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Clearance below this is an alarm, mm.
pub const LIMIT_ALARM_MM: i32 = 3_000;
/// Clearance below this (and above the alarm limit) is a warning, mm.
pub const LIMIT_WARNING_MM: i32 = 10_000;

/// The alert state for one vehicle end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum AlertLevel {
    /// Nearest target is beyond the warning limit.
    Safe,
    /// Nearest target is inside the warning limit.
    Warning,
    /// Nearest target is inside the alarm limit.
    Alarm,
    /// No foreign vehicle in range.
    OutOfRange,
    /// Targets detected, but none with a defined corrected clearance.
    Error,
}

/// Millimeters or feet on the display line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
pub enum LengthUnit {
    /// Meters.
    Metric,
    /// Feet.
    Imperial,
}

impl LengthUnit {
    fn render(&self, mm: i32) -> String {
        match self {
            LengthUnit::Metric => format!("{:.1} m", mm as f64 / 1000.0),
            LengthUnit::Imperial => format!("{:.1} ft", mm as f64 / 304.8),
        }
    }
}

/// Classifies a nearest-first detection list with the default limits.
pub fn classify(detections: &[Detection]) -> AlertLevel {
    classify_with(detections, LIMIT_ALARM_MM, LIMIT_WARNING_MM)
}

/// Classifies a nearest-first detection list against deployment-specific
/// limits. Detections without a defined correction only count when nothing
/// better is available.
pub fn classify_with(detections: &[Detection], alarm_mm: i32, warning_mm: i32) -> AlertLevel {
    let Some(nearest) = detections.first() else {
        return AlertLevel::OutOfRange;
    };

    match nearest.corrected_mm {
        None => AlertLevel::Error,
        Some(mm) if mm < alarm_mm => AlertLevel::Alarm,
        Some(mm) if mm < warning_mm => AlertLevel::Warning,
        Some(_) => AlertLevel::Safe,
    }
}

/// One display line for a vehicle end, e.g. `A:459A 2.8 m` or
/// `B End OutOfRange`.
pub fn display_line(side: EndSide, detections: &[Detection], unit: LengthUnit) -> String {
    match classify(detections) {
        AlertLevel::OutOfRange => format!("{} End OutOfRange", side),
        AlertLevel::Error => format!("{} End RangingError", side),
        _ => {
            let nearest = &detections[0];
            let mm = nearest.corrected_mm.expect("classified levels have a correction");
            format!("{}:{} {}", side, nearest.anchor_id, unit.render(mm))
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertLevel::Safe => "SAFE",
            AlertLevel::Warning => "WARNING",
            AlertLevel::Alarm => "ALARM",
            AlertLevel::OutOfRange => "OUT-OF-RANGE",
            AlertLevel::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(corrected: Option<i32>) -> Detection {
        Detection {
            side: EndSide::A,
            anchor_id: "459A".to_owned(),
            target_side: EndSide::B,
            corrected_mm: corrected,
            raw_dist_mm: corrected.unwrap_or(0),
            superframe: 0,
        }
    }

    #[test]
    fn thresholds() {
        assert_eq!(classify(&[detection(Some(2_999))]), AlertLevel::Alarm);
        assert_eq!(classify(&[detection(Some(3_000))]), AlertLevel::Warning);
        assert_eq!(classify(&[detection(Some(9_999))]), AlertLevel::Warning);
        assert_eq!(classify(&[detection(Some(10_000))]), AlertLevel::Safe);
    }

    #[test]
    fn custom_limits() {
        assert_eq!(
            classify_with(&[detection(Some(4_000))], 5_000, 20_000),
            AlertLevel::Alarm
        );
        assert_eq!(
            classify_with(&[detection(Some(4_000))], 1_000, 2_000),
            AlertLevel::Safe
        );
    }

    #[test]
    fn negative_clearance_is_an_alarm() {
        // Bumpers overlapping is as close as it gets.
        assert_eq!(classify(&[detection(Some(-500))]), AlertLevel::Alarm);
    }

    #[test]
    fn empty_and_uncorrected_lists() {
        assert_eq!(classify(&[]), AlertLevel::OutOfRange);
        assert_eq!(classify(&[detection(None)]), AlertLevel::Error);
    }

    #[test]
    fn display_lines() {
        assert_eq!(
            display_line(EndSide::A, &[detection(Some(2_800))], LengthUnit::Metric),
            "A:459A 2.8 m"
        );
        assert_eq!(
            display_line(EndSide::B, &[], LengthUnit::Metric),
            "B End OutOfRange"
        );
        assert_eq!(
            display_line(EndSide::B, &[detection(None)], LengthUnit::Metric),
            "B End RangingError"
        );
    }

    #[test]
    fn imperial_rendering() {
        // 3048 mm is exactly 10 feet.
        assert_eq!(
            display_line(EndSide::A, &[detection(Some(3_048))], LengthUnit::Imperial),
            "A:459A 10.0 ft"
        );
    }
}
