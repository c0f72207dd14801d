//! Corrects raw antenna-to-antenna UWB ranges into bumper-to-bumper
//! longitudinal clearance between two vehicles.

use crate::label::InfoPosition;

/// Projects a raw range onto the travel axis and subtracts both antennas'
/// longitudinal mounting offsets:
///
/// ```text
/// corrected = sqrt(d^2 - dz^2 - dy^2) - x_master - x_slave
/// ```
///
/// where `dy` folds in that the two vehicles face each other, so the slave's
/// lateral offset flips sign. Returns `None` when the vertical and lateral
/// separation alone exceed the measured range, which happens on noisy
/// close-range readings and leaves no defined correction.
pub fn corrected_distance_mm(
    dist_mm: i32,
    master: &InfoPosition,
    slave: &InfoPosition,
) -> Option<i32> {
    let d = dist_mm as f64;
    let dy = (master.y_mm - (-slave.y_mm)).abs() as f64;
    let dz = (master.z_mm - slave.z_mm).abs() as f64;

    let along = d * d - dz * dz - dy * dy;
    if along < 0.0 {
        return None;
    }

    Some((along.sqrt() - master.x_mm as f64 - slave.x_mm as f64).round() as i32)
}
