//! Power budget → concurrently-active device count.

use powercycle_core::UnitPower;

/// Maximum number of devices that may run at once.
///
/// `min(total_devices, floor(available_power_kw / unit_power))`, with
/// negative or NaN power treated as none available.
pub fn max_active(available_power_kw: f64, unit_power: UnitPower, total_devices: usize) -> usize {
    if available_power_kw.is_nan() || available_power_kw <= 0.0 {
        return 0;
    }
    let fit = (available_power_kw / unit_power.kw()).floor();
    if fit >= total_devices as f64 {
        total_devices
    } else {
        fit as usize
    }
}
