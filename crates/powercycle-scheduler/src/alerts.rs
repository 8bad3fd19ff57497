//! Edge-triggered alert policy.
//!
//! Raises one message when the stability signal drops below its
//! threshold and one when measured power exceeds the safe ceiling. Each
//! condition re-arms only after it has cleared, so a sustained fault
//! produces a single alert rather than one per tick.

use tracing::info;

#[derive(Debug, Clone)]
pub struct AlertPolicy {
    stability_threshold: f64,
    safe_ceiling_kw: f64,
    stability_low: bool,
    power_high: bool,
}

impl AlertPolicy {
    pub fn new(stability_threshold: f64, safe_ceiling_kw: f64) -> Self {
        Self {
            stability_threshold,
            safe_ceiling_kw,
            stability_low: false,
            power_high: false,
        }
    }

    /// Feed one tick's readings; returns the alerts to deliver.
    pub fn evaluate(&mut self, stability_value: f64, power_kw: f64) -> Vec<String> {
        let mut alerts = Vec::new();

        let low = stability_value < self.stability_threshold;
        if low && !self.stability_low {
            alerts.push(format!("Grid frequency dropped to {stability_value} Hz"));
        } else if !low && self.stability_low {
            info!(value = stability_value, "grid frequency recovered");
        }
        self.stability_low = low;

        let high = power_kw > self.safe_ceiling_kw;
        if high && !self.power_high {
            alerts.push(format!(
                "Power usage {power_kw} kW exceeded safe threshold {} kW",
                self.safe_ceiling_kw
            ));
        } else if !high && self.power_high {
            info!(power_kw, "power usage back under safe threshold");
        }
        self.power_high = high;

        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_readings_raise_nothing() {
        let mut policy = AlertPolicy::new(49.5, 560.0);
        assert!(policy.evaluate(50.0, 300.0).is_empty());
    }

    #[test]
    fn frequency_drop_alerts_once_until_recovered() {
        let mut policy = AlertPolicy::new(49.5, 560.0);

        let alerts = policy.evaluate(49.2, 0.0);
        assert_eq!(alerts, ["Grid frequency dropped to 49.2 Hz"]);
        assert!(policy.evaluate(49.1, 0.0).is_empty());

        assert!(policy.evaluate(50.0, 0.0).is_empty());
        assert_eq!(policy.evaluate(49.0, 0.0).len(), 1);
    }

    #[test]
    fn threshold_itself_is_not_low() {
        let mut policy = AlertPolicy::new(49.5, 560.0);
        assert!(policy.evaluate(49.5, 0.0).is_empty());
    }

    #[test]
    fn power_ceiling_alerts_once_until_cleared() {
        let mut policy = AlertPolicy::new(49.5, 560.0);

        let alerts = policy.evaluate(50.0, 600.0);
        assert_eq!(alerts, ["Power usage 600 kW exceeded safe threshold 560 kW"]);
        assert!(policy.evaluate(50.0, 650.0).is_empty());
        assert!(policy.evaluate(50.0, 560.0).is_empty());
        assert_eq!(policy.evaluate(50.0, 561.0).len(), 1);
    }

    #[test]
    fn both_conditions_in_one_tick() {
        let mut policy = AlertPolicy::new(49.5, 560.0);
        assert_eq!(policy.evaluate(48.0, 700.0).len(), 2);
    }
}
