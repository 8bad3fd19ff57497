//! Prometheus text exposition format.

use std::fmt::Write;

use crate::collector::MetricsSnapshot;

/// Render a metrics snapshot into Prometheus text format.
///
/// Gauges describe the latest tick and are omitted until one completes;
/// counters are always present.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    if let Some(report) = &snapshot.latest {
        gauge(
            &mut out,
            "powercycle_active_devices",
            "Devices commanded or cached active after the last tick.",
            report.active_count() as f64,
        );
        gauge(
            &mut out,
            "powercycle_max_active_devices",
            "Devices the power budget allowed in the last tick.",
            report.outcome.max_active as f64,
        );
        gauge(
            &mut out,
            "powercycle_available_power_kw",
            "Available supply power in kW.",
            report.available_power_kw,
        );
        gauge(
            &mut out,
            "powercycle_stability_value",
            "Last stability signal reading (grid frequency, Hz).",
            report.stability_value,
        );
        gauge(
            &mut out,
            "powercycle_supply_shortfall",
            "1 when the power budget cannot cover the whole fleet.",
            if report.supply_shortfall { 1.0 } else { 0.0 },
        );
        if let Some(up) = report.network_up {
            gauge(
                &mut out,
                "powercycle_network_up",
                "1 when the upstream pool was reachable in the last tick.",
                if up { 1.0 } else { 0.0 },
            );
        }
    }

    let _ = writeln!(out, "# HELP powercycle_ticks_total Completed scheduling passes.");
    let _ = writeln!(out, "# TYPE powercycle_ticks_total counter");
    let _ = writeln!(out, "powercycle_ticks_total {}", snapshot.ticks_total);

    let _ = writeln!(out, "# HELP powercycle_commands_total Device commands by outcome.");
    let _ = writeln!(out, "# TYPE powercycle_commands_total counter");
    for (outcome, value) in [
        ("issued", snapshot.commands_issued_total),
        ("skipped", snapshot.commands_skipped_total),
        ("failed", snapshot.commands_failed_total),
    ] {
        let _ = writeln!(out, "powercycle_commands_total{{outcome=\"{outcome}\"}} {value}");
    }

    let _ = writeln!(
        out,
        "# HELP powercycle_ledger_failures_total Ledger writes that failed after a retry."
    );
    let _ = writeln!(out, "# TYPE powercycle_ledger_failures_total counter");
    let _ = writeln!(
        out,
        "powercycle_ledger_failures_total {}",
        snapshot.ledger_failures_total
    );

    let _ = writeln!(out, "# HELP powercycle_alerts_total Alerts raised.");
    let _ = writeln!(out, "# TYPE powercycle_alerts_total counter");
    let _ = writeln!(out, "powercycle_alerts_total {}", snapshot.alerts_total);

    out
}

fn gauge(out: &mut String, name: &str, help: &str, value: f64) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
    let _ = writeln!(out, "{name} {value}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::TickMetrics;
    use crate::collector::tests::report;
    use powercycle_core::MetricsSink;

    #[test]
    fn render_before_first_tick_has_only_counters() {
        let output = render_prometheus(&MetricsSnapshot::default());
        assert!(output.contains("powercycle_ticks_total 0"));
        assert!(output.contains("powercycle_commands_total{outcome=\"failed\"} 0"));
        assert!(!output.contains("powercycle_active_devices"));
    }

    #[tokio::test]
    async fn render_after_tick() {
        let metrics = TickMetrics::new();
        metrics.record_tick(&report(2, &["power high"])).await;
        let output = render_prometheus(&metrics.snapshot().await);

        assert!(output.contains("# TYPE powercycle_active_devices gauge"));
        assert!(output.contains("powercycle_active_devices 2\n"));
        assert!(output.contains("powercycle_max_active_devices 2\n"));
        assert!(output.contains("powercycle_available_power_kw 10\n"));
        assert!(output.contains("powercycle_stability_value 50.01\n"));
        assert!(output.contains("powercycle_supply_shortfall 1\n"));
        assert!(output.contains("powercycle_network_up 1\n"));
        assert!(output.contains("powercycle_ticks_total 1\n"));
        assert!(output.contains("powercycle_commands_total{outcome=\"issued\"} 1\n"));
        assert!(output.contains("powercycle_ledger_failures_total 1\n"));
        assert!(output.contains("powercycle_alerts_total 1\n"));
    }

    #[tokio::test]
    async fn untracked_connectivity_has_no_gauge() {
        let metrics = TickMetrics::new();
        let mut tick = report(1, &[]);
        tick.network_up = None;
        metrics.record_tick(&tick).await;
        let output = render_prometheus(&metrics.snapshot().await);

        assert!(output.contains("powercycle_active_devices 1\n"));
        assert!(!output.contains("powercycle_network_up"));

        tick.network_up = Some(false);
        metrics.record_tick(&tick).await;
        let output = render_prometheus(&metrics.snapshot().await);
        assert!(output.contains("powercycle_network_up 0\n"));
    }

    #[tokio::test]
    async fn render_format_is_prometheus_compatible() {
        let metrics = TickMetrics::new();
        metrics.record_tick(&report(1, &[])).await;
        let output = render_prometheus(&metrics.snapshot().await);

        // Every sample line is `name[{labels}] value`.
        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.rsplitn(2, ' ');
            let value = parts.next().unwrap();
            let name = parts.next().unwrap();
            assert!(value.parse::<f64>().is_ok(), "bad value in {line}");
            assert!(name.starts_with("powercycle_"), "bad name in {line}");
        }
    }
}
