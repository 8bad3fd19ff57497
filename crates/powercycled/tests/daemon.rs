//! End-to-end: a daemon wired to a fake rig API and a fake grid meter.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use powercycle_adapters::client;
use powercycle_core::PowerCycleConfig;
use powercycle_ledger::{DeviceLedger, RedbLedger};
use powercycled::Daemon;
use powercycled::app::LEDGER_FILE;

type Calls = Arc<Mutex<Vec<(String, String)>>>;

async fn fake_rig() -> (String, Calls) {
    let calls: Calls = Arc::default();
    let handler = |action: &'static str| {
        move |State(calls): State<Calls>, Query(q): Query<HashMap<String, String>>| async move {
            let id = q.get("asic").cloned().unwrap_or_default();
            calls.lock().unwrap().push((action.to_string(), id));
            StatusCode::OK
        }
    };
    let router = Router::new()
        .route("/start", get(handler("start")))
        .route("/stop", get(handler("stop")))
        .with_state(calls.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    (format!("http://{addr}"), calls)
}

/// Modbus-TCP meter answering every register read with `raw`.
async fn fake_grid_meter(raw: u16) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut req = [0u8; 12];
                while socket.read_exact(&mut req).await.is_ok() {
                    let [hi, lo] = raw.to_be_bytes();
                    let resp = [req[0], req[1], 0, 0, 0, 5, req[6], 0x03, 2, hi, lo];
                    if socket.write_all(&resp).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    addr
}

async fn get_json(url: &str) -> serde_json::Value {
    let resp = client::get(url, Duration::from_secs(2)).await.unwrap();
    assert!(resp.is_success(), "{url} returned {}", resp.status);
    serde_json::from_slice(&resp.body).unwrap()
}

fn calls_for(calls: &Calls, action: &str) -> Vec<String> {
    let mut ids: Vec<String> = calls
        .lock()
        .unwrap()
        .iter()
        .filter(|(a, _)| a == action)
        .map(|(_, id)| id.clone())
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn daemon_cycles_fleet_within_budget() {
    let (rig_url, calls) = fake_rig().await;
    let meter = fake_grid_meter(5000).await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = PowerCycleConfig::default();
    config.scheduler.poll_interval = "50ms".to_string();
    config.scheduler.command_timeout = "1s".to_string();
    config.power.static_kw = 7.0;
    config.rig.api_url = rig_url;
    config.stability.sensor_addr = meter.to_string();
    config.devices.ids = vec!["asic-1".into(), "asic-2".into(), "asic-3".into()];

    let daemon = Daemon::assemble(&config, dir.path()).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let api = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(daemon.run(listener, async {
        let _ = stop_rx.await;
    }));

    let mut dashboard = serde_json::Value::Null;
    for _ in 0..60 {
        dashboard = get_json(&format!("http://{api}/dashboard")).await;
        if dashboard["data"]["ticks_total"].as_u64().unwrap_or(0) >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let data = &dashboard["data"];
    assert!(data["ticks_total"].as_u64().unwrap() >= 3);
    assert_eq!(data["frequency_hz"], 50.0);
    assert_eq!(data["stability_ok"], true);
    assert_eq!(data["active_count"], 2);
    assert_eq!(data["max_active"], 2);
    assert_eq!(data["supply_shortfall"], true);

    // Cached commands are not re-sent on later ticks.
    assert_eq!(calls_for(&calls, "start"), ["asic-1", "asic-2"]);
    assert_eq!(calls_for(&calls, "stop"), ["asic-3"]);

    let devices = get_json(&format!("http://{api}/api/v1/devices")).await;
    let rows = devices["data"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2]["id"], "asic-3");
    assert_eq!(rows[2]["cycles_off"], 1);
    assert_eq!(rows[2]["command"], "inactive");

    let metrics = client::get(&format!("http://{api}/metrics"), Duration::from_secs(2))
        .await
        .unwrap();
    let text = String::from_utf8_lossy(&metrics.body).to_string();
    assert!(text.contains("powercycle_active_devices 2\n"));

    stop_tx.send(()).unwrap();
    running.await.unwrap().unwrap();

    // Cycle counts survive a restart.
    let ledger = RedbLedger::open(&dir.path().join(LEDGER_FILE)).unwrap();
    assert_eq!(ledger.get("asic-3").unwrap().unwrap().cycles_off, 1);
    assert_eq!(ledger.get("asic-1").unwrap().unwrap().cycles_off, 0);
}

#[test]
fn sample_config_is_valid() {
    let config =
        PowerCycleConfig::from_toml_str(include_str!("../../../demos/powercycle.toml")).unwrap();
    config.validate().unwrap();
    assert_eq!(config.devices.ids.len(), 4);
    assert_eq!(config.power.static_kw, 560.0);
}
