use crate::client::HttpTransport;
use crate::filter::DeviceFilter;
use crate::services::sync::{Phase, SnapshotClient, SnapshotState};
use crate::viewport::{MapView, Viewport};
use log::{info, warn};
use std::thread;
use std::time::{Duration, Instant};

/// Poll the snapshot endpoint at a steady cadence and log what a map view
/// would render. Returns after the first tick when `once` is set.
pub fn run_loop(transport: HttpTransport, filter: DeviceFilter, interval: Duration, once: bool) -> Result<(), String> {
    info!("Watching {} (filter={}, interval={}s)", transport.url(), filter, interval.as_secs());
    let mut client = SnapshotClient::new(transport);
    let mut view = MapView::default();
    client.request(filter);

    loop {
        let tick_start = Instant::now();
        client.settle();
        let state = client.state();
        report_tick(&state, &mut view);

        if once {
            return match (state.phase, state.error) {
                (Phase::Error, Some(e)) => Err(format!("snapshot fetch failed: {}", e)),
                _ => Ok(()),
            };
        }

        // Maintain steady cadence
        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
        client.refresh();
    }
}

fn report_tick(state: &SnapshotState, view: &mut MapView) {
    match state.phase {
        Phase::Error => warn!(
            "Snapshot unavailable: {} (keeping {} marker(s) on screen)",
            state.error.as_deref().unwrap_or("unknown error"),
            view.markers().len()
        ),
        Phase::Success => {
            let viewport = view.set_markers(state.visible_markers());
            let without_reading = view.markers().iter().filter(|m| m.reading.is_none()).count();
            info!(
                "Snapshot: {} visible marker(s) of {} received, {} without readings; {}",
                view.markers().len(),
                state.markers.len(),
                without_reading,
                describe_viewport(&viewport)
            );
            for m in view.markers() {
                match &m.reading {
                    Some(r) => info!(
                        "  {} @ ({:.4}, {:.4}) pm25={} temp={} at {}",
                        m.device_id,
                        m.lat,
                        m.lng,
                        fmt_opt(r.pm25),
                        fmt_opt(r.temp),
                        r.recorded_at.to_rfc3339()
                    ),
                    None => info!("  {} @ ({:.4}, {:.4}) no reading yet", m.device_id, m.lat, m.lng),
                }
            }
        }
        Phase::Idle | Phase::Loading => {}
    }
}

fn describe_viewport(viewport: &Viewport) -> String {
    match viewport {
        Viewport::Centered { center, zoom } => {
            format!("default view at ({:.4}, {:.4}) zoom {}", center.lat, center.lng, zoom)
        }
        Viewport::Fit { bounds } => format!(
            "fit to [{:.4}, {:.4}] - [{:.4}, {:.4}]",
            bounds.south, bounds.west, bounds.north, bounds.east
        ),
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_else(|| "--".to_string())
}
