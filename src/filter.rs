/// One-sided outlier filter for RSSI sample windows.
///
/// Indoor multipath fading shows up as sudden attenuation, so only samples
/// more than two standard deviations *below* the window mean are dropped.
/// Strong spikes are kept. No state is carried between cycles; every cycle
/// filters its own full window.
use crate::registry::GatewayRegistry;

/// Filtered mean of one sample window.
///
/// Keeps samples with `x >= mean - 2 * std_dev` (population standard
/// deviation) and averages them. Falls back to the plain mean if nothing is
/// kept, and returns 0.0 for an empty window.
pub fn filtered_mean(samples: &[i8]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let n = samples.len() as f32;
    let sum: i32 = samples.iter().map(|&x| x as i32).sum();
    let mean = sum as f32 / n;

    let variance = samples
        .iter()
        .map(|&x| {
            let d = x as f32 - mean;
            d * d
        })
        .sum::<f32>()
        / n;

    // x >= mean - 2σ  <=>  x >= mean, or (mean - x)² <= 4σ²
    let limit = 4.0 * variance;
    let mut kept_sum: i32 = 0;
    let mut kept: u32 = 0;
    for &x in samples {
        let below = mean - x as f32;
        if below <= 0.0 || below * below <= limit {
            kept_sum += x as i32;
            kept += 1;
        }
    }

    if kept == 0 {
        return mean;
    }
    kept_sum as f32 / kept as f32
}

/// Run the filter over every ready gateway, storing `filtered_rssi`.
///
/// Returns the number of gateways filtered.
pub fn apply(registry: &mut GatewayRegistry) -> usize {
    let mut filtered = 0;
    for record in registry.records_mut().iter_mut().filter(|r| r.ready) {
        record.filtered_rssi = filtered_mean(&record.samples);
        log::debug!(
            "Gateway {} filtered RSSI {} dBm",
            record.name(),
            record.filtered_rssi
        );
        filtered += 1;
    }
    filtered
}
