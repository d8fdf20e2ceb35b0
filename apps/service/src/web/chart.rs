use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::database::models::{CheckData, ChecksRequest};

const FONT_SIZE: i64 = 12;
const X_STEPS: i64 = 24;
const Y_STEPS: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChartState {
    Up,
    Down,
    Unknown,
}

impl ChartState {
    fn class(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Unknown => "na",
        }
    }
}

/// Floor a unix timestamp to the tick interval.
pub fn truncate_to_interval(ts: i64, interval_secs: i64) -> i64 {
    ts.div_euclid(interval_secs) * interval_secs
}

fn svg_open(width: i64, height: i64) -> String {
    format!(
        "<svg width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\" \
         shape-rendering=\"crispEdges\" xmlns=\"http://www.w3.org/2000/svg\" \
         xmlns:xlink=\"http://www.w3.org/1999/xlink\">"
    )
}

fn style_block() -> String {
    format!(
        r#"
<style>
/* <![CDATA[ */
text {{
  font-family: 'Roboto Medium',sans-serif;
  stroke-width: 0;
  stroke: none;
  fill: rgba(51,51,51,1.0);
  font-size: {FONT_SIZE}px;
}}
text.stat {{
  font-family: 'Roboto Medium',sans-serif;
  stroke-width: 0;
  stroke: none;
  fill: rgba(51,51,51,1.0);
  font-size: {stat_size}px;
  text-anchor:middle;
}}
path {{
  stroke-width: 1;
  stroke: rgba(51,51,51,1.0);
  fill: none;
}}
rect.up {{
  stroke-width: 0;
  stroke: none;
  fill: rgba(102,255,102,1.0);
}}
rect.down {{
  stroke-width: 0;
  stroke: none;
  fill: rgba(255,102,102,1.0);
}}
rect.na {{
  stroke-width: 0;
  stroke: none;
  fill: rgba(102,102,102,1.0);
}}
rect.i {{
  stroke-width: 0;
  stroke: none;
  fill: rgba(102,102,255,1.0);
}}
/* ]]> */
</style>
"#,
        stat_size = FONT_SIZE * 2
    )
}

fn band_rect(x: f64, width: f64, y_top: i64, height: i64, class: &str) -> String {
    format!(
        "<rect x=\"{x}\" y=\"{y_top}\" width=\"{width}\" height=\"{height}\" class=\"{class}\"/>\n"
    )
}

fn format_label_time(ts: i64) -> (String, String) {
    let when: DateTime<Utc> = DateTime::from_timestamp(ts, 0).unwrap_or_default();
    (when.format("%y-%m-%d").to_string(), when.format("%H:%M:%S").to_string())
}

/// Render the availability chart for one host as an SVG document.
///
/// Walks interval-aligned buckets from just past the truncated start
/// through the truncated end. Consecutive buckets of one state merge into
/// a single colored band; rtt bars for up buckets overlay the bands,
/// clamped to the y scale.
pub fn render_chart(
    width: i64,
    height: i64,
    max_rtt_scale_ms: i64,
    interval_secs: i64,
    request: &ChecksRequest,
    buckets: &HashMap<i64, CheckData>,
) -> String {
    let start_t = truncate_to_interval(request.start.timestamp(), interval_secs);
    let end_t = truncate_to_interval(request.end.timestamp(), interval_secs);

    if start_t == end_t || start_t + interval_secs > end_t {
        return format!(
            "{}<text x=\"{}\" y=\"{}\">Requested range is shorter than one check interval</text></svg>\n",
            svg_open(width, height),
            FONT_SIZE,
            FONT_SIZE * 2
        );
    }

    let x_offset = FONT_SIZE * 3;
    let y_offset_bottom = height - FONT_SIZE * 3;
    let y_offset_top = FONT_SIZE * 3;

    let mut svg = svg_open(width, height);
    svg.push_str(&style_block());

    // Axis unit labels and the axis itself.
    svg.push_str(&format!("<text x=\"0\" y=\"{FONT_SIZE}\">ms</text>\n"));
    svg.push_str(&format!("<text x=\"0\" y=\"{}\">T</text>\n", height - FONT_SIZE));
    svg.push_str(&format!(
        "<path  d=\"M {x_offset} 0 L {x_offset} {y_offset_bottom} L {width} {y_offset_bottom}\"/>\n"
    ));

    // X gridline ticks labeled date over time.
    let total_secs = end_t - start_t;
    let step_px = (width - x_offset) as f64 / X_STEPS as f64;
    for i in 0..X_STEPS {
        let x = x_offset as f64 + step_px * i as f64;
        svg.push_str(&format!(
            "<path  d=\"M {x} {y_offset_bottom} L {x} {}\"/>\n",
            y_offset_bottom + 5
        ));

        let (date, time) = format_label_time(start_t + total_secs * i / X_STEPS);
        svg.push_str(&format!(
            "<text x=\"{x}\" y=\"{}\">{date}</text>\n",
            height as f64 - FONT_SIZE as f64 * 1.6
        ));
        svg.push_str(&format!(
            "<text x=\"{x}\" y=\"{}\">{time}</text>\n",
            height as f64 - FONT_SIZE as f64 * 0.6
        ));
    }

    // Y gridline ticks labeled milliseconds.
    let step_ms = max_rtt_scale_ms / Y_STEPS;
    let step_px_y = (y_offset_bottom - y_offset_top) as f64 / Y_STEPS as f64;
    for i in 0..=Y_STEPS {
        let y = y_offset_bottom as f64 - step_px_y * i as f64;
        svg.push_str(&format!("<path  d=\"M {x_offset} {y} L {} {y}\"/>\n", x_offset - 5));
        svg.push_str(&format!("<text x=\"0\" y=\"{y}\">{}</text>\n", step_ms * i));
    }

    // Bucket walk: run-length merge states into bands, collect rtt bars.
    let bucket_count = total_secs / interval_secs;
    let step_x = (width - x_offset) as f64 / bucket_count as f64;
    let band_height = y_offset_bottom - y_offset_top;
    let step_y = band_height as f64 / (max_rtt_scale_ms * 1_000_000) as f64;

    let mut bands = String::new();
    let mut rtt_bars = String::new();
    let (mut stat_up, mut stat_down, mut stat_na) = (0i64, 0i64, 0i64);
    let mut prev: Option<ChartState> = None;
    let mut prev_count = 0i64;
    let mut index = 0i64;

    let mut t = start_t + interval_secs;
    while t <= end_t {
        let current = match buckets.get(&t) {
            Some(check) if check.up => {
                let x = x_offset as f64 + step_x * index as f64;
                let bar_height =
                    (step_y * check.rtt as f64).min(band_height as f64);
                rtt_bars.push_str(&format!(
                    "<rect x=\"{x}\" y=\"{}\" width=\"{step_x}\" height=\"{bar_height}\" class=\"i\"/>\n",
                    y_offset_bottom as f64 - bar_height
                ));
                stat_up += 1;
                ChartState::Up
            }
            Some(_) => {
                stat_down += 1;
                ChartState::Down
            }
            None => {
                stat_na += 1;
                ChartState::Unknown
            }
        };

        if prev == Some(current) {
            prev_count += 1;
        } else {
            if let Some(state) = prev {
                let x = x_offset as f64 + step_x * (index - prev_count) as f64;
                bands.push_str(&band_rect(
                    x,
                    step_x * prev_count as f64,
                    y_offset_top,
                    band_height,
                    state.class(),
                ));
            }
            prev = Some(current);
            prev_count = 1;
        }
        index += 1;
        t += interval_secs;
    }

    if let Some(state) = prev {
        let x = x_offset as f64 + step_x * (index - prev_count) as f64;
        bands.push_str(&band_rect(
            x,
            step_x * prev_count as f64,
            y_offset_top,
            band_height,
            state.class(),
        ));
    }

    svg.push_str(&bands);
    svg.push_str(&rtt_bars);

    let total = index.max(1) as f64;
    svg.push_str(&format!(
        "<text class=\"stat\" x=\"50%\" y=\"{}\">Host: {} Up {:.2}% Down {:.2}% Unknown {:.2}%</text>\n",
        FONT_SIZE * 2,
        request.host,
        100.0 * stat_up as f64 / total,
        100.0 * stat_down as f64 / total,
        100.0 * stat_na as f64 / total,
    ));
    svg.push_str("</svg>\n");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn request(start: i64, end: i64) -> ChecksRequest {
        ChecksRequest { host: "h.example".to_string(), start: ts(start), end: ts(end) }
    }

    fn bucket(at: i64, rtt: i64, up: bool) -> (i64, CheckData) {
        (at, CheckData { check_time: ts(at), rtt, up })
    }

    #[test]
    fn test_truncate_to_interval() {
        assert_eq!(truncate_to_interval(125, 60), 120);
        assert_eq!(truncate_to_interval(120, 60), 120);
        assert_eq!(truncate_to_interval(59, 60), 0);
    }

    #[test]
    fn test_too_short_range_renders_error_text() {
        let svg = render_chart(1280, 720, 200, 60, &request(0, 59), &HashMap::new());
        assert!(svg.contains("shorter than one check interval"));
        assert!(!svg.contains("<rect"));
    }

    #[test]
    fn test_bands_merge_consecutive_states() {
        // Buckets at 60..=360: up,up,down,down,missing,up.
        let buckets: HashMap<i64, CheckData> = [
            bucket(60, 1_000_000, true),
            bucket(120, 2_000_000, true),
            bucket(180, -1, false),
            bucket(240, -1, false),
            bucket(360, 3_000_000, true),
        ]
        .into_iter()
        .collect();

        let svg = render_chart(1280, 720, 200, 60, &request(0, 360), &buckets);

        assert_eq!(svg.matches("class=\"up\"").count(), 2, "two up runs expected");
        assert_eq!(svg.matches("class=\"down\"").count(), 1);
        assert_eq!(svg.matches("class=\"na\"").count(), 1);
        assert_eq!(svg.matches("class=\"i\"").count(), 3, "one rtt bar per up bucket");
    }

    #[test]
    fn test_stat_footer_reports_percentages() {
        let buckets: HashMap<i64, CheckData> = [
            bucket(60, 1_000_000, true),
            bucket(120, -1, false),
        ]
        .into_iter()
        .collect();

        // Four buckets total: one up, one down, two missing.
        let svg = render_chart(1280, 720, 200, 60, &request(0, 240), &buckets);
        assert!(svg.contains("Host: h.example Up 25.00% Down 25.00% Unknown 50.00%"));
    }

    #[test]
    fn test_rtt_bar_is_clamped_to_scale() {
        // 10s rtt against a 200ms scale must not overflow the band.
        let buckets: HashMap<i64, CheckData> =
            [bucket(60, 10_000_000_000, true)].into_iter().collect();

        let svg = render_chart(1280, 720, 200, 60, &request(0, 120), &buckets);
        let band_height = 720 - 2 * (12 * 3);
        assert!(svg.contains(&format!("height=\"{band_height}\" class=\"i\"")));
    }
}
