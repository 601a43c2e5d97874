use crate::dataset::MetadataColumn;
use itertools::Itertools;

/// Point color when no metadata field is applied.
pub const UNCOLORED: &str = "#7f7f7f";

/// Qualitative palette for categorical fields, cycled when a field has more
/// categories than entries.
const CATEGORICAL_PALETTE: [&str; 12] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf", "#aec7e8", "#ffbb78",
];

/// Viridis anchors, evenly spaced over [0, 1].
const VIRIDIS: [(u8, u8, u8); 5] = [
    (0x44, 0x01, 0x54),
    (0x3b, 0x52, 0x8b),
    (0x21, 0x91, 0x8c),
    (0x5e, 0xc9, 0x62),
    (0xfd, 0xe7, 0x25),
];

#[derive(Clone, Debug, PartialEq)]
pub enum LegendInfo {
    None,
    /// (category label, fill color) in first-appearance order.
    Categories(Vec<(String, String)>),
    Range {
        min: f64,
        max: f64,
    },
}

/// Per-cell fill colors plus whatever legend the scale calls for.
#[derive(Clone, Debug)]
pub struct CellColors {
    pub fills: Vec<String>,
    pub legend: LegendInfo,
}

/// Maps a metadata column (or its absence) onto per-cell colors. Categorical
/// columns get the qualitative palette keyed by first appearance; numeric
/// columns get the viridis ramp over their min..max span.
pub fn colors_for(column: Option<&MetadataColumn>, n_cells: usize) -> CellColors {
    match column {
        None => CellColors {
            fills: vec![UNCOLORED.to_string(); n_cells],
            legend: LegendInfo::None,
        },
        Some(MetadataColumn::Categorical(values)) => {
            let categories: Vec<&String> = values.iter().unique().collect();
            let fills = values
                .iter()
                .map(|v| {
                    let idx = categories.iter().position(|c| *c == v).unwrap_or(0);
                    categorical_color(idx).to_string()
                })
                .collect();
            let legend = categories
                .iter()
                .enumerate()
                .map(|(idx, c)| ((*c).to_owned(), categorical_color(idx).to_string()))
                .collect();
            CellColors {
                fills,
                legend: LegendInfo::Categories(legend),
            }
        }
        Some(MetadataColumn::Numeric(values)) => {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let span = max - min;
            let fills = values
                .iter()
                .map(|&v| {
                    let t = if span > 0.0 { (v - min) / span } else { 0.5 };
                    viridis(t)
                })
                .collect();
            CellColors {
                fills,
                legend: LegendInfo::Range { min, max },
            }
        }
    }
}

#[inline(always)]
pub fn categorical_color(index: usize) -> &'static str {
    CATEGORICAL_PALETTE[index % CATEGORICAL_PALETTE.len()]
}

/// Linear interpolation along the viridis anchors; `t` is clamped to [0, 1].
pub fn viridis(t: f64) -> String {
    let t = t.clamp(0.0, 1.0);
    let scaled = t * (VIRIDIS.len() - 1) as f64;
    let lo = (scaled.floor() as usize).min(VIRIDIS.len() - 2);
    let frac = scaled - lo as f64;
    let (r0, g0, b0) = VIRIDIS[lo];
    let (r1, g1, b1) = VIRIDIS[lo + 1];
    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
    format!("#{:02x}{:02x}{:02x}", lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
}
