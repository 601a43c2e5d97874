use crate::dataset::Dataset;
use crate::error::ViewerError;
use crate::palette::{self, LegendInfo};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{info, warn};
use svg::node::element::{Circle, Rectangle, Text};
use svg::Document;

const W: f32 = 1000.0;
const H: f32 = 800.0;
const MARGIN: f32 = 60.0;
const POINT_RADIUS: f32 = 3.0;
const LEGEND_X: f32 = W - 190.0;
const LEGEND_Y: f32 = 70.0;
const LEGEND_ROW_HEIGHT: f32 = 18.0;
const LEGEND_SWATCH: f32 = 12.0;
const MAX_LEGEND_ROWS: usize = 20;
const RAMP_WIDTH: f32 = 120.0;
const RAMP_STEPS: usize = 24;

/// Encoded raster artifact handed to the UI layer. Produced fresh on every
/// render request; never cached.
#[derive(Clone, Debug)]
pub struct RenderedPlot {
    bytes: Vec<u8>,
    mime: &'static str,
}

impl RenderedPlot {
    #[inline(always)]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline(always)]
    pub fn mime(&self) -> &'static str {
        self.mime
    }

    /// Inline-embeddable transport form.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}

/// Renders the dataset's 2-D embedding as a colored scatter PNG.
///
/// `color_field` may be `None` or name a metadata column; an unrecognized
/// name renders uncolored rather than failing, because the field list and
/// the dataset can be updated by independent UI actions. The embedding must
/// already be present; computing it is the caller's job.
pub fn render_scatter(
    dataset: &Dataset,
    color_field: Option<&str>,
) -> Result<RenderedPlot, ViewerError> {
    let scene = scatter_scene(dataset, color_field)?;
    let bytes = rasterize(&scene.to_string())?;
    info!(
        "Rendered {}x{} scatter ({} cells, color field {:?}, {} bytes)",
        W as u32,
        H as u32,
        dataset.n_cells(),
        color_field,
        bytes.len()
    );
    Ok(RenderedPlot {
        bytes,
        mime: "image/png",
    })
}

/// Builds the SVG scene: background, one circle per cell, title, axis
/// labels, and a legend matched to the color scale.
pub fn scatter_scene(
    dataset: &Dataset,
    color_field: Option<&str>,
) -> Result<Document, ViewerError> {
    let coords = dataset.embedding().ok_or(ViewerError::MissingEmbedding)?;

    let column = color_field.and_then(|name| dataset.column(name));
    if let Some(name) = color_field {
        if column.is_none() {
            warn!("Unknown color field '{name}'; rendering uncolored");
        }
    }
    let colors = palette::colors_for(column, coords.len());

    let mut doc = Document::new()
        .set("viewBox", (0, 0, W, H))
        .set("width", W)
        .set("height", H)
        .add(
            Rectangle::new()
                .set("x", 0)
                .set("y", 0)
                .set("width", W)
                .set("height", H)
                .set("fill", "#ffffff"),
        );

    let title = match (color_field, column.is_some()) {
        (Some(name), true) => format!("UMAP colored by {name}"),
        _ => "UMAP".to_string(),
    };
    doc = doc.add(
        Text::new(title)
            .set("x", W / 2.0)
            .set("y", 32)
            .set("text-anchor", "middle")
            .set("font-family", "sans-serif")
            .set("font-size", 20)
            .set("fill", "#111111"),
    );

    let (to_px_x, to_px_y) = scale_to_canvas(coords);
    for (i, &[x, y]) in coords.iter().enumerate() {
        doc = doc.add(
            Circle::new()
                .set("cx", to_px_x(x))
                .set("cy", to_px_y(y))
                .set("r", POINT_RADIUS)
                .set("fill", colors.fills[i].as_str())
                .set("fill-opacity", 0.85),
        );
    }

    doc = doc
        .add(
            Text::new("UMAP1")
                .set("x", W / 2.0)
                .set("y", H - 18.0)
                .set("text-anchor", "middle")
                .set("font-family", "monospace")
                .set("font-size", 12)
                .set("fill", "#444444"),
        )
        .add(
            Text::new("UMAP2")
                .set("x", 18.0)
                .set("y", H / 2.0)
                .set("text-anchor", "middle")
                .set("font-family", "monospace")
                .set("font-size", 12)
                .set("fill", "#444444"),
        );

    doc = add_legend(doc, &colors.legend);
    Ok(doc)
}

/// Maps embedding space onto the drawing area, y flipped for SVG. A zero
/// span (single point, or all points identical) collapses to the center.
fn scale_to_canvas(coords: &[[f64; 2]]) -> (impl Fn(f64) -> f32, impl Fn(f64) -> f32) {
    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for &[x, y] in coords {
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }
    let span_x = if max_x > min_x { max_x - min_x } else { 1.0 };
    let span_y = if max_y > min_y { max_y - min_y } else { 1.0 };
    if coords.is_empty() {
        min_x = -0.5;
        min_y = -0.5;
    }
    let to_px_x = move |x: f64| (MARGIN as f64 + (x - min_x) / span_x * (W - 2.0 * MARGIN) as f64) as f32;
    let to_px_y =
        move |y: f64| (H as f64 - MARGIN as f64 - (y - min_y) / span_y * (H - 2.0 * MARGIN) as f64) as f32;
    (to_px_x, to_px_y)
}

fn add_legend(mut doc: Document, legend: &LegendInfo) -> Document {
    match legend {
        LegendInfo::None => doc,
        LegendInfo::Categories(entries) => {
            let shown = entries.len().min(MAX_LEGEND_ROWS);
            for (row, (label, color)) in entries.iter().take(shown).enumerate() {
                let y = LEGEND_Y + row as f32 * LEGEND_ROW_HEIGHT;
                doc = doc
                    .add(
                        Rectangle::new()
                            .set("x", LEGEND_X)
                            .set("y", y)
                            .set("width", LEGEND_SWATCH)
                            .set("height", LEGEND_SWATCH)
                            .set("fill", color.as_str()),
                    )
                    .add(
                        Text::new(label.clone())
                            .set("x", LEGEND_X + LEGEND_SWATCH + 6.0)
                            .set("y", y + LEGEND_SWATCH - 2.0)
                            .set("font-family", "monospace")
                            .set("font-size", 11)
                            .set("fill", "#111111"),
                    );
            }
            if entries.len() > shown {
                doc = doc.add(
                    Text::new(format!("+{} more", entries.len() - shown))
                        .set("x", LEGEND_X)
                        .set("y", LEGEND_Y + shown as f32 * LEGEND_ROW_HEIGHT + 12.0)
                        .set("font-family", "monospace")
                        .set("font-size", 11)
                        .set("fill", "#666666"),
                );
            }
            doc
        }
        LegendInfo::Range { min, max } => {
            let step_w = RAMP_WIDTH / RAMP_STEPS as f32;
            for step in 0..RAMP_STEPS {
                let t = step as f64 / (RAMP_STEPS - 1) as f64;
                doc = doc.add(
                    Rectangle::new()
                        .set("x", LEGEND_X + step as f32 * step_w)
                        .set("y", LEGEND_Y)
                        .set("width", step_w + 0.5)
                        .set("height", LEGEND_SWATCH)
                        .set("fill", palette::viridis(t)),
                );
            }
            doc.add(
                Text::new(format!("{min:.3} .. {max:.3}"))
                    .set("x", LEGEND_X)
                    .set("y", LEGEND_Y + LEGEND_SWATCH + 14.0)
                    .set("font-family", "monospace")
                    .set("font-size", 11)
                    .set("fill", "#111111"),
            )
        }
    }
}

fn rasterize(svg_text: &str) -> Result<Vec<u8>, ViewerError> {
    let mut options = resvg::usvg::Options::default();
    options.fontdb_mut().load_system_fonts();
    let tree = resvg::usvg::Tree::from_str(svg_text, &options)
        .map_err(|e| ViewerError::Render(format!("cannot parse scene: {e}")))?;
    let mut pixmap = resvg::tiny_skia::Pixmap::new(W as u32, H as u32)
        .ok_or_else(|| ViewerError::Render("cannot allocate pixel buffer".to_string()))?;
    resvg::render(
        &tree,
        resvg::tiny_skia::Transform::default(),
        &mut pixmap.as_mut(),
    );
    let rgba = image::RgbaImage::from_raw(W as u32, H as u32, pixmap.take())
        .ok_or_else(|| ViewerError::Render("pixel buffer size mismatch".to_string()))?;
    let mut bytes = Vec::new();
    rgba.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| ViewerError::Render(format!("PNG encoding failed: {e}")))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MetadataColumn;
    use crate::palette::UNCOLORED;
    use ndarray::arr2;

    fn dataset_abc() -> Dataset {
        Dataset::from_parts(
            arr2(&[[0.0], [0.1], [5.0]]),
            vec![(
                "group".to_string(),
                MetadataColumn::Categorical(vec![
                    "a".to_string(),
                    "a".to_string(),
                    "b".to_string(),
                ]),
            )],
            Some(vec![[0.0, 0.0], [1.0, 0.5], [4.0, 4.0]]),
        )
        .unwrap()
    }

    fn circle_fills(doc: &Document) -> Vec<String> {
        doc.to_string()
            .split("<circle")
            .skip(1)
            .map(|chunk| {
                let start = chunk.find("fill=\"").unwrap() + 6;
                let end = chunk[start..].find('"').unwrap() + start;
                chunk[start..end].to_string()
            })
            .collect()
    }

    #[test]
    fn test_categorical_coloring_partitions_cells() {
        let scene = scatter_scene(&dataset_abc(), Some("group")).unwrap();
        let fills = circle_fills(&scene);
        assert_eq!(fills.len(), 3);
        assert_eq!(fills[0], fills[1]);
        assert_ne!(fills[0], fills[2]);
    }

    #[test]
    fn test_unknown_field_falls_back_to_uncolored() {
        let scene = scatter_scene(&dataset_abc(), Some("nonexistent_field")).unwrap();
        let fills = circle_fills(&scene);
        assert!(fills.iter().all(|f| f == UNCOLORED));
    }

    #[test]
    fn test_no_field_renders_uncolored() {
        let scene = scatter_scene(&dataset_abc(), None).unwrap();
        assert!(circle_fills(&scene).iter().all(|f| f == UNCOLORED));
    }

    #[test]
    fn test_numeric_field_uses_continuous_ramp() {
        let dataset = Dataset::from_parts(
            arr2(&[[0.0], [1.0], [2.0]]),
            vec![(
                "score".to_string(),
                MetadataColumn::Numeric(vec![0.0, 1.0, 2.0]),
            )],
            Some(vec![[0.0, 0.0], [1.0, 1.0], [2.0, 0.0]]),
        )
        .unwrap();
        let scene = scatter_scene(&dataset, Some("score")).unwrap();
        let fills = circle_fills(&scene);
        assert_eq!(fills[0], "#440154");
        assert_eq!(fills[2], "#fde725");
        // Gradient-bar legend rather than category swatches.
        assert!(scene.to_string().contains("0.000 .. 2.000"));
    }

    #[test]
    fn test_missing_embedding_is_a_contract_violation() {
        let dataset = Dataset::from_parts(arr2(&[[1.0]]), vec![], None).unwrap();
        let err = scatter_scene(&dataset, None).unwrap_err();
        assert!(matches!(err, ViewerError::MissingEmbedding), "{err}");
    }

    #[test]
    fn test_empty_dataset_still_renders_a_scene() {
        let dataset =
            Dataset::from_parts(ndarray::Array2::zeros((0, 0)), vec![], Some(vec![])).unwrap();
        let scene = scatter_scene(&dataset, None).unwrap();
        assert!(circle_fills(&scene).is_empty());
    }

    #[test]
    fn test_render_produces_png_artifact() {
        let plot = render_scatter(&dataset_abc(), Some("group")).unwrap();
        assert_eq!(plot.mime(), "image/png");
        assert_eq!(&plot.bytes()[..8], &b"\x89PNG\r\n\x1a\n"[..]);
        assert!(plot.data_uri().starts_with("data:image/png;base64,"));
    }
}
