//! Attention-weight plots
//!
//! Draws an attention matrix as a heatmap PNG: output tokens down the y axis,
//! input frames along the x axis, and a colorbar on the right.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ OUTPUT LABELS                                 │
//! │   C ███▓▒░                               ▐max │
//! │   A     ░▒▓███▓▒░                        ▐    │
//! │   T              ░▒▓███▓▒                ▐0   │
//! │     0    50    100    150   INPUT FRAMES      │
//! └──────────────────────────────────────────────┘
//! ```

mod ascii;
mod colormap;
mod font;

pub use ascii::render_attention_heatmap;
pub use colormap::viridis;

use std::path::Path;

use image::{Rgb, RgbImage};

use crate::error::{VizError, VizResult};
use crate::model::AttentionMatrix;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([0, 0, 0]);
const TEXT_SCALE: u32 = 2;
const MARGIN: u32 = 16;
const TICK_LEN: u32 = 6;
const COLORBAR_WIDTH: u32 = 20;
const MAX_LABEL_CHARS: usize = 16;
const MAX_X_TICKS: usize = 10;

/// Canvas size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FigureSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl FigureSize {
    /// Size from inches at a given resolution
    #[must_use]
    pub const fn from_inches(width: u32, height: u32, dpi: u32) -> Self {
        Self {
            width: width * dpi,
            height: height * dpi,
        }
    }
}

impl Default for FigureSize {
    /// 14 × 7 inches at 100 dpi
    fn default() -> Self {
        Self::from_inches(14, 7, 100)
    }
}

/// Pixel rectangle `[x0, x1) × [y0, y1)`
#[derive(Debug, Clone, Copy)]
struct Rect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl Rect {
    const fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    const fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

/// An attention matrix with one label per row
#[derive(Debug, Clone, Copy)]
pub struct AttentionPlot<'a> {
    weights: &'a AttentionMatrix,
    labels: &'a [&'a str],
    size: FigureSize,
}

impl<'a> AttentionPlot<'a> {
    /// Pair weights with row labels
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Shape`] if the label count differs from the row count,
    /// and [`VizError::Render`] if the matrix is empty.
    pub fn new(weights: &'a AttentionMatrix, labels: &'a [&'a str]) -> VizResult<Self> {
        if labels.len() != weights.rows() {
            return Err(VizError::Shape(format!(
                "{} labels for {} attention rows",
                labels.len(),
                weights.rows()
            )));
        }
        if weights.is_empty() {
            return Err(VizError::Render("cannot plot an empty attention matrix".into()));
        }
        Ok(Self {
            weights,
            labels,
            size: FigureSize::default(),
        })
    }

    /// Override the canvas size
    #[must_use]
    pub fn with_size(mut self, size: FigureSize) -> Self {
        self.size = size;
        self
    }

    /// Draw the plot
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Render`] if the canvas is too small for the axes.
    pub fn render(&self) -> VizResult<RgbImage> {
        let _guard = crate::trace_enter!(
            "render.png",
            rows = self.weights.rows(),
            cols = self.weights.cols()
        );
        let mut img = RgbImage::from_pixel(self.size.width, self.size.height, BACKGROUND);
        let area = self.plot_area()?;

        self.draw_heatmap(&mut img, area);
        self.draw_y_labels(&mut img, area);
        self.draw_x_ticks(&mut img, area);
        self.draw_colorbar(&mut img, area);
        draw_frame(&mut img, area);
        font::draw_text(
            &mut img,
            i64::from(MARGIN),
            i64::from(MARGIN / 2),
            "OUTPUT LABELS",
            TEXT_SCALE,
            INK,
        );

        Ok(img)
    }

    /// Draw the plot and write it as PNG
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Render`] if drawing or encoding fails.
    pub fn save(&self, path: &Path) -> VizResult<()> {
        let img = self.render()?;
        img.save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| VizError::Render(format!("cannot write {}: {e}", path.display())))
    }

    fn char_height() -> u32 {
        font::GLYPH_HEIGHT * TEXT_SCALE
    }

    fn plot_area(&self) -> VizResult<Rect> {
        let label_chars = self
            .labels
            .iter()
            .map(|l| l.chars().count().min(MAX_LABEL_CHARS))
            .max()
            .unwrap_or(0)
            .max(1) as u32;
        let label_width = label_chars * font::ADVANCE * TEXT_SCALE;
        let colorbar_text = font::text_width("0.00", TEXT_SCALE);

        let x0 = MARGIN + label_width + TICK_LEN + 4;
        let y0 = MARGIN + Self::char_height() + 8;
        let right = MARGIN + COLORBAR_WIDTH + TICK_LEN + colorbar_text + 16;
        let bottom = MARGIN + TICK_LEN + 2 * Self::char_height() + 12;

        if x0 + right >= self.size.width || y0 + bottom >= self.size.height {
            return Err(VizError::Render(format!(
                "figure {}x{} is too small for the axes",
                self.size.width, self.size.height
            )));
        }
        Ok(Rect {
            x0,
            y0,
            x1: self.size.width - right,
            y1: self.size.height - bottom,
        })
    }

    fn draw_heatmap(&self, img: &mut RgbImage, area: Rect) {
        let (rows, cols) = (self.weights.rows() as u64, self.weights.cols() as u64);
        let scale = match self.weights.max() {
            m if m > 0.0 => m,
            _ => 1.0,
        };
        for py in 0..area.height() {
            let row = (u64::from(py) * rows / u64::from(area.height())) as usize;
            let values = self.weights.row(row);
            for px in 0..area.width() {
                let col = (u64::from(px) * cols / u64::from(area.width())) as usize;
                let color = viridis(values[col] / scale);
                img.put_pixel(area.x0 + px, area.y0 + py, Rgb(color));
            }
        }
    }

    fn draw_y_labels(&self, img: &mut RgbImage, area: Rect) {
        let rows = self.weights.rows() as u32;
        let row_height = area.height() as f32 / rows as f32;
        // Thin labels out when rows are shorter than a line of text
        let stride = ((Self::char_height() + 2) as f32 / row_height).ceil().max(1.0) as usize;

        for (row, label) in self.labels.iter().enumerate().step_by(stride) {
            let center = area.y0 as f32 + (row as f32 + 0.5) * row_height;
            let text: String = label.chars().take(MAX_LABEL_CHARS).collect();
            let width = font::text_width(&text, TEXT_SCALE);
            let x = i64::from(area.x0) - i64::from(TICK_LEN) - 4 - i64::from(width);
            let y = center as i64 - i64::from(Self::char_height() / 2);
            font::draw_text(img, x, y, &text, TEXT_SCALE, INK);
            hline(img, area.x0 - TICK_LEN, area.x0, center as u32);
        }
    }

    fn draw_x_ticks(&self, img: &mut RgbImage, area: Rect) {
        let cols = self.weights.cols();
        let step = tick_step(cols, MAX_X_TICKS);
        let baseline = area.y1 + TICK_LEN + 4;

        for frame in (0..cols).step_by(step) {
            let x = area.x0 + ((frame as f32 + 0.5) * area.width() as f32 / cols as f32) as u32;
            vline(img, x, area.y1, area.y1 + TICK_LEN);
            let text = frame.to_string();
            let half = font::text_width(&text, TEXT_SCALE) / 2;
            font::draw_text(
                img,
                i64::from(x) - i64::from(half),
                i64::from(baseline),
                &text,
                TEXT_SCALE,
                INK,
            );
        }

        let title = "INPUT FRAMES";
        let title_x = i64::from(area.x0 + area.width() / 2)
            - i64::from(font::text_width(title, TEXT_SCALE) / 2);
        font::draw_text(
            img,
            title_x,
            i64::from(baseline + Self::char_height() + 6),
            title,
            TEXT_SCALE,
            INK,
        );
    }

    fn draw_colorbar(&self, img: &mut RgbImage, area: Rect) {
        let bar = Rect {
            x0: area.x1 + 16,
            y0: area.y0,
            x1: area.x1 + 16 + COLORBAR_WIDTH,
            y1: area.y1,
        };
        let span = bar.height().saturating_sub(1).max(1);
        for py in 0..bar.height() {
            let color = viridis(1.0 - py as f32 / span as f32);
            for px in bar.x0..bar.x1 {
                img.put_pixel(px, bar.y0 + py, Rgb(color));
            }
        }
        draw_frame(img, bar);

        let max = self.weights.max();
        for (value, y) in [(max, bar.y0), (0.0, bar.y1 - 1)] {
            hline(img, bar.x1, bar.x1 + TICK_LEN, y);
            font::draw_text(
                img,
                i64::from(bar.x1 + TICK_LEN + 4),
                i64::from(y) - i64::from(Self::char_height() / 2),
                &format!("{value:.2}"),
                TEXT_SCALE,
                INK,
            );
        }
    }
}

/// Smallest 1-2-5 step that keeps at most `max_ticks` ticks over `n` frames
fn tick_step(n: usize, max_ticks: usize) -> usize {
    let mut magnitude = 1;
    loop {
        for factor in [1, 2, 5] {
            let step = factor * magnitude;
            if n.div_ceil(step) <= max_ticks {
                return step;
            }
        }
        magnitude *= 10;
    }
}

fn hline(img: &mut RgbImage, x0: u32, x1: u32, y: u32) {
    if y >= img.height() {
        return;
    }
    for x in x0..x1.min(img.width()) {
        img.put_pixel(x, y, INK);
    }
}

fn vline(img: &mut RgbImage, x: u32, y0: u32, y1: u32) {
    if x >= img.width() {
        return;
    }
    for y in y0..y1.min(img.height()) {
        img.put_pixel(x, y, INK);
    }
}

fn draw_frame(img: &mut RgbImage, r: Rect) {
    hline(img, r.x0.saturating_sub(1), r.x1 + 1, r.y0.saturating_sub(1));
    hline(img, r.x0.saturating_sub(1), r.x1 + 1, r.y1);
    vline(img, r.x0.saturating_sub(1), r.y0.saturating_sub(1), r.y1 + 1);
    vline(img, r.x1, r.y0.saturating_sub(1), r.y1 + 1);
}
