//! ASCII attention heatmaps for terminal previews
//!
//! References:
//! - Bahdanau et al. (2014): Attention visualization

use std::fmt::Write;

use crate::model::AttentionMatrix;

/// Heatmap characters, low to high intensity
const HEATMAP_CHARS: [char; 10] = [' ', '·', ':', '∴', '▪', '▫', '■', '□', '▣', '█'];

/// Widest row label before truncation
const MAX_LABEL_CHARS: usize = 8;

/// Render attention weights as an ASCII heatmap, one line per output token
///
/// Columns average `ceil(cols / width)` input frames each.
#[allow(clippy::no_effect_underscore_binding)]
pub fn render_attention_heatmap(weights: &AttentionMatrix, labels: &[&str], width: usize) -> String {
    let _span = crate::trace_enter!("render.ascii_heatmap");
    if weights.is_empty() || width == 0 {
        return String::new();
    }

    let n_frames = weights.cols();
    let scale = match weights.max() {
        m if m > 0.0 => m,
        _ => 1.0,
    };
    let frames_per_col = n_frames.div_ceil(width).max(1);
    let n_cols = n_frames.div_ceil(frames_per_col);
    let label_width = labels
        .iter()
        .map(|l| l.chars().count().min(MAX_LABEL_CHARS))
        .max()
        .unwrap_or(0)
        .max(3);

    let mut output = String::new();

    // Column header: first frame of every tenth column
    let _ = write!(output, "{:>label_width$} ", "");
    for col in (0..n_cols).step_by(10) {
        let _ = write!(output, "{:<10}", col * frames_per_col);
    }
    output.push('\n');
    let _ = write!(output, "{:>label_width$} ", "");
    output.push_str(&"─".repeat(n_cols));
    output.push('\n');

    for row in 0..weights.rows() {
        let label: String = labels
            .get(row)
            .map_or_else(|| row.to_string(), |l| l.chars().take(MAX_LABEL_CHARS).collect());
        let _ = write!(output, "{label:>label_width$}│");

        let values = weights.row(row);
        for chunk in values.chunks(frames_per_col) {
            let avg = chunk.iter().sum::<f32>() / chunk.len() as f32;
            let normalized = (avg / scale).clamp(0.0, 1.0);
            let char_idx = (normalized * (HEATMAP_CHARS.len() - 1) as f32) as usize;
            output.push(HEATMAP_CHARS[char_idx.min(HEATMAP_CHARS.len() - 1)]);
        }
        output.push('\n');
    }

    output
}
