//! Attention visualization driver
//!
//! Runs one pass over the test partition: decode each batch, turn every
//! prediction into plot labels, trim the attention matrix to the real token
//! and frame counts, and write one PNG per utterance under
//! `<output_dir>/<speaker>/<utterance>.png`.
//!
//! # Per-utterance steps
//!
//! ```text
//! labels ─► VocabularyMap::decode ─► truncate at '>' ─► split on '_'
//!                                                        │ n tokens
//! attention (steps × padded frames) ─► slice(n, input_length) ─► PNG
//! ```
//!
//! An utterance whose truncated prediction is empty (or whose input has no
//! frames) has nothing to plot; it is skipped and counted in the summary.

use std::fs;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};

use crate::config::ResolvedConfig;
use crate::dataset::{Batch, Dataset, DatasetOptions};
use crate::error::{VizError, VizResult};
use crate::model::{
    load_model, AttentionMatrix, AttentionModel, DecodeOptions, DecodeResult, ModelRegistry,
};
use crate::render::{render_attention_heatmap, AttentionPlot, FigureSize};
use crate::tokenizer::{split_tokens, truncate_prediction, VocabularyMap};

/// Separator between speaker id and the rest of an utterance name
pub const SPEAKER_SEPARATOR: char = '_';

/// Width of `--preview` ASCII heatmaps
const PREVIEW_WIDTH: usize = 80;

/// Counts from one visualization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisualizationSummary {
    /// Batches consumed
    pub batches: usize,
    /// Utterances decoded
    pub utterances: usize,
    /// Images written
    pub rendered: usize,
    /// Utterances with nothing to plot
    pub skipped: usize,
}

/// Speaker id: the utterance name up to its first `_`
#[must_use]
pub fn speaker_id(utterance_name: &str) -> &str {
    utterance_name
        .split_once(SPEAKER_SEPARATOR)
        .map_or(utterance_name, |(speaker, _)| speaker)
}

/// Delete `dir` with everything in it, then recreate it empty
///
/// # Errors
///
/// Returns [`VizError::Io`] if removal or creation fails.
pub fn reset_output_dir(dir: &Path) -> VizResult<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

/// `<output_dir>/<speaker>/<utterance>.png`
#[must_use]
pub fn image_path(output_dir: &Path, utterance_name: &str) -> PathBuf {
    output_dir
        .join(speaker_id(utterance_name))
        .join(format!("{utterance_name}.png"))
}

/// A prediction ready to be drawn
#[derive(Debug, Clone, PartialEq)]
pub struct UtterancePlot {
    /// Utterance name
    pub name: String,
    /// Truncated predicted text
    pub text: String,
    /// One label per attention row
    pub tokens: Vec<String>,
    /// `(tokens × input_length)` weights
    pub attention: AttentionMatrix,
}

impl UtterancePlot {
    /// Turn a decode result into plot data
    ///
    /// Returns `Ok(None)` when there is nothing to draw: an empty truncated
    /// prediction or a zero-length input.
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Vocabulary`] for undecodable labels and
    /// [`VizError::Shape`] if the attention matrix is smaller than the slice.
    pub fn prepare(
        name: &str,
        result: &DecodeResult,
        input_length: usize,
        vocab: &VocabularyMap,
    ) -> VizResult<Option<Self>> {
        let decoded = vocab.decode(&result.labels)?;
        let text = truncate_prediction(&decoded);
        let tokens = split_tokens(text);
        if tokens.is_empty() || input_length == 0 {
            return Ok(None);
        }

        let attention = result.attention.slice(tokens.len(), input_length)?;
        Ok(Some(Self {
            name: name.to_string(),
            text: text.to_string(),
            tokens: tokens.into_iter().map(str::to_string).collect(),
            attention,
        }))
    }
}

/// Drives decoding and rendering over a dataset
pub struct Visualizer<'a> {
    model: &'a dyn AttentionModel,
    vocab: &'a VocabularyMap,
    options: DecodeOptions,
    output_dir: PathBuf,
    figure: FigureSize,
    batch_size: Option<usize>,
    preview: bool,
    progress: bool,
}

impl std::fmt::Debug for Visualizer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visualizer")
            .field("model_type", &self.model.model_type())
            .field("options", &self.options)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl<'a> Visualizer<'a> {
    /// Visualizer writing under `output_dir`
    #[must_use]
    pub fn new(
        model: &'a dyn AttentionModel,
        vocab: &'a VocabularyMap,
        options: DecodeOptions,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            model,
            vocab,
            options,
            output_dir: output_dir.into(),
            figure: FigureSize::default(),
            batch_size: None,
            preview: false,
            progress: false,
        }
    }

    /// Decode with this many utterances per batch instead of the dataset's own setting
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Log an ASCII preview of each plot at debug level
    #[must_use]
    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    /// Show a progress bar over batches
    #[must_use]
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Override the image size
    #[must_use]
    pub fn with_figure_size(mut self, figure: FigureSize) -> Self {
        self.figure = figure;
        self
    }

    /// Reset the output directory, then make one pass over `dataset` from its start
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Config`] for a zero batch size. Any other error stops
    /// the pass; images already written stay on disk.
    pub fn run(&self, dataset: &mut Dataset) -> VizResult<VisualizationSummary> {
        if let Some(batch_size) = self.batch_size {
            dataset.set_batch_size(batch_size)?;
        }
        dataset.reset();

        reset_output_dir(&self.output_dir)?;
        tracing::info!(
            output_dir = %self.output_dir.display(),
            utterances = dataset.len(),
            greedy = self.options.is_greedy(),
            beam_width = self.options.beam_width,
            "visualizing attention weights"
        );

        let bar = self.progress_bar(dataset.batches_per_epoch());
        let mut summary = VisualizationSummary::default();

        for item in dataset.by_ref() {
            let (batch, is_new_epoch) = item?;
            self.visualize_batch(&batch, &mut summary)?;
            summary.batches += 1;
            bar.inc(1);
            if is_new_epoch {
                break;
            }
        }

        bar.finish_and_clear();
        tracing::info!(
            batches = summary.batches,
            rendered = summary.rendered,
            skipped = summary.skipped,
            "visualization finished"
        );
        Ok(summary)
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
        bar.set_style(style);
        bar
    }

    fn visualize_batch(&self, batch: &Batch, summary: &mut VisualizationSummary) -> VizResult<()> {
        let results = {
            let _guard = crate::trace_enter!("decode.batch", size = batch.len());
            self.model.attention_weights(batch, &self.options)?
        };
        if results.len() != batch.len() {
            return Err(VizError::Shape(format!(
                "model returned {} results for a batch of {}",
                results.len(),
                batch.len()
            )));
        }

        for ((name, &input_length), result) in
            batch.names.iter().zip(&batch.input_lengths).zip(&results)
        {
            summary.utterances += 1;
            let Some(plot) = UtterancePlot::prepare(name, result, input_length, self.vocab)?
            else {
                tracing::warn!(utterance = %name, "empty prediction, nothing to plot");
                summary.skipped += 1;
                continue;
            };
            self.write_plot(&plot)?;
            summary.rendered += 1;
        }
        Ok(())
    }

    fn write_plot(&self, plot: &UtterancePlot) -> VizResult<()> {
        let path = image_path(&self.output_dir, &plot.name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let labels: Vec<&str> = plot.tokens.iter().map(String::as_str).collect();
        AttentionPlot::new(&plot.attention, &labels)?
            .with_size(self.figure)
            .save(&path)?;

        crate::trace_event!(
            utterance = %plot.name,
            text = %plot.text,
            rows = plot.attention.rows(),
            cols = plot.attention.cols(),
            "wrote {}",
            path.display()
        );
        if self.preview {
            tracing::debug!(
                "{}\n{}",
                plot.name,
                render_attention_heatmap(&plot.attention, &labels, PREVIEW_WIDTH)
            );
        }
        Ok(())
    }
}

/// Full run: model, vocabulary, dataset, then the visualization pass
///
/// # Errors
///
/// Propagates the first configuration, vocabulary, dataset, restore, shape,
/// render or I/O error.
pub fn run_pipeline(
    config: &ResolvedConfig,
    registry: &ModelRegistry,
    progress: bool,
) -> VizResult<VisualizationSummary> {
    let span = crate::trace_span!("pipeline", model_type = config.model_type.as_str());
    let _entered = span.enter();

    let loaded = load_model(config, registry)?;

    let vocab_path = config.vocab_file_path();
    let vocab = VocabularyMap::load(&vocab_path, config.label_kind)?;
    if vocab.num_tokens() != config.num_classes {
        tracing::warn!(
            file = %vocab_path.display(),
            tokens = vocab.num_tokens(),
            num_classes = config.num_classes,
            "vocabulary file size differs from vocab_num.yml"
        );
    }

    let mut dataset = Dataset::open(
        &config.run.dataset_dir,
        config.save_format,
        &config.params.data_size,
        config.run.data_type,
        DatasetOptions {
            splice: config.params.splice,
            num_stack: config.params.num_stack,
            num_skip: config.params.num_skip,
            ..DatasetOptions::default()
        },
    )?;

    let options = DecodeOptions {
        beam_width: config.run.beam_width,
        max_decode_length: config.run.max_decode_length,
    };
    Visualizer::new(loaded.model.as_ref(), &vocab, options, config.output_dir())
        .with_batch_size(config.run.eval_batch_size)
        .with_preview(config.run.preview)
        .with_progress(progress)
        .run(&mut dataset)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::dataset::{FrameMatrix, IndexEntry, InMemoryFeatures};
    use crate::model::{ExecutionDevice, ModelType, StateDict};
    use crate::tokenizer::LabelKind;

    /// Returns canned labels per utterance name with full-size uniform attention
    struct ScriptedModel {
        labels: Vec<(String, Vec<i64>)>,
        steps: usize,
        seen: RefCell<Vec<DecodeOptions>>,
    }

    impl AttentionModel for ScriptedModel {
        fn model_type(&self) -> ModelType {
            ModelType::Attention
        }

        fn set_device(&mut self, _device: &ExecutionDevice) -> VizResult<()> {
            Ok(())
        }

        fn load_state_dict(&mut self, _state: &StateDict) -> VizResult<()> {
            Ok(())
        }

        fn eval(&mut self) {}

        fn is_training(&self) -> bool {
            false
        }

        fn attention_weights(
            &self,
            batch: &Batch,
            options: &DecodeOptions,
        ) -> VizResult<Vec<DecodeResult>> {
            self.seen.borrow_mut().push(*options);
            batch
                .names
                .iter()
                .map(|name| {
                    let labels = self
                        .labels
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, l)| l.clone())
                        .unwrap_or_default();
                    let cols = batch.max_frames;
                    let attention = AttentionMatrix::new(
                        vec![1.0 / cols.max(1) as f32; self.steps * cols],
                        self.steps,
                        cols,
                    )?;
                    Ok(DecodeResult { labels, attention })
                })
                .collect()
        }
    }

    /// Vocabulary: 0 '_', 1 'a', 2 'c', 3 't'; SOS 4, EOS 5
    fn vocab() -> VocabularyMap {
        VocabularyMap::from_text("_\na\nc\nt\n", LabelKind::Character).expect("vocab")
    }

    fn dataset(utterances: &[(&str, usize)], batch_size: usize) -> Dataset {
        let mut source = InMemoryFeatures::new();
        let entries = utterances
            .iter()
            .map(|&(name, frames)| {
                source.insert(name, FrameMatrix::new(vec![0.5; frames * 3], frames, 3).expect("m"));
                IndexEntry {
                    name: name.to_string(),
                    frame_num: frames,
                    input_path: PathBuf::from(format!("{name}.npy")),
                    labels: Vec::new(),
                }
            })
            .collect();
        Dataset::new(
            entries,
            DatasetOptions {
                batch_size,
                ..DatasetOptions::default()
            },
            Box::new(source),
        )
        .expect("dataset")
    }

    fn decode_result(labels: Vec<i64>, rows: usize, cols: usize) -> DecodeResult {
        DecodeResult {
            labels,
            attention: AttentionMatrix::new(vec![0.25; rows * cols], rows, cols).expect("m"),
        }
    }

    #[test]
    fn test_speaker_id() {
        assert_eq!(speaker_id("spk007_utt3"), "spk007");
        assert_eq!(speaker_id("1089_134686_0000"), "1089");
        assert_eq!(speaker_id("nospeaker"), "nospeaker");
        assert_eq!(speaker_id("_lead"), "");
    }

    #[test]
    fn test_image_path() {
        assert_eq!(
            image_path(Path::new("/out"), "spk007_utt3"),
            PathBuf::from("/out/spk007/spk007_utt3.png")
        );
    }

    #[test]
    fn test_reset_output_dir_removes_stale_content() {
        let root = tempfile::tempdir().expect("tempdir");
        let out = root.path().join("attention_weights");
        fs::create_dir_all(out.join("old_speaker")).expect("mkdir");
        fs::write(out.join("old_speaker").join("stale.png"), b"x").expect("write");

        reset_output_dir(&out).expect("reset");
        assert!(out.is_dir());
        assert_eq!(fs::read_dir(&out).expect("list").count(), 0);

        let fresh = root.path().join("fresh");
        reset_output_dir(&fresh).expect("create");
        assert!(fresh.is_dir());
    }

    #[test]
    fn test_prepare_slices_to_tokens_and_length() {
        // c _ a _ t > <pad>  ->  "c_a_t" -> 3 tokens
        let result = decode_result(vec![2, 0, 1, 0, 3, 5, -1], 10, 50);
        let plot = UtterancePlot::prepare("spk1_utt1", &result, 42, &vocab())
            .expect("prepare")
            .expect("non-empty");
        assert_eq!(plot.text, "c_a_t");
        assert_eq!(plot.tokens, vec!["c", "a", "t"]);
        assert_eq!((plot.attention.rows(), plot.attention.cols()), (3, 42));
    }

    #[test]
    fn test_prepare_strips_trailing_space() {
        let result = decode_result(vec![2, 1, 3, 0, 5], 5, 8);
        let plot = UtterancePlot::prepare("u", &result, 8, &vocab())
            .expect("prepare")
            .expect("non-empty");
        assert_eq!(plot.text, "cat");
        assert_eq!(plot.attention.rows(), 1);
    }

    #[test]
    fn test_prepare_empty_prediction_is_skipped() {
        let result = decode_result(vec![5, 2, 1], 3, 8);
        assert!(UtterancePlot::prepare("u", &result, 8, &vocab())
            .expect("prepare")
            .is_none());
        let result = decode_result(vec![2, 5], 3, 8);
        assert!(UtterancePlot::prepare("u", &result, 0, &vocab())
            .expect("prepare")
            .is_none());
    }

    #[test]
    fn test_prepare_shape_error() {
        // 3 tokens but only 2 decode steps of attention
        let result = decode_result(vec![2, 0, 1, 0, 3, 5], 2, 50);
        let err = UtterancePlot::prepare("u", &result, 10, &vocab()).expect_err("too few rows");
        assert!(matches!(err, VizError::Shape(_)));

        let result = decode_result(vec![2, 5], 4, 5);
        let err = UtterancePlot::prepare("u", &result, 6, &vocab()).expect_err("too few cols");
        assert!(matches!(err, VizError::Shape(_)));
    }

    #[test]
    fn test_run_single_pass_writes_one_image_per_utterance() {
        let root = tempfile::tempdir().expect("tempdir");
        let out = root.path().join("attention_weights");
        fs::create_dir_all(out.join("ghost")).expect("mkdir");

        let model = ScriptedModel {
            labels: vec![
                ("spk1_a".into(), vec![2, 0, 1, 0, 3, 5]),
                ("spk1_b".into(), vec![2, 1, 3, 5]),
                ("spk2_c".into(), vec![5]),
            ],
            steps: 8,
            seen: RefCell::new(Vec::new()),
        };
        let vocab = vocab();
        let mut ds = dataset(&[("spk1_a", 12), ("spk1_b", 9), ("spk2_c", 4)], 2);
        let options = DecodeOptions {
            beam_width: 3,
            max_decode_length: 100,
        };

        let summary = Visualizer::new(&model, &vocab, options, &out)
            .with_figure_size(FigureSize {
                width: 400,
                height: 200,
            })
            .run(&mut ds)
            .expect("run");

        assert_eq!(
            summary,
            VisualizationSummary {
                batches: 2,
                utterances: 3,
                rendered: 2,
                skipped: 1,
            }
        );
        assert!(!out.join("ghost").exists());
        assert!(out.join("spk1").join("spk1_a.png").is_file());
        assert!(out.join("spk1").join("spk1_b.png").is_file());
        assert!(!out.join("spk2").exists());
        assert_eq!(model.seen.borrow().as_slice(), &[options, options]);
    }

    #[test]
    fn test_two_utterance_batch_with_padding_after_eos() {
        // 0 '_', 1 'a', 2 'c', 3 't', 4 'p', 5 'd'; EOS 7
        let vocab =
            VocabularyMap::from_text("_\na\nc\nt\np\nd\n", LabelKind::Character).expect("vocab");
        let cat_pad = vec![2, 0, 1, 0, 3, 7, 4, 1, 5];
        assert_eq!(vocab.decode(&cat_pad).expect("decode"), "c_a_t>pad");

        let result = decode_result(cat_pad.clone(), 12, 20);
        let plot = UtterancePlot::prepare("spk1_u1", &result, 20, &vocab)
            .expect("prepare")
            .expect("non-empty");
        assert_eq!(plot.tokens, vec!["c", "a", "t"]);
        assert_eq!((plot.attention.rows(), plot.attention.cols()), (3, 20));

        let model = ScriptedModel {
            labels: vec![
                ("spk1_u1".into(), cat_pad),
                ("spk2_u1".into(), vec![3, 1, 4, 7]),
            ],
            steps: 12,
            seen: RefCell::new(Vec::new()),
        };
        let root = tempfile::tempdir().expect("tempdir");
        let out = root.path().join("attention_weights");
        let mut ds = dataset(&[("spk1_u1", 20), ("spk2_u1", 16)], 2);
        let summary = Visualizer::new(&model, &vocab, DecodeOptions::default(), &out)
            .with_figure_size(FigureSize {
                width: 400,
                height: 200,
            })
            .run(&mut ds)
            .expect("run");

        assert_eq!(summary.batches, 1);
        assert_eq!(summary.rendered, 2);
        assert!(out.join("spk1").join("spk1_u1.png").is_file());
        assert!(out.join("spk2").join("spk2_u1.png").is_file());
        assert_eq!(model.seen.borrow().as_slice(), &[DecodeOptions::default()]);
    }

    #[test]
    fn test_run_applies_batch_size_and_starts_from_the_top() {
        let model = ScriptedModel {
            labels: vec![
                ("spk1_a".into(), vec![2, 5]),
                ("spk1_b".into(), vec![1, 5]),
                ("spk2_c".into(), vec![3, 5]),
            ],
            steps: 2,
            seen: RefCell::new(Vec::new()),
        };
        let vocab = vocab();
        let mut ds = dataset(&[("spk1_a", 6), ("spk1_b", 5), ("spk2_c", 4)], 1);
        // leave the dataset mid-pass
        ds.next().expect("batch").expect("ok");

        let root = tempfile::tempdir().expect("tempdir");
        let out = root.path().join("o");
        let summary = Visualizer::new(&model, &vocab, DecodeOptions::default(), &out)
            .with_batch_size(2)
            .with_figure_size(FigureSize {
                width: 400,
                height: 200,
            })
            .run(&mut ds)
            .expect("run");
        assert_eq!((summary.batches, summary.utterances, summary.rendered), (2, 3, 3));
        assert_eq!(ds.batches_per_epoch(), 2);

        let err = Visualizer::new(&model, &vocab, DecodeOptions::default(), &out)
            .with_batch_size(0)
            .run(&mut ds)
            .expect_err("zero batch size");
        assert!(matches!(err, VizError::Config(_)));
    }

    #[test]
    fn test_run_rejects_result_count_mismatch() {
        struct Silent;
        impl AttentionModel for Silent {
            fn model_type(&self) -> ModelType {
                ModelType::Attention
            }
            fn set_device(&mut self, _device: &ExecutionDevice) -> VizResult<()> {
                Ok(())
            }
            fn load_state_dict(&mut self, _state: &StateDict) -> VizResult<()> {
                Ok(())
            }
            fn eval(&mut self) {}
            fn is_training(&self) -> bool {
                false
            }
            fn attention_weights(
                &self,
                _batch: &Batch,
                _options: &DecodeOptions,
            ) -> VizResult<Vec<DecodeResult>> {
                Ok(Vec::new())
            }
        }

        let root = tempfile::tempdir().expect("tempdir");
        let vocab = vocab();
        let mut ds = dataset(&[("spk1_a", 4)], 1);
        let err = Visualizer::new(&Silent, &vocab, DecodeOptions::default(), root.path().join("o"))
            .run(&mut ds)
            .expect_err("mismatch");
        assert!(matches!(err, VizError::Shape(_)));
    }
}
