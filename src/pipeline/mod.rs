//! 画像から分類結果までのパイプライン
//!
//! 1リクエストごとに `Idle → Decoding → Resizing → Inferring → Selecting → Done`
//! と遷移し、どの段階で失敗しても `Failed` で終了します。自動リトライはしません。

pub mod preprocess;
pub mod runner;
pub mod selector;

use serde::Serialize;
use std::path::Path;

use crate::error::ClassifyError;
use crate::types::{PredictionResult, IMAGE_SIZE};

pub use preprocess::preprocess;
pub use runner::{run, ScoreModel};
pub use selector::select;

/// パイプラインの段階
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", content = "reason", rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Decoding,
    Resizing,
    Inferring,
    Selecting,
    Done,
    Failed(String),
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed(_))
    }
}

/// 段階遷移を記録し、オブザーバーへ通知する
struct StageTracker<F: FnMut(&PipelineStage)> {
    stage: PipelineStage,
    on_stage: F,
}

impl<F: FnMut(&PipelineStage)> StageTracker<F> {
    fn new(on_stage: F) -> Self {
        Self {
            stage: PipelineStage::Idle,
            on_stage,
        }
    }

    fn enter(&mut self, next: PipelineStage) {
        tracing::debug!(from = ?self.stage, to = ?next, "パイプライン段階遷移");
        self.stage = next;
        (self.on_stage)(&self.stage);
    }
}

/// エンコード済み画像を分類する
///
/// `on_stage` には各段階に入るたびに現在の段階が渡される（最後は `Done` か `Failed`）。
pub fn classify<M, F>(
    model: &M,
    raw: &[u8],
    on_stage: F,
) -> Result<PredictionResult, ClassifyError>
where
    M: ScoreModel + ?Sized,
    F: FnMut(&PipelineStage),
{
    let mut tracker = StageTracker::new(on_stage);

    match run_stages(model, raw, &mut tracker) {
        Ok(result) => {
            tracker.enter(PipelineStage::Done);
            tracing::info!(
                class_index = result.class_index,
                confidence = result.confidence,
                "分類完了: {}",
                result
            );
            Ok(result)
        }
        Err(e) => {
            tracing::warn!(error = %e, "分類失敗");
            tracker.enter(PipelineStage::Failed(e.to_string()));
            Err(e)
        }
    }
}

fn run_stages<M, F>(
    model: &M,
    raw: &[u8],
    tracker: &mut StageTracker<F>,
) -> Result<PredictionResult, ClassifyError>
where
    M: ScoreModel + ?Sized,
    F: FnMut(&PipelineStage),
{
    tracker.enter(PipelineStage::Decoding);
    let image = preprocess::decode_image(raw)?;
    tracing::debug!(width = image.width(), height = image.height(), "デコード完了");
    let batched = preprocess::expand_dims(&image)?;
    drop(image);

    tracker.enter(PipelineStage::Resizing);
    let resized = preprocess::resize_bilinear(&batched, IMAGE_SIZE, IMAGE_SIZE)?;
    let tensor = preprocess::ensure_input_shape(resized)?;
    drop(batched);

    tracker.enter(PipelineStage::Inferring);
    let scores = runner::run(model, &tensor)?;
    drop(tensor);

    tracker.enter(PipelineStage::Selecting);
    selector::select(&scores)?.ensure_probability()
}

/// 画像ファイルを読み込んで分類する
pub fn classify_file<M, F>(
    model: &M,
    image_path: &Path,
    on_stage: F,
) -> Result<PredictionResult, ClassifyError>
where
    M: ScoreModel + ?Sized,
    F: FnMut(&PipelineStage),
{
    let raw = std::fs::read(image_path)?;
    classify(model, &raw, on_stage)
}
