//! 推論結果の選択

use crate::error::ClassifyError;
use crate::types::PredictionResult;

/// スコアが最大のクラスとその値を選ぶ
///
/// 先頭から線形に走査し、より大きい値のときだけ更新する。
/// そのため同値の最大が複数ある場合は最も小さいインデックスを返す。
/// NaNは選ばれない。先頭がNaNの場合は最初の非NaN値で置き換わり、
/// すべてNaNなら確信度もNaNのまま返る（値域チェックで弾かれる）。
pub fn select(scores: &[f32]) -> Result<PredictionResult, ClassifyError> {
    let (&first, rest) = scores.split_first().ok_or(ClassifyError::EmptyVector)?;

    let mut class_index = 0;
    let mut confidence = first;

    for (offset, &score) in rest.iter().enumerate() {
        if score > confidence || (confidence.is_nan() && !score.is_nan()) {
            class_index = offset + 1;
            confidence = score;
        }
    }

    Ok(PredictionResult {
        class_index,
        confidence,
    })
}
