//! 推論の実行

use crate::error::ClassifyError;
use crate::types::{ImageTensor, ScoreVector, INPUT_SHAPE, NUM_CLASSES};

/// 1枚の画像テンソルからクラスごとのスコアを返すモデル
pub trait ScoreModel {
    /// モデルが宣言する入力形状
    fn input_shape(&self) -> [usize; 4] {
        INPUT_SHAPE
    }

    /// 順伝播を実行してスコアを平坦なベクトルで返す
    ///
    /// 入力形状が `input_shape()` と異なる場合は `ClassifyError::InputShape`。
    fn predict(&self, tensor: &ImageTensor) -> Result<ScoreVector, ClassifyError>;
}

/// 推論を実行し、出力長がクラス数と一致することを確認する
pub fn run<M>(model: &M, tensor: &ImageTensor) -> Result<ScoreVector, ClassifyError>
where
    M: ScoreModel + ?Sized,
{
    let scores = model.predict(tensor)?;

    if scores.len() != NUM_CLASSES {
        return Err(ClassifyError::ShapeMismatch {
            expected: NUM_CLASSES,
            actual: scores.len(),
        });
    }

    Ok(scores)
}

/// テスト用の固定スコアモデル
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::Cell;

    pub struct FixedScoreModel {
        scores: Vec<f32>,
        pub calls: Cell<usize>,
    }

    impl FixedScoreModel {
        pub fn new(scores: Vec<f32>) -> Self {
            Self {
                scores,
                calls: Cell::new(0),
            }
        }
    }

    impl ScoreModel for FixedScoreModel {
        fn predict(&self, tensor: &ImageTensor) -> Result<ScoreVector, ClassifyError> {
            self.calls.set(self.calls.get() + 1);
            if tensor.shape() != self.input_shape() {
                return Err(ClassifyError::InputShape {
                    expected: self.input_shape().to_vec(),
                    actual: tensor.shape().to_vec(),
                });
            }
            Ok(self.scores.clone())
        }
    }

    /// 常に失敗するモデル
    pub struct FailingModel;

    impl ScoreModel for FailingModel {
        fn predict(&self, _tensor: &ImageTensor) -> Result<ScoreVector, ClassifyError> {
            Err(ClassifyError::Inference("backend unavailable".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{FailingModel, FixedScoreModel};
    use super::*;

    fn blank_tensor() -> ImageTensor {
        ImageTensor::from_shape_vec(INPUT_SHAPE, vec![0.0; INPUT_SHAPE.iter().product()]).unwrap()
    }

    #[test]
    fn test_run_returns_scores() {
        let mut scores = vec![0.0; NUM_CLASSES];
        scores[4] = 1.0;
        let model = FixedScoreModel::new(scores.clone());
        assert_eq!(run(&model, &blank_tensor()).unwrap(), scores);
        assert_eq!(model.calls.get(), 1);
    }

    #[test]
    fn test_wrong_length_is_shape_mismatch() {
        let model = FixedScoreModel::new(vec![0.5, 0.5]);
        let err = run(&model, &blank_tensor()).unwrap_err();
        assert!(matches!(
            err,
            ClassifyError::ShapeMismatch {
                expected: NUM_CLASSES,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_inference_error_propagates() {
        let err = run(&FailingModel, &blank_tensor()).unwrap_err();
        assert!(matches!(err, ClassifyError::Inference(_)));
    }

    #[test]
    fn test_works_through_trait_object() {
        let model: Box<dyn ScoreModel + Send> =
            Box::new(FixedScoreModel::new(vec![0.1; NUM_CLASSES]));
        assert!(run(model.as_ref(), &blank_tensor()).is_ok());
    }
}
