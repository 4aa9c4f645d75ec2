//! 分類パイプラインのエラー定義

use thiserror::Error;

/// 分類パイプラインで発生するエラー
#[derive(Error, Debug)]
pub enum ClassifyError {
    /// モデルの読み込み失敗（アーカイブ欠損・破損・非互換）
    #[error("model load failed: {0}")]
    Load(String),

    /// 画像のデコード失敗
    #[error("image decode failed")]
    Decode(#[source] image::ImageError),

    /// 入力テンソルの形状がモデルの入力形状と一致しない
    #[error("input shape {actual:?} does not match model input {expected:?}")]
    InputShape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// バックエンドでの推論失敗
    #[error("inference failed: {0}")]
    Inference(String),

    /// 出力ベクトルの長さがクラス数と一致しない
    #[error("score vector has {actual} entries, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// 空の出力ベクトル
    #[error("score vector is empty")]
    EmptyVector,

    /// 確信度が[0, 1]の範囲外
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f32),

    /// モデル読み込み完了前のリクエスト
    #[error("model is not loaded yet")]
    ModelNotReady,

    /// 撮影画像のbase64デコード失敗
    #[error("captured image is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// 画像ファイルの読み込み失敗
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
}

impl ClassifyError {
    /// 画面表示用のメッセージ
    pub fn user_message(&self) -> String {
        match self {
            ClassifyError::Load(_) => {
                "The classification model could not be loaded.".to_string()
            }
            ClassifyError::Decode(_) | ClassifyError::Base64(_) | ClassifyError::Io(_) => {
                "This image could not be read. Please pick another image.".to_string()
            }
            ClassifyError::InputShape { .. }
            | ClassifyError::Inference(_)
            | ClassifyError::ShapeMismatch { .. } => {
                "Classification failed, try again.".to_string()
            }
            ClassifyError::ModelNotReady => {
                "The model is still loading. Please wait a moment.".to_string()
            }
            ClassifyError::EmptyVector | ClassifyError::ConfidenceOutOfRange(_) => {
                "Something went wrong while classifying the image.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_categories() {
        let retry = "Classification failed, try again.";
        assert_eq!(ClassifyError::Inference("x".into()).user_message(), retry);
        assert_eq!(
            ClassifyError::ShapeMismatch {
                expected: 10,
                actual: 3
            }
            .user_message(),
            retry
        );
        assert_ne!(ClassifyError::EmptyVector.user_message(), retry);
        assert!(ClassifyError::Load("missing".into())
            .user_message()
            .contains("model"));
    }

    #[test]
    fn test_display_includes_detail() {
        let err = ClassifyError::ShapeMismatch {
            expected: 10,
            actual: 3,
        };
        assert_eq!(err.to_string(), "score vector has 3 entries, expected 10");

        let err = ClassifyError::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        ));
        assert_eq!(err.to_string(), "failed to read image: no such file");
    }

    #[test]
    fn test_unreadable_inputs_share_message() {
        use base64::Engine;

        let base64_err = base64::engine::general_purpose::STANDARD
            .decode("not base64!")
            .unwrap_err();
        let from_base64 = ClassifyError::from(base64_err).user_message();
        let from_io = ClassifyError::from(std::io::Error::other("denied")).user_message();

        assert_eq!(from_base64, from_io);
        assert!(from_base64.contains("could not be read"));
    }
}
