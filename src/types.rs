use serde::{Deserialize, Serialize};

use crate::error::ClassifyError;

/// クラス数
pub const NUM_CLASSES: usize = 10;

/// モデル入力の一辺（ピクセル）
pub const IMAGE_SIZE: usize = 224;

/// モデル入力の形状 [バッチ, 高さ, 幅, チャネル]
pub const INPUT_SHAPE: [usize; 4] = [1, IMAGE_SIZE, IMAGE_SIZE, 3];

/// クラス名の定義（インデックス順、モデルの出力順と一致）
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "black cutworm",
    "grain spreader thrips",
    "grub",
    "large cutworm",
    "mole cricket",
    "rice leafhopper",
    "rice shell pest",
    "rice water weevil",
    "white margined moth",
    "wireworm",
];

/// モデル出力（クラスごとのスコア）
pub type ScoreVector = Vec<f32>;

/// NHWC順に平坦化された画像テンソル
///
/// 値は0-255の画素値由来のまま（正規化しない）。
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    shape: [usize; 4],
    data: Vec<f32>,
}

impl ImageTensor {
    /// 形状とデータから作成（要素数が一致しない場合はエラー）
    pub fn from_shape_vec(shape: [usize; 4], data: Vec<f32>) -> Result<Self, ClassifyError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ClassifyError::InputShape {
                expected: shape.to_vec(),
                actual: vec![data.len()],
            });
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// (y, x, c) の画素値を取得（バッチは常に0）
    pub fn get(&self, y: usize, x: usize, c: usize) -> Option<f32> {
        let [_, h, w, ch] = self.shape;
        if y >= h || x >= w || c >= ch {
            return None;
        }
        self.data.get((y * w + x) * ch + c).copied()
    }
}

/// 分類結果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub class_index: usize,
    pub confidence: f32,
}

impl PredictionResult {
    /// クラス名（範囲外のインデックスはNone）
    pub fn label(&self) -> Option<&'static str> {
        CLASS_NAMES.get(self.class_index).copied()
    }

    /// 確信度が確率として妥当か検証（[0, 1]外、NaNはバックエンドの契約違反）
    pub fn ensure_probability(self) -> Result<Self, ClassifyError> {
        if (0.0..=1.0).contains(&self.confidence) {
            Ok(self)
        } else {
            Err(ClassifyError::ConfidenceOutOfRange(self.confidence))
        }
    }
}

impl std::fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.2}% {}",
            self.confidence * 100.0,
            self.label().unwrap_or("unknown")
        )
    }
}

/// フロントエンドへ返す表示用の分類結果
#[derive(Debug, Clone, Serialize)]
pub struct PredictionView {
    pub class_index: usize,
    pub label: String,
    pub confidence: f32,
    pub display: String,
}

impl From<PredictionResult> for PredictionView {
    fn from(result: PredictionResult) -> Self {
        Self {
            class_index: result.class_index,
            label: result.label().unwrap_or("unknown").to_string(),
            confidence: result.confidence,
            display: result.to_string(),
        }
    }
}
