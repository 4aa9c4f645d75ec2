//! モデルメタデータ（トポロジー記述）の定義
//!
//! tar.gz形式のモデルアーカイブに `metadata.json` として格納されます。
//! ネットワーク構成・入力形状・クラスラベルを記述し、読み込み時に
//! アプリ側のラベル表・入力形状と一致するか検証します。

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::{CLASS_NAMES, INPUT_SHAPE};

/// メタデータ形式のバージョン
pub const METADATA_FORMAT_VERSION: u32 = 1;

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    /// メタデータ形式のバージョン
    pub format_version: u32,

    /// クラスラベル（出力インデックス順）
    pub class_labels: Vec<String>,

    /// 入力形状 [バッチ, 高さ, 幅, チャネル]
    pub input_shape: [usize; 4],

    /// 各畳み込みブロックの出力チャネル数
    /// 例: [16, 32, 64]
    pub conv_channels: Vec<usize>,

    /// エクスポート時刻（RFC 3339形式）
    pub exported_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成（ラベル・入力形状はアプリ定義のものを使う）
    pub fn new(conv_channels: Vec<usize>) -> Self {
        let exported_at = chrono::Local::now().to_rfc3339();

        Self {
            format_version: METADATA_FORMAT_VERSION,
            class_labels: CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            input_shape: INPUT_SHAPE,
            conv_channels,
            exported_at,
        }
    }

    /// このアプリで実行可能なモデルか検証
    pub fn validate(&self) -> Result<()> {
        if self.format_version != METADATA_FORMAT_VERSION {
            bail!(
                "unsupported metadata format version {} (expected {})",
                self.format_version,
                METADATA_FORMAT_VERSION
            );
        }

        if self.class_labels.len() != CLASS_NAMES.len()
            || self
                .class_labels
                .iter()
                .zip(CLASS_NAMES.iter())
                .any(|(a, b)| a != b)
        {
            bail!(
                "class labels {:?} do not match the label table {:?}",
                self.class_labels,
                CLASS_NAMES
            );
        }

        if self.input_shape != INPUT_SHAPE {
            bail!(
                "input shape {:?} does not match {:?}",
                self.input_shape,
                INPUT_SHAPE
            );
        }

        if self.conv_channels.is_empty() || self.conv_channels.contains(&0) {
            bail!("invalid conv_channels {:?}", self.conv_channels);
        }

        // 各ブロックのMaxPool(2x2, stride 2)で空間サイズが半分になる
        let remaining = u32::try_from(self.conv_channels.len())
            .ok()
            .and_then(|blocks| INPUT_SHAPE[1].min(INPUT_SHAPE[2]).checked_shr(blocks))
            .unwrap_or(0);
        if remaining == 0 {
            bail!(
                "{} conv blocks reduce the {}x{} input to nothing",
                self.conv_channels.len(),
                INPUT_SHAPE[1],
                INPUT_SHAPE[2]
            );
        }

        Ok(())
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }

    /// メタデータをログに出力
    pub fn log_info(&self) {
        tracing::info!(
            format_version = self.format_version,
            input_shape = ?self.input_shape,
            conv_channels = ?self.conv_channels,
            exported_at = %self.exported_at,
            "モデルメタデータ: クラス {}",
            self.class_labels.join(", ")
        );
    }
}
