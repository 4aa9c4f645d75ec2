//! アプリケーション設定管理モジュール
//!
//! 計算デバイスやモデルパス、保存先アルバムなどをJSON形式で保存・読み込みします。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    Wgpu,
    /// NdArray (CPU) バックエンド
    #[default]
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// 同梱モデルアーカイブのパス（相対パスはリソースディレクトリ基準）
    pub model_path: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: "assets/model/pest_classifier.tar.gz".to_string(),
        }
    }
}

/// 写真保存先アルバムの設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumSettings {
    /// アルバム名（ピクチャフォルダ直下のディレクトリ名）
    pub album_name: String,
    /// 分類時に写真をアルバムへ保存するか
    #[serde(default = "default_true")]
    pub save_on_classify: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AlbumSettings {
    fn default() -> Self {
        Self {
            album_name: "PestClassification".to_string(),
            save_on_classify: true,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// 計算デバイスの種類
    #[serde(default)]
    pub device_type: DeviceType,
    /// モデル設定
    #[serde(default)]
    pub model: ModelSettings,
    /// アルバム設定
    #[serde(default)]
    pub album: AlbumSettings,
    /// 最後に分類した画像のパス
    #[serde(default)]
    pub last_image_path: Option<String>,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス（ヘッドレスツール用）
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 指定パスから設定を読み込む、存在しない・壊れている場合はデフォルト設定を返す
    pub fn load_or_default_at<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    tracing::info!("設定ファイルを読み込みました: {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "設定ファイルの読み込みに失敗しました ({}): {}。デフォルト設定を使用します",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::info!("設定ファイルが存在しません。デフォルト設定を使用します");
            Self::default()
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        tracing::debug!("設定ファイルを保存しました: {}", path.display());
        Ok(())
    }

    /// 計算デバイスを設定
    pub fn set_device_type(&mut self, device_type: DeviceType) {
        self.device_type = device_type;
    }

    /// モデルパスを設定
    pub fn set_model_path(&mut self, path: String) {
        self.model.model_path = path;
    }

    /// 最後に分類した画像のパスを更新
    pub fn update_last_image_path<P: AsRef<Path>>(&mut self, path: P) {
        self.last_image_path = Some(path.as_ref().to_string_lossy().to_string());
    }

    /// モデルパスを解決（相対パスは `base_dir` 基準）
    pub fn resolve_model_path(&self, base_dir: &Path) -> PathBuf {
        let path = PathBuf::from(&self.model.model_path);
        if path.is_absolute() {
            path
        } else {
            base_dir.join(path)
        }
    }

    /// 設定情報をログに出力
    pub fn log_summary(&self) {
        tracing::info!(
            device = %self.device_type,
            model_path = %self.model.model_path,
            album = %self.album.album_name,
            save_on_classify = self.album.save_on_classify,
            "アプリケーション設定"
        );
    }
}
