//! 画像分類のTauriコマンド

use base64::Engine;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tauri::{AppHandle, Emitter, Manager, State};
use tauri_plugin_dialog::DialogExt;
use tokio::task;

use crate::error::ClassifyError;
use crate::media_library;
use crate::model::{AppConfig, DeviceType};
use crate::pipeline::{self, PipelineStage, ScoreModel};
use crate::types::{PredictionResult, PredictionView};
use crate::AppState;

type BoxedModel = Box<dyn ScoreModel + Send>;

/// モデルの読み込み状態
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum ModelStatus {
    Loading,
    Ready,
    Failed(String),
}

/// 共有モデルスロット
///
/// 読み込みごとに世代番号を進め、最新世代の結果だけを格納する。
/// デバイス変更で読み込みが重なっても、古い読み込みの結果は捨てられる。
pub struct ModelSlot {
    model: Mutex<Option<BoxedModel>>,
    status: Mutex<ModelStatus>,
    generation: AtomicU64,
}

impl ModelSlot {
    pub fn new() -> Self {
        Self {
            model: Mutex::new(None),
            status: Mutex::new(ModelStatus::Loading),
            generation: AtomicU64::new(0),
        }
    }

    // 推論中のパニックでロックが汚染されても、モデル自体は使い続ける
    fn lock_model(&self) -> MutexGuard<'_, Option<BoxedModel>> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: ModelStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// 新しい読み込みを開始し、その世代番号を返す
    pub fn begin_load(&self) -> u64 {
        let mut model = self.lock_model();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *model = None;
        self.set_status(ModelStatus::Loading);
        generation
    }

    /// 読み込み結果を格納する
    ///
    /// 後から別の読み込みが始まっていた場合は結果を捨てて `None` を返す。
    pub fn finish_load(
        &self,
        generation: u64,
        result: Result<BoxedModel, ClassifyError>,
    ) -> Option<ModelStatus> {
        let mut model = self.lock_model();
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(generation, "古い読み込み結果を破棄しました");
            return None;
        }

        let status = match result {
            Ok(loaded) => {
                *model = Some(loaded);
                ModelStatus::Ready
            }
            Err(e) => {
                *model = None;
                ModelStatus::Failed(e.user_message())
            }
        };
        self.set_status(status.clone());
        Some(status)
    }

    pub fn status(&self) -> ModelStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 読み込み済みモデルで処理を実行（リクエストは直列化される）
    pub fn with_model<T>(
        &self,
        f: impl FnOnce(&(dyn ScoreModel + Send)) -> Result<T, ClassifyError>,
    ) -> Result<T, ClassifyError> {
        let slot = self.lock_model();
        let model = slot.as_deref().ok_or(ClassifyError::ModelNotReady)?;
        f(model)
    }
}

impl Default for ModelSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// 設定されたデバイスでモデルを読み込む
#[cfg(feature = "ml")]
fn load_model(path: &Path, device_type: DeviceType) -> Result<BoxedModel, ClassifyError> {
    crate::ml::load_model(path, device_type)
}

// featureが無効な場合のダミー実装
#[cfg(not(feature = "ml"))]
fn load_model(_path: &Path, _device_type: DeviceType) -> Result<BoxedModel, ClassifyError> {
    Err(ClassifyError::Load("機械学習機能が有効化されていません".to_string()))
}

/// バックグラウンドスレッドでモデルを読み込み、完了したら状態に格納する
///
/// 成功時は `model-ready`、失敗時は `model-load-failed` イベントを発行する。
/// イベントを受け取る前に画面が開いた場合に備え、結果は `model_status` でも取得できる。
pub fn spawn_model_loader(app: AppHandle) {
    let state = app.state::<AppState>();
    let generation = state.model.begin_load();

    let (model_path, device_type) = match state.config.lock() {
        Ok(config) => {
            let base_dir = app
                .path()
                .resource_dir()
                .unwrap_or_else(|_| PathBuf::from("."));
            (config.resolve_model_path(&base_dir), config.device_type)
        }
        Err(_) => {
            tracing::error!("設定のロック取得に失敗しました");
            state.model.finish_load(
                generation,
                Err(ClassifyError::Load("config lock poisoned".to_string())),
            );
            return;
        }
    };

    let model = state.model.clone();
    std::thread::spawn(move || {
        let result = load_model(&model_path, device_type);
        if let Err(e) = &result {
            tracing::error!(error = %e, "モデルの読み込みに失敗しました: {}", model_path.display());
        }

        match model.finish_load(generation, result) {
            Some(ModelStatus::Ready) => {
                let _ = app.emit("model-ready", true);
            }
            Some(ModelStatus::Failed(message)) => {
                let _ = app.emit("model-load-failed", message);
            }
            _ => {}
        }
    });
}

/// 写真保存先のルート（ピクチャフォルダ、無ければアプリデータ配下）
fn library_root(app: &AppHandle) -> Result<PathBuf, String> {
    app.path()
        .picture_dir()
        .or_else(|_| app.path().app_data_dir().map(|dir| dir.join("Pictures")))
        .map_err(|e| format!("保存先フォルダの取得エラー: {}", e))
}

fn lock_config(state: &AppState) -> Result<MutexGuard<'_, AppConfig>, String> {
    state
        .config
        .lock()
        .map_err(|_| "設定のロック取得に失敗しました".to_string())
}

fn persist_config(state: &AppState, config: &AppConfig) {
    let path = match state.config_path.lock() {
        Ok(path) => path.clone(),
        Err(_) => None,
    };
    if let Some(path) = path {
        if let Err(e) = config.save(&path) {
            tracing::warn!("設定ファイルの保存に失敗しました ({}): {}", path.display(), e);
        }
    }
}

/// ブロッキングスレッドでパイプラインを実行し、段階をフロントエンドへ通知する
async fn run_pipeline(
    model: Arc<ModelSlot>,
    raw: Vec<u8>,
    on_stage: tauri::ipc::Channel<PipelineStage>,
) -> Result<PredictionResult, String> {
    let result = task::spawn_blocking(move || {
        model.with_model(|model| {
            pipeline::classify(model, &raw, |stage| {
                on_stage.send(stage.clone()).ok();
            })
        })
    })
    .await
    .map_err(|e| {
        tracing::error!("分類スレッドエラー: {}", e);
        ClassifyError::Inference(e.to_string()).user_message()
    })?;

    result.map_err(|e| e.user_message())
}

/// モデルの読み込みが完了しているか
#[tauri::command]
pub fn is_model_ready(state: State<AppState>) -> bool {
    state.model.status() == ModelStatus::Ready
}

/// モデルの読み込み状態（失敗時はメッセージ付き）
#[tauri::command]
pub fn model_status(state: State<AppState>) -> ModelStatus {
    state.model.status()
}

/// ファイルダイアログで画像を選択
#[tauri::command]
pub async fn pick_image(app: AppHandle) -> Result<Option<String>, String> {
    let picked = task::spawn_blocking(move || {
        app.dialog()
            .file()
            .add_filter("Image", &["jpg", "jpeg", "png", "bmp", "gif", "webp"])
            .blocking_pick_file()
    })
    .await
    .map_err(|e| format!("ダイアログスレッドエラー: {}", e))?;

    match picked {
        Some(file) => {
            let path = file
                .into_path()
                .map_err(|e| format!("パスの変換エラー: {}", e))?;
            Ok(Some(path.to_string_lossy().to_string()))
        }
        None => Ok(None),
    }
}

/// 画像ファイルを分類（設定に応じてアルバムへ保存）
#[tauri::command]
pub async fn classify_image(
    app: AppHandle,
    state: State<'_, AppState>,
    image_path: String,
    on_stage: tauri::ipc::Channel<PipelineStage>,
) -> Result<PredictionView, String> {
    let path = PathBuf::from(&image_path);
    let raw = tokio::fs::read(&path)
        .await
        .map_err(|e| ClassifyError::from(e).user_message())?;

    let (save_on_classify, album_name) = {
        let config = lock_config(&state)?;
        (config.album.save_on_classify, config.album.album_name.clone())
    };

    if save_on_classify {
        match library_root(&app) {
            Ok(root) => {
                if let Err(e) = media_library::save_to_album(&root, &album_name, &path) {
                    tracing::warn!("アルバムへの保存に失敗しました: {:#}", e);
                }
            }
            Err(e) => tracing::warn!("{}", e),
        }
    }

    let result = run_pipeline(state.model.clone(), raw, on_stage).await?;

    {
        let mut config = lock_config(&state)?;
        config.update_last_image_path(&path);
        persist_config(&state, &config);
    }

    Ok(result.into())
}

/// カメラで撮影した画像（base64）を分類
#[tauri::command]
pub async fn classify_captured_image(
    app: AppHandle,
    state: State<'_, AppState>,
    image_base64: String,
    on_stage: tauri::ipc::Channel<PipelineStage>,
) -> Result<PredictionView, String> {
    // data URL形式の場合はヘッダーを除去
    let encoded = match image_base64.split_once(',') {
        Some((header, body)) if header.starts_with("data:") => body,
        _ => image_base64.as_str(),
    };
    let raw = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| {
            tracing::warn!("base64デコードエラー: {}", e);
            ClassifyError::from(e).user_message()
        })?;

    let (save_on_classify, album_name) = {
        let config = lock_config(&state)?;
        (config.album.save_on_classify, config.album.album_name.clone())
    };

    if save_on_classify {
        match library_root(&app) {
            Ok(root) => {
                if let Err(e) = media_library::save_bytes_to_album(&root, &album_name, &raw) {
                    tracing::warn!("アルバムへの保存に失敗しました: {:#}", e);
                }
            }
            Err(e) => tracing::warn!("{}", e),
        }
    }

    let result = run_pipeline(state.model.clone(), raw, on_stage).await?;
    Ok(result.into())
}

/// 画像をアルバムへ保存
#[tauri::command]
pub fn save_image_to_album(
    app: AppHandle,
    state: State<AppState>,
    image_path: String,
) -> Result<String, String> {
    let album_name = lock_config(&state)?.album.album_name.clone();
    let root = library_root(&app)?;

    media_library::save_to_album(&root, &album_name, Path::new(&image_path))
        .map(|saved| saved.to_string_lossy().to_string())
        .map_err(|e| format!("保存エラー: {:#}", e))
}

/// 現在の設定を取得
#[tauri::command]
pub fn get_config(state: State<AppState>) -> Result<AppConfig, String> {
    Ok(lock_config(&state)?.clone())
}

/// 計算デバイスを変更し、モデルを読み込み直す
#[tauri::command]
pub fn set_device_type(
    app: AppHandle,
    state: State<AppState>,
    device_type: DeviceType,
) -> Result<(), String> {
    {
        let mut config = lock_config(&state)?;
        if config.device_type == device_type {
            return Ok(());
        }
        config.set_device_type(device_type);
        persist_config(&state, &config);
    }

    tracing::info!("計算デバイスを変更しました: {}", device_type);

    // 実行中の読み込みがあっても、新しい世代の結果だけが使われる
    spawn_model_loader(app);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::runner::fake::FixedScoreModel;
    use crate::types::{ImageTensor, INPUT_SHAPE, NUM_CLASSES};

    fn fixed_model() -> BoxedModel {
        let mut scores = vec![0.0; NUM_CLASSES];
        scores[3] = 1.0;
        Box::new(FixedScoreModel::new(scores))
    }

    fn blank_tensor() -> ImageTensor {
        ImageTensor::from_shape_vec(INPUT_SHAPE, vec![0.0; INPUT_SHAPE.iter().product()]).unwrap()
    }

    #[test]
    fn test_slot_starts_loading_and_rejects_requests() {
        let slot = ModelSlot::new();
        assert_eq!(slot.status(), ModelStatus::Loading);

        let result = slot.with_model(|_| Ok(()));
        assert!(matches!(result, Err(ClassifyError::ModelNotReady)));
    }

    #[test]
    fn test_failed_load_is_kept_for_later_queries() {
        let slot = ModelSlot::new();
        let generation = slot.begin_load();

        let status = slot.finish_load(generation, Err(ClassifyError::Load("missing".into())));
        let expected = ModelStatus::Failed(ClassifyError::Load(String::new()).user_message());
        assert_eq!(status, Some(expected.clone()));

        // イベントを受け取り損ねても状態は取得できる
        assert_eq!(slot.status(), expected);
        assert!(matches!(
            slot.with_model(|_| Ok(())),
            Err(ClassifyError::ModelNotReady)
        ));

        let json = serde_json::to_value(&expected).unwrap();
        assert_eq!(json["status"], "failed");
        assert!(json["message"].as_str().unwrap().contains("model"));
    }

    #[test]
    fn test_stale_load_does_not_replace_newer_one() {
        let slot = ModelSlot::new();
        let first = slot.begin_load();
        let second = slot.begin_load();

        assert_eq!(slot.finish_load(second, Ok(fixed_model())), Some(ModelStatus::Ready));
        assert_eq!(slot.finish_load(first, Err(ClassifyError::Load("slow".into()))), None);

        assert_eq!(slot.status(), ModelStatus::Ready);
        let scores = slot.with_model(|model| model.predict(&blank_tensor())).unwrap();
        assert_eq!(scores[3], 1.0);
    }

    #[test]
    fn test_begin_load_clears_previous_model() {
        let slot = ModelSlot::new();
        let generation = slot.begin_load();
        slot.finish_load(generation, Ok(fixed_model()));

        slot.begin_load();
        assert_eq!(slot.status(), ModelStatus::Loading);
        assert!(matches!(
            slot.with_model(|_| Ok(())),
            Err(ClassifyError::ModelNotReady)
        ));
    }

    #[test]
    fn test_slot_survives_panic_during_inference() {
        let slot = ModelSlot::new();
        let generation = slot.begin_load();
        slot.finish_load(generation, Ok(fixed_model()));

        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = slot.with_model(|_| -> Result<(), ClassifyError> { panic!("backend crashed") });
        }));
        assert!(panicked.is_err());

        let scores = slot.with_model(|model| model.predict(&blank_tensor())).unwrap();
        assert_eq!(scores.len(), NUM_CLASSES);
    }
}
