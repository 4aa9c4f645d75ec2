#![recursion_limit = "256"]

mod classify_commands;

pub mod error;
pub mod media_library;
pub mod model;
pub mod pipeline;
pub mod types;
#[cfg(feature = "ml")]
pub mod ml;

use classify_commands::ModelSlot;
use model::AppConfig;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tauri::Manager;

pub struct AppState {
    model: Arc<ModelSlot>, // 読み込み済みモデルと読み込み状態
    config: Arc<Mutex<AppConfig>>,
    config_path: Arc<Mutex<Option<PathBuf>>>, // 設定ファイルの保存先
}

/// ログ出力の初期化
///
/// `RUST_LOG` が未設定の場合はinfoレベル。描画系クレートのログは抑える。
pub fn init_tracing() {
    use tracing_subscriber::{
        filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
    };

    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    for d in ["wgpu=warn", "naga=warn", "tao=warn", "wry=warn", "tauri=info"] {
        if let Ok(dir) = d.parse() {
            filter = filter.add_directive(dir);
        }
    }

    // 既に初期化済みの場合は何もしない
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    init_tracing();

    let app_state = AppState {
        model: Arc::new(ModelSlot::new()),
        config: Arc::new(Mutex::new(AppConfig::default())),
        config_path: Arc::new(Mutex::new(None)),
    };

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_fs::init())
        .setup(move |app| {
            // 設定ファイルを読み込む
            let config_path = app.path().app_config_dir()?.join("config.json");
            let config = AppConfig::load_or_default_at(&config_path);
            config.log_summary();

            let state: tauri::State<AppState> = app.state();
            if let Ok(mut current) = state.config.lock() {
                *current = config;
            }
            if let Ok(mut path) = state.config_path.lock() {
                *path = Some(config_path);
            }

            // モデルは起動時に一度だけ読み込む
            classify_commands::spawn_model_loader(app.handle().clone());
            Ok(())
        })
        .manage(app_state)
        .invoke_handler(tauri::generate_handler![
            classify_commands::is_model_ready,
            classify_commands::model_status,
            classify_commands::pick_image,
            classify_commands::classify_image,
            classify_commands::classify_captured_image,
            classify_commands::save_image_to_album,
            classify_commands::get_config,
            classify_commands::set_device_type,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
