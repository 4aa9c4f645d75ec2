//! モデルアーカイブと画像ファイルを指定して分類するツール
//!
//! 使い方: classify_photo [--cpu|--wgpu] <model.tar.gz> <image>...
//! モデルパスに `-` を指定すると config.json の設定を使う。

use pest_classifier_lib::ml::load_model;
use pest_classifier_lib::model::{load_metadata, AppConfig, DeviceType};
use pest_classifier_lib::pipeline::classify_file;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn main() -> ExitCode {
    pest_classifier_lib::init_tracing();

    let config = AppConfig::load_or_default_at(AppConfig::default_path());
    let mut device_type = config.device_type;
    let mut positional = Vec::new();

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--cpu" => device_type = DeviceType::Cpu,
            "--wgpu" => device_type = DeviceType::Wgpu,
            _ => positional.push(arg),
        }
    }

    if positional.len() < 2 {
        eprintln!("Usage: classify_photo [--cpu|--wgpu] <model.tar.gz|-> <image>...");
        return ExitCode::from(2);
    }

    let model_path = if positional[0] == "-" {
        PathBuf::from(&config.model.model_path)
    } else {
        PathBuf::from(&positional[0])
    };

    match load_metadata(&model_path) {
        Ok(metadata) => metadata.log_info(),
        Err(e) => tracing::warn!("メタデータ読み込みエラー: {:#}", e),
    }

    let model = match load_model(&model_path, device_type) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("✗ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut failures = 0;
    for image_path in &positional[1..] {
        match classify_file(model.as_ref(), Path::new(image_path), |_| {}) {
            Ok(result) => println!("{}: {}", image_path, result),
            Err(e) => {
                failures += 1;
                eprintln!("✗ {}: {} ({})", image_path, e.user_message(), e);
            }
        }
    }

    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
