//! モデル推論機能

use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, NdArray, Wgpu},
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor, TensorData},
};
use std::path::Path;

use crate::error::ClassifyError;
use crate::ml::{ModelConfig, PestClassifier};
use crate::model::{load_model_with_metadata, DeviceType, ModelMetadata};
use crate::pipeline::ScoreModel;
use crate::types::{ImageTensor, ScoreVector};

/// 読み込み済みの分類モデル
///
/// 起動時に一度だけ作成し、以降の分類リクエストで使い回す。
pub struct ModelHandle<B: Backend> {
    model: PestClassifier<B>,
    metadata: ModelMetadata,
    device: B::Device,
}

impl<B: Backend> ModelHandle<B> {
    /// モデルアーカイブを読み込んでハンドルを作成
    pub fn load<P: AsRef<Path>>(model_path: P, device: B::Device) -> Result<Self, ClassifyError> {
        let model_path = model_path.as_ref();
        tracing::info!("モデルを読み込み中: {}", model_path.display());

        let (metadata, model_binary) = load_model_with_metadata(model_path)
            .map_err(|e| ClassifyError::Load(format!("{:#}", e)))?;

        Self::from_parts(metadata, model_binary, device)
    }

    /// メタデータと重みバイナリからハンドルを作成
    pub fn from_parts(
        metadata: ModelMetadata,
        model_binary: Vec<u8>,
        device: B::Device,
    ) -> Result<Self, ClassifyError> {
        metadata
            .validate()
            .map_err(|e| ClassifyError::Load(format!("incompatible model: {:#}", e)))?;

        let model = ModelConfig::from_metadata(&metadata).init::<B>(&device);

        // モデルの重みを復元
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let record = recorder
            .load(model_binary, &device)
            .map_err(|e| ClassifyError::Load(format!("failed to restore weights: {:?}", e)))?;

        let model = model.load_record(record);

        tracing::info!(
            conv_channels = ?metadata.conv_channels,
            params = model.num_params(),
            "モデル読み込み完了"
        );

        Ok(Self {
            model,
            metadata,
            device,
        })
    }

    /// メタデータへの参照を取得
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

impl<B: Backend> ScoreModel for ModelHandle<B> {
    fn input_shape(&self) -> [usize; 4] {
        self.metadata.input_shape
    }

    fn predict(&self, tensor: &ImageTensor) -> Result<ScoreVector, ClassifyError> {
        let expected = self.input_shape();
        if tensor.shape() != expected {
            return Err(ClassifyError::InputShape {
                expected: expected.to_vec(),
                actual: tensor.shape().to_vec(),
            });
        }

        let data = TensorData::new(tensor.as_slice().to_vec(), expected);
        let input = Tensor::<B, 4>::from_data(data.convert::<B::FloatElem>(), &self.device);

        let output = self.model.forward(input);

        output
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| ClassifyError::Inference(format!("推論結果の取得エラー: {:?}", e)))
    }
}

/// 設定されたデバイスでモデルを読み込む
pub fn load_model<P: AsRef<Path>>(
    model_path: P,
    device_type: DeviceType,
) -> Result<Box<dyn ScoreModel + Send>, ClassifyError> {
    tracing::info!("計算デバイス: {}", device_type);

    match device_type {
        DeviceType::Cpu => Ok(Box::new(ModelHandle::<NdArray>::load(
            model_path,
            NdArrayDevice::Cpu,
        )?)),
        DeviceType::Wgpu => Ok(Box::new(ModelHandle::<Wgpu>::load(
            model_path,
            WgpuDevice::default(),
        )?)),
    }
}
