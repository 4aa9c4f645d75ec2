//! 害虫分類用CNNモデルの定義
//!
//! ネットワーク構成はモデルアーカイブの `metadata.json` に記述され、
//! 読み込み時にその記述からモデルを組み立ててから重みを復元します。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use crate::model::ModelMetadata;

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// 各畳み込みブロックの出力チャネル数
    pub conv_channels: Vec<usize>,
}

impl ModelConfig {
    /// メタデータの記述からモデル設定を作成
    pub fn from_metadata(metadata: &ModelMetadata) -> Self {
        Self::new(metadata.class_labels.len(), metadata.conv_channels.clone())
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> PestClassifier<B> {
        let mut in_channels = 3;
        let mut convs = Vec::with_capacity(self.conv_channels.len());

        for &out_channels in &self.conv_channels {
            convs.push(
                Conv2dConfig::new([in_channels, out_channels], [3, 3])
                    .with_padding(PaddingConfig2d::Same)
                    .init(device),
            );
            in_channels = out_channels;
        }

        PestClassifier {
            convs,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(in_channels, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

/// 害虫分類用CNNモデル
///
/// # アーキテクチャ
/// - 入力 [batch, 224, 224, 3] (NHWC) を NCHW に並べ替え
/// - {Conv 3x3 (same padding) + ReLU + MaxPool 2x2} x ブロック数
/// - Global Average Pooling
/// - FC: 最終チャネル数 -> num_classes
/// - Softmax
#[derive(Module, Debug)]
pub struct PestClassifier<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
    global_pool: AdaptiveAvgPool2d,
    fc: Linear<B>,
    activation: Relu,
}

impl<B: Backend> PestClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, height, width, 3]
    ///
    /// # 戻り値
    /// - クラスごとの確率 [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        // NHWC -> NCHW
        let mut x = images.permute([0, 3, 1, 2]);

        for conv in &self.convs {
            x = conv.forward(x);
            x = self.activation.forward(x);
            x = self.pool.forward(x);
        }

        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc.forward(x);
        softmax(x, 1)
    }
}
