use anyhow::{ensure, Result};
use burn::{
    nn::{loss::CrossEntropyLossConfig, Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::softmax,
};

use crate::ml::{
    block::{StochasticDepthSchedule, TransformerBlock, TransformerBlockConfig},
    embedding::{PositionalEmbedding, PositionalEmbeddingKind},
    pooling::{SeqPool, SeqPoolConfig},
    settings::InitializerKind,
    shape::{tokenizer_channels, tokenizer_output_edge},
    tokenizer::{ConvTokenizer, ConvTokenizerConfig},
};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally; do NOT add them again or you get conflicting impls.
/// CCT-L/KxT: L encoder layers on top of a T-layer tokenizer with K×K kernels.
///
/// Defaults describe CCT-14/7x2.
#[derive(Config, Debug)]
pub struct CctConfig {
    pub num_classes:  usize,
    pub image_height: usize,
    pub image_width:  usize,
    #[config(default = 3)]
    pub in_channels:  usize,

    #[config(default = 14)]
    pub num_transformer_layers: usize,
    #[config(default = 6)]
    pub num_heads:              usize,
    #[config(default = 3.0)]
    pub mlp_ratio:              f64,
    #[config(default = 384)]
    pub embedding_dim:          usize,

    #[config(default = 7)]
    pub tokenizer_kernel_size: usize,
    #[config(default = 2)]
    pub tokenizer_stride:      usize,
    #[config(default = 2)]
    pub tokenizer_conv_layers: usize,
    #[config(default = 3)]
    pub tokenizer_pool_size:   usize,
    #[config(default = 2)]
    pub tokenizer_pool_stride: usize,

    #[config(default = 0.1)]
    pub dropout:                   f64,
    #[config(default = 0.1)]
    pub attention_dropout:         f64,
    #[config(default = 0.1)]
    pub stochastic_depth_rate:     f64,
    #[config(default = "StochasticDepthSchedule::Uniform")]
    pub stochastic_depth_schedule: StochasticDepthSchedule,

    #[config(default = 1)]
    pub seq_pool_weights:     usize,
    #[config(default = "PositionalEmbeddingKind::Learnable")]
    pub positional_embedding: PositionalEmbeddingKind,
    #[config(default = 0.2)]
    pub embedding_std:        f64,

    /// Dropout + dense softmax classifier on top of the pooled features
    #[config(default = true)]
    pub add_top:        bool,
    #[config(default = 0.3)]
    pub final_dropout:  f64,

    #[config(default = 1e-6)]
    pub layer_norm_epsilon: f64,
    #[config(default = "InitializerKind::GlorotUniform")]
    pub dense_initializer:  InitializerKind,
    #[config(default = "InitializerKind::HeNormal")]
    pub conv_initializer:   InitializerKind,
}

impl CctConfig {
    /// Token grid produced by the tokenizer: (rows, cols).
    pub fn token_grid(&self) -> (usize, usize) {
        let edge = |dim| tokenizer_output_edge(
            dim,
            self.tokenizer_stride,
            self.tokenizer_pool_stride,
            self.tokenizer_conv_layers,
        );
        (edge(self.image_height), edge(self.image_width))
    }

    /// Sequence length seen by the encoder.
    pub fn num_patches(&self) -> usize {
        let (rows, cols) = self.token_grid();
        rows * cols
    }

    /// Width of the model output: class count with a head, pooled features without.
    pub fn output_dim(&self) -> usize {
        if self.add_top {
            self.num_classes
        } else {
            self.seq_pool_weights * self.embedding_dim
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.in_channels > 0, "in_channels must be positive");
        ensure!(self.image_height > 0 && self.image_width > 0, "image size must be positive");
        ensure!(self.embedding_dim > 0, "embedding_dim must be positive");
        ensure!(self.num_heads > 0, "num_heads must be positive");
        ensure!(
            self.embedding_dim % self.num_heads == 0,
            "embedding_dim ({}) must be divisible by num_heads ({})",
            self.embedding_dim, self.num_heads,
        );
        ensure!(self.mlp_ratio > 0.0, "mlp_ratio must be positive");
        ensure!(self.tokenizer_conv_layers >= 1, "the tokenizer needs at least one conv layer");
        ensure!(
            tokenizer_channels(self.embedding_dim, self.tokenizer_conv_layers)
                .iter()
                .all(|&c| c > 0),
            "embedding_dim ({}) is too small for {} tokenizer layers",
            self.embedding_dim, self.tokenizer_conv_layers,
        );
        ensure!(
            self.tokenizer_kernel_size % 2 == 1,
            "tokenizer_kernel_size must be odd, got {}", self.tokenizer_kernel_size,
        );
        ensure!(
            self.tokenizer_pool_size % 2 == 1,
            "tokenizer_pool_size must be odd, got {}", self.tokenizer_pool_size,
        );
        ensure!(
            self.tokenizer_stride > 0 && self.tokenizer_pool_stride > 0,
            "tokenizer strides must be positive",
        );
        ensure!(self.seq_pool_weights >= 1, "seq_pool_weights must be at least 1");
        ensure!(!self.add_top || self.num_classes >= 1, "num_classes must be at least 1");
        ensure!(self.embedding_std > 0.0, "embedding_std must be positive");
        for (name, rate) in [
            ("dropout", self.dropout),
            ("attention_dropout", self.attention_dropout),
            ("stochastic_depth_rate", self.stochastic_depth_rate),
            ("final_dropout", self.final_dropout),
        ] {
            ensure!((0.0..1.0).contains(&rate), "{name} must be in [0, 1), got {rate}");
        }
        Ok(())
    }

    pub fn tokenizer_config(&self) -> ConvTokenizerConfig {
        ConvTokenizerConfig::new(self.in_channels, self.embedding_dim)
            .with_kernel_size(self.tokenizer_kernel_size)
            .with_stride(self.tokenizer_stride)
            .with_conv_layers(self.tokenizer_conv_layers)
            .with_pool_size(self.tokenizer_pool_size)
            .with_pool_stride(self.tokenizer_pool_stride)
            .with_initializer(self.conv_initializer)
    }

    pub fn block_config(&self, index: usize) -> TransformerBlockConfig {
        let drop_path = self.stochastic_depth_schedule.rate_for(
            self.stochastic_depth_rate,
            index,
            self.num_transformer_layers,
        );
        TransformerBlockConfig::new(self.embedding_dim, self.num_heads)
            .with_mlp_ratio(self.mlp_ratio)
            .with_dropout(self.dropout)
            .with_attention_dropout(self.attention_dropout)
            .with_drop_path(drop_path)
            .with_layer_norm_epsilon(self.layer_norm_epsilon)
            .with_initializer(self.dense_initializer)
    }

    pub fn seq_pool_config(&self) -> SeqPoolConfig {
        SeqPoolConfig::new(self.embedding_dim)
            .with_attention_channels(self.seq_pool_weights)
            .with_layer_norm_epsilon(self.layer_norm_epsilon)
            .with_initializer(self.dense_initializer)
    }

    /// Build the model. Call [`CctConfig::validate`] first.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CctModel<B> {
        let num_patches = self.num_patches();
        let positional_embedding = match self.positional_embedding {
            PositionalEmbeddingKind::Learnable => Some(PositionalEmbedding::learnable(
                num_patches, self.embedding_dim, self.embedding_std, device,
            )),
            PositionalEmbeddingKind::Sinusoidal => Some(PositionalEmbedding::sinusoidal(
                num_patches, self.embedding_dim, device,
            )),
            PositionalEmbeddingKind::Disabled => None,
        };

        let blocks = (0..self.num_transformer_layers)
            .map(|i| self.block_config(i).init(device))
            .collect();

        let head = self.add_top.then(|| ClassifierHead {
            dropout: DropoutConfig::new(self.final_dropout).init(),
            linear:  LinearConfig::new(self.seq_pool_config().output_dim(), self.num_classes)
                .with_bias(true)
                .with_initializer(self.dense_initializer.to_initializer())
                .init(device),
        });

        CctModel {
            tokenizer: self.tokenizer_config().init(device),
            positional_embedding,
            dropout: DropoutConfig::new(self.dropout).init(),
            blocks,
            seq_pool: self.seq_pool_config().init(device),
            head,
        }
    }
}

#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    pub dropout: Dropout,
    pub linear:  Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        self.linear.forward(self.dropout.forward(features))
    }
}

#[derive(Module, Debug)]
pub struct CctModel<B: Backend> {
    pub tokenizer:            ConvTokenizer<B>,
    pub positional_embedding: Option<PositionalEmbedding<B>>,
    pub dropout:              Dropout,
    pub blocks:               Vec<TransformerBlock<B>>,
    pub seq_pool:             SeqPool<B>,
    pub head:                 Option<ClassifierHead<B>>,
}

impl<B: Backend> CctModel<B> {
    /// Tokenize, embed and encode: [batch, C, H, W] → [batch, tokens, D]
    pub fn encode(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let mut x = self.tokenizer.forward(images);
        if let Some(embedding) = &self.positional_embedding {
            x = embedding.forward(x);
        }
        x = self.dropout.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }
        x
    }

    /// Pooled features: [batch, C, H, W] → [batch, A·D]
    pub fn features(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.seq_pool.forward(self.encode(images))
    }

    /// images: [batch, C, H, W] → logits [batch, num_classes],
    /// or pooled features [batch, A·D] when built without a head.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.features(images);
        match &self.head {
            Some(head) => head.forward(features),
            None       => features,
        }
    }

    /// Softmax over the output dimension.
    pub fn predict_proba(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// Cross-entropy loss against integer class targets.
    pub fn forward_loss(
        &self,
        images:          Tensor<B, 4>,
        targets:         Tensor<B, 1, Int>,
        label_smoothing: Option<f32>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .with_smoothing(label_smoothing)
            .init(&logits.device())
            .forward(logits.clone(), targets);
        (loss, logits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn tiny_config() -> CctConfig {
        CctConfig::new(4, 16, 16)
            .with_num_transformer_layers(2)
            .with_num_heads(2)
            .with_mlp_ratio(1.0)
            .with_embedding_dim(16)
            .with_tokenizer_kernel_size(3)
            .with_tokenizer_stride(1)
    }

    #[test]
    fn test_default_is_cct_14_7x2() {
        let config = CctConfig::new(1000, 224, 224);
        assert_eq!(config.num_transformer_layers, 14);
        assert_eq!(config.tokenizer_kernel_size, 7);
        assert_eq!(config.tokenizer_conv_layers, 2);
        assert_eq!(config.token_grid(), (14, 14));
        assert_eq!(config.num_patches(), 196);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_square_patch_count() {
        let config = CctConfig::new(10, 64, 32);
        // Each conv + pool layer divides the edge by 4: 64 → 4, 32 → 2
        assert_eq!(config.token_grid(), (4, 2));
        assert_eq!(config.num_patches(), 8);
    }

    #[test]
    fn test_validate_rejects_bad_heads() {
        let config = tiny_config().with_num_heads(3);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_even_kernel() {
        assert!(tiny_config().with_tokenizer_kernel_size(4).validate().is_err());
        assert!(tiny_config().with_tokenizer_pool_size(2).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_rates_out_of_range() {
        assert!(tiny_config().with_dropout(1.0).validate().is_err());
        assert!(tiny_config().with_stochastic_depth_rate(-0.1).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_narrow_embedding() {
        let config = tiny_config().with_embedding_dim(2).with_num_heads(1).with_tokenizer_conv_layers(3);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_pool_weights_and_classes() {
        assert!(tiny_config().with_seq_pool_weights(0).validate().is_err());
        assert!(tiny_config().with_embedding_std(0.0).validate().is_err());

        let mut config = tiny_config();
        config.num_classes = 0;
        assert!(config.validate().is_err());
        // Without a head the class count is unused
        assert!(config.with_add_top(false).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_stride() {
        assert!(tiny_config().with_tokenizer_stride(0).validate().is_err());
        assert!(tiny_config().with_tokenizer_pool_stride(0).validate().is_err());
    }

    #[test]
    fn test_forward_produces_logits() {
        let device = Default::default();
        let config = tiny_config();
        config.validate().unwrap();
        let model = config.init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::ones([3, 3, 16, 16], &device);
        assert_eq!(model.forward(images).dims(), [3, 4]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::ones([2, 3, 16, 16], &device);
        let sums: Vec<f32> = model.predict_proba(images).sum_dim(1).into_data().to_vec().unwrap();
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_without_top_returns_pooled_features() {
        let device = Default::default();
        let config = tiny_config().with_add_top(false).with_seq_pool_weights(2);
        let model = config.init::<TestBackend>(&device);
        assert!(model.head.is_none());
        let images = Tensor::<TestBackend, 4>::ones([2, 3, 16, 16], &device);
        assert_eq!(model.forward(images).dims(), [2, 32]);
        assert_eq!(config.output_dim(), 32);
    }

    #[test]
    fn test_disabled_embedding_has_no_parameters_for_it() {
        let device = Default::default();
        let with    = tiny_config().init::<TestBackend>(&device);
        let without = tiny_config()
            .with_positional_embedding(PositionalEmbeddingKind::Disabled)
            .init::<TestBackend>(&device);
        assert!(without.positional_embedding.is_none());
        // Learnable embedding holds N·D parameters: 4×4 tokens × 16 dims
        assert_eq!(tiny_config().num_patches(), 16);
        assert_eq!(with.num_params() - without.num_params(), 16 * 16);
    }

    #[test]
    fn test_linear_schedule_reaches_full_rate_on_last_block() {
        let config = tiny_config()
            .with_num_transformer_layers(3)
            .with_stochastic_depth_rate(0.2)
            .with_stochastic_depth_schedule(StochasticDepthSchedule::Linear);
        assert_eq!(config.block_config(0).drop_path, 0.0);
        assert!((config.block_config(2).drop_path - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_forward_loss_is_finite() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);
        let images  = Tensor::<TestBackend, 4>::ones([2, 3, 16, 16], &device);
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([0, 3], &device);
        let (loss, logits) = model.forward_loss(images, targets, Some(0.1));
        let loss: f32 = loss.into_scalar();
        assert!(loss.is_finite());
        assert_eq!(logits.dims(), [2, 4]);
    }
}
