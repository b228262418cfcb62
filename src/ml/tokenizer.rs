// ============================================================
// Layer 5 — Convolutional Tokenizer
// ============================================================
// Replaces the ViT patch-and-project step with a small stack of
// convolutions. Each layer:
//
//   Conv2d(k×k, stride s, padding k/2, no bias) → ReLU
//   MaxPool2d(p×p, stride ps, padding p/2)
//
// Channel widths double layer by layer up to embedding_dim.
// The final feature map [B, D, h, w] is read row by row as a
// sequence of h·w tokens: [B, h·w, D].

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::ml::settings::InitializerKind;
use crate::ml::shape::tokenizer_channels;

#[derive(Config, Debug)]
pub struct ConvTokenizerConfig {
    pub in_channels:   usize,
    pub embedding_dim: usize,
    #[config(default = 7)]
    pub kernel_size:   usize,
    #[config(default = 2)]
    pub stride:        usize,
    #[config(default = 2)]
    pub conv_layers:   usize,
    #[config(default = 3)]
    pub pool_size:     usize,
    #[config(default = 2)]
    pub pool_stride:   usize,
    #[config(default = "InitializerKind::HeNormal")]
    pub initializer:   InitializerKind,
}

impl ConvTokenizerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvTokenizer<B> {
        let widths = tokenizer_channels(self.embedding_dim, self.conv_layers);
        let pad    = self.kernel_size / 2;

        let mut in_channels = self.in_channels;
        let mut convs = Vec::with_capacity(widths.len());
        for out_channels in widths {
            let conv = Conv2dConfig::new([in_channels, out_channels], [self.kernel_size, self.kernel_size])
                .with_stride([self.stride, self.stride])
                .with_padding(PaddingConfig2d::Explicit(pad, pad))
                .with_bias(false)
                .with_initializer(self.initializer.to_initializer())
                .init(device);
            convs.push(conv);
            in_channels = out_channels;
        }

        let pool_pad = self.pool_size / 2;
        let pool = MaxPool2dConfig::new([self.pool_size, self.pool_size])
            .with_strides([self.pool_stride, self.pool_stride])
            .with_padding(PaddingConfig2d::Explicit(pool_pad, pool_pad))
            .init();

        ConvTokenizer { convs, pool }
    }
}

#[derive(Module, Debug)]
pub struct ConvTokenizer<B: Backend> {
    pub convs: Vec<Conv2d<B>>,
    pub pool:  MaxPool2d,
}

impl<B: Backend> ConvTokenizer<B> {
    /// images: [batch, channels, height, width] → tokens: [batch, h·w, embedding_dim]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let mut x = images;
        for conv in &self.convs {
            x = self.pool.forward(relu(conv.forward(x)));
        }
        // [B, D, h, w] → [B, D, h·w] → [B, h·w, D]
        x.flatten::<3>(2, 3).swap_dims(1, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};
    use crate::ml::shape::tokenizer_output_edge;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_token_count_matches_shape_bookkeeping() {
        let device = Default::default();
        let tokenizer = ConvTokenizerConfig::new(3, 16)
            .with_kernel_size(3)
            .init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 4>::ones([2, 3, 20, 12], &device);
        let tokens = tokenizer.forward(images);

        let h = tokenizer_output_edge(20, 2, 2, 2);
        let w = tokenizer_output_edge(12, 2, 2, 2);
        assert_eq!(tokens.dims(), [2, h * w, 16]);
    }

    #[test]
    fn test_channel_widths() {
        let device = Default::default();
        let tokenizer = ConvTokenizerConfig::new(1, 32)
            .with_conv_layers(3)
            .with_kernel_size(3)
            .init::<TestBackend>(&device);
        assert_eq!(tokenizer.convs.len(), 3);
        // Bias-free 3×3 convolutions: 1→8, 8→16, 16→32
        let expected = 9 * (1 * 8 + 8 * 16 + 16 * 32);
        assert_eq!(tokenizer.num_params(), expected);
    }

    #[test]
    fn test_outputs_are_non_negative() {
        // ReLU before max-pool leaves no negative activations
        let device = Default::default();
        let tokenizer = ConvTokenizerConfig::new(3, 8)
            .with_kernel_size(3)
            .with_conv_layers(1)
            .init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::random([1, 3, 8, 8], Distribution::Normal(0.0, 1.0), &device);
        let values: Vec<f32> = tokenizer.forward(images).into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| *v >= 0.0));
    }
}
