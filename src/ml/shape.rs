// ============================================================
// Layer 5 — Tokenizer Shape Bookkeeping
// ============================================================
// The learnable positional embedding has one row per token, so
// its size must be known before the first forward pass.
//
// Every tokenizer layer is a strided convolution followed by a
// strided max-pool, both padded with kernel/2 on each side.
// For odd kernels that gives the "same" output size:
//
//   out = ceil(in / stride)
//
// Example (224×224 input, conv stride 2, pool stride 2, 2 layers):
//   224 → 112 → 56   (layer 1)
//    56 →  28 → 14   (layer 2)
//   14 × 14 = 196 tokens

/// Ceiling division for positive integers.
pub fn ceil_div(value: usize, divisor: usize) -> usize {
    (value + divisor - 1) / divisor
}

/// Edge length of the token grid after `conv_layers` tokenizer layers.
///
/// Zero layers leave the edge unchanged.
pub fn tokenizer_output_edge(
    dim:          usize,
    conv_stride:  usize,
    pool_stride:  usize,
    conv_layers:  usize,
) -> usize {
    (0..conv_layers).fold(dim, |edge, _| {
        let conv_out = ceil_div(edge, conv_stride);
        ceil_div(conv_out, pool_stride)
    })
}

/// Output channels of each tokenizer convolution.
///
/// Widths double layer by layer and the last one always equals
/// `embedding_dim`, e.g. `(384, 2) → [192, 384]`.
pub fn tokenizer_channels(embedding_dim: usize, conv_layers: usize) -> Vec<usize> {
    (0..conv_layers)
        .rev()
        .map(|i| embedding_dim >> i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil_div() {
        assert_eq!(ceil_div(224, 2), 112);
        assert_eq!(ceil_div(7, 2), 4);
        assert_eq!(ceil_div(1, 2), 1);
        assert_eq!(ceil_div(9, 3), 3);
    }

    #[test]
    fn test_imagenet_edge_with_two_layers() {
        assert_eq!(tokenizer_output_edge(224, 2, 2, 2), 14);
    }

    #[test]
    fn test_odd_sizes_round_up() {
        // 33 → 17 → 9 → 5 → 3
        assert_eq!(tokenizer_output_edge(33, 2, 2, 2), 3);
    }

    #[test]
    fn test_stride_one_convolution() {
        // CCT-7/3x1 on CIFAR: 32 → 32 → 16
        assert_eq!(tokenizer_output_edge(32, 1, 2, 1), 16);
    }

    #[test]
    fn test_zero_layers_keeps_dim() {
        assert_eq!(tokenizer_output_edge(64, 2, 2, 0), 64);
    }

    #[test]
    fn test_tokenizer_channels() {
        assert_eq!(tokenizer_channels(384, 2), vec![192, 384]);
        assert_eq!(tokenizer_channels(256, 1), vec![256]);
        assert_eq!(tokenizer_channels(128, 3), vec![32, 64, 128]);
    }
}
