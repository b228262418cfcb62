// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Full train + validation loop using Burn's DataLoader and Adam.
//
//   - Training runs on an AutodiffBackend so loss.backward() works
//   - model.valid() returns the model on the inner backend, which
//     also switches off dropout and stochastic depth
//   - The validation batcher must therefore use B::InnerBackend
//   - argmax(1) returns [batch, 1]; flatten to [batch] before .equal()
//
// The CLI runs this on Autodiff<Wgpu>; tests run it on
// Autodiff<NdArray>.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam,
//            Loshchilov & Hutter (2019) decoupled weight decay

use anyhow::Result;
use burn::{
    backend::{wgpu::WgpuDevice, Autodiff, Wgpu},
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::ImageBatcher, dataset::ImageDataset};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::model::{CctConfig, CctModel};

type TrainBackend = Autodiff<Wgpu>;

/// Outcome of a training run.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub epochs:     Vec<EpochMetrics>,
    /// Epoch whose checkpoint had the lowest monitored loss
    pub best_epoch: Option<usize>,
}

impl TrainReport {
    pub fn best(&self) -> Option<&EpochMetrics> {
        let best = self.best_epoch?;
        self.epochs.iter().find(|m| m.epoch == best)
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }
}

pub fn run_training(
    cfg:           &TrainConfig,
    model_cfg:     &CctConfig,
    train_dataset: ImageDataset,
    val_dataset:   ImageDataset,
    ckpt_manager:  &CheckpointManager,
    metrics:       &MetricsLogger,
) -> Result<TrainReport> {
    let device = WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop::<TrainBackend>(
        cfg, model_cfg, train_dataset, val_dataset, ckpt_manager, metrics, device,
    )
}

/// Number of rows whose argmax matches the target.
fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    predicted
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

fn mean_or_nan(sum: f64, count: usize) -> f64 {
    if count > 0 { sum / count as f64 } else { f64::NAN }
}

fn ratio(correct: usize, total: usize) -> f64 {
    if total > 0 { correct as f64 / total as f64 } else { 0.0 }
}

pub fn train_loop<B: AutodiffBackend>(
    cfg:           &TrainConfig,
    model_cfg:     &CctConfig,
    train_dataset: ImageDataset,
    val_dataset:   ImageDataset,
    ckpt_manager:  &CheckpointManager,
    metrics:       &MetricsLogger,
    device:        B::Device,
) -> Result<TrainReport> {
    model_cfg.validate()?;

    let seed = cfg.effective_seed();
    if let Some(seed) = seed {
        B::seed(seed);
    }

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: CctModel<B> = model_cfg.init(&device);
    tracing::info!(
        "Model ready: {} layers, {} tokens, {} parameters",
        model_cfg.num_transformer_layers,
        model_cfg.num_patches(),
        model.num_params(),
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    // m = β1*m + (1-β1)*g        (mean)
    // v = β2*v + (1-β2)*g²       (variance)
    // θ = θ - lr * m / (√v + ε)  (update)
    let weight_decay = (cfg.weight_decay > 0.0)
        .then(|| WeightDecayConfig::new(cfg.weight_decay as f32));
    let optim_cfg = AdamConfig::new()
        .with_epsilon(1e-8)
        .with_weight_decay(weight_decay);
    let mut optim = optim_cfg.init::<B, CctModel<B>>();

    let label_smoothing = cfg.label_smoothing();
    let num_workers     = cfg.num_workers.max(1);
    let (channels, height, width) = (
        model_cfg.in_channels,
        model_cfg.image_height,
        model_cfg.image_width,
    );

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_batcher = ImageBatcher::<B>::new(device.clone(), channels, height, width);
    let train_loader  = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(seed.unwrap_or(42))
        .num_workers(num_workers)
        .build(train_dataset);

    // ── Validation data loader (InnerBackend, no autodiff) ────────────────────
    let val_batcher = ImageBatcher::<B::InnerBackend>::new(device.clone(), channels, height, width);
    let val_loader  = DataLoaderBuilder::new(val_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(num_workers)
        .build(val_dataset);

    ckpt_manager.clear_best()?;

    let mut history   = Vec::with_capacity(cfg.epochs);
    let mut best_loss = f64::INFINITY;
    let mut best_epoch = None;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut train_batches  = 0usize;
        let mut train_correct  = 0usize;
        let mut train_seen     = 0usize;

        for batch in train_loader.iter() {
            train_seen += batch.targets.dims()[0];
            let (loss, logits) = model.forward_loss(
                batch.images,
                batch.targets.clone(),
                label_smoothing,
            );

            train_loss_sum += loss.clone().into_scalar().elem::<f64>();
            train_batches  += 1;
            train_correct  += count_correct(logits, batch.targets);

            // Backward pass + Adam update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.lr, model, grads);
        }

        // ── Validation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();

        let mut val_loss_sum = 0.0f64;
        let mut val_batches  = 0usize;
        let mut val_correct  = 0usize;
        let mut val_seen     = 0usize;

        for batch in val_loader.iter() {
            val_seen += batch.targets.dims()[0];
            let (loss, logits) = model_valid.forward_loss(
                batch.images,
                batch.targets.clone(),
                None,
            );
            val_loss_sum += loss.into_scalar().elem::<f64>();
            val_batches  += 1;
            val_correct  += count_correct(logits, batch.targets);
        }

        let m = EpochMetrics::new(
            epoch,
            mean_or_nan(train_loss_sum, train_batches),
            ratio(train_correct, train_seen),
            mean_or_nan(val_loss_sum, val_batches),
            ratio(val_correct, val_seen),
        );

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | train_acc={:.1}% | val_loss={:.4} | val_acc={:.1}%",
            epoch, cfg.epochs, m.train_loss, m.train_acc * 100.0,
            m.val_loss, m.val_acc * 100.0,
        );

        metrics.log(&m)?;
        ckpt_manager.save_model(&model, epoch)?;

        if m.is_improvement(best_loss) {
            best_loss  = m.monitored_loss();
            best_epoch = Some(epoch);
            ckpt_manager.mark_best(epoch)?;
            tracing::info!("New best checkpoint at epoch {} (loss {:.4})", epoch, best_loss);
        } else {
            tracing::info!("Checkpoint saved for epoch {}", epoch);
        }

        history.push(m);
    }

    tracing::info!("Training complete!");
    Ok(TrainReport { epochs: history, best_epoch })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use crate::data::dataset::ImageSample;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn tiny_model() -> CctConfig {
        CctConfig::new(2, 8, 8)
            .with_num_transformer_layers(1)
            .with_num_heads(2)
            .with_mlp_ratio(1.0)
            .with_embedding_dim(8)
            .with_tokenizer_kernel_size(3)
            .with_tokenizer_conv_layers(1)
    }

    fn samples(count: usize) -> Vec<ImageSample> {
        (0..count)
            .map(|i| {
                let label = i % 2;
                let value = if label == 0 { -1.0 } else { 1.0 };
                ImageSample { pixels: vec![value; 3 * 8 * 8], label }
            })
            .collect()
    }

    fn train_config(epochs: usize) -> TrainConfig {
        TrainConfig {
            batch_size:  2,
            epochs,
            lr:          1e-3,
            num_workers: 1,
            seed:        Some(7),
            ..Default::default()
        }
    }

    #[test]
    fn test_count_correct() {
        let device  = Default::default();
        let logits  = Tensor::<NdArray<f32>, 2>::from_floats([[0.1, 0.9], [0.8, 0.2], [0.3, 0.7]], &device);
        let targets = Tensor::<NdArray<f32>, 1, Int>::from_ints([1, 1, 1], &device);
        assert_eq!(count_correct(logits, targets), 2);
    }

    #[test]
    fn test_empty_averages() {
        assert!(mean_or_nan(0.0, 0).is_nan());
        assert_eq!(ratio(0, 0), 0.0);
        assert_eq!(ratio(3, 4), 0.75);
    }

    #[test]
    fn test_train_loop_writes_checkpoints_and_metrics() {
        let tmp     = tempfile::tempdir().unwrap();
        let ckpt    = CheckpointManager::new(tmp.path()).unwrap();
        let metrics = MetricsLogger::new(tmp.path()).unwrap();

        let report = train_loop::<TestBackend>(
            &train_config(2),
            &tiny_model(),
            ImageDataset::new(samples(6)),
            ImageDataset::new(samples(2)),
            &ckpt,
            &metrics,
            Default::default(),
        ).unwrap();

        assert_eq!(report.epochs.len(), 2);
        assert!(report.epochs.iter().all(|m| m.train_loss.is_finite()));
        assert!(report.epochs.iter().all(|m| m.val_loss.is_finite()));
        assert!(report.best_epoch.is_some());
        assert_eq!(ckpt.latest_epoch().unwrap(), 2);
        assert_eq!(ckpt.preferred_epoch().unwrap(), report.best_epoch.unwrap());
        assert!(tmp.path().join("model_epoch_2.mpk.gz").exists());

        let csv = std::fs::read_to_string(metrics.csv_path()).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_train_loop_without_validation_tracks_train_loss() {
        let tmp     = tempfile::tempdir().unwrap();
        let ckpt    = CheckpointManager::new(tmp.path()).unwrap();
        let metrics = MetricsLogger::new(tmp.path()).unwrap();

        let report = train_loop::<TestBackend>(
            &train_config(1),
            &tiny_model(),
            ImageDataset::new(samples(4)),
            ImageDataset::new(Vec::new()),
            &ckpt,
            &metrics,
            Default::default(),
        ).unwrap();

        let last = report.last().unwrap();
        assert!(last.val_loss.is_nan());
        assert_eq!(report.best_epoch, Some(1));
        assert_eq!(report.best().map(|m| m.epoch), Some(1));
    }

    #[test]
    fn test_train_loop_replaces_best_pointer_of_earlier_run() {
        let tmp     = tempfile::tempdir().unwrap();
        let ckpt    = CheckpointManager::new(tmp.path()).unwrap();
        let metrics = MetricsLogger::new(tmp.path()).unwrap();
        // left behind by a longer run in the same directory
        ckpt.mark_best(9).unwrap();

        let report = train_loop::<TestBackend>(
            &train_config(1),
            &tiny_model(),
            ImageDataset::new(samples(4)),
            ImageDataset::new(samples(2)),
            &ckpt,
            &metrics,
            Default::default(),
        ).unwrap();

        assert_eq!(report.best_epoch, Some(1));
        assert_eq!(ckpt.preferred_epoch().unwrap(), 1);
    }

    #[test]
    fn test_train_loop_rejects_invalid_model() {
        let tmp     = tempfile::tempdir().unwrap();
        let ckpt    = CheckpointManager::new(tmp.path()).unwrap();
        let metrics = MetricsLogger::new(tmp.path()).unwrap();

        let result = train_loop::<TestBackend>(
            &train_config(1),
            &tiny_model().with_num_heads(3),
            ImageDataset::new(samples(2)),
            ImageDataset::new(samples(2)),
            &ckpt,
            &metrics,
            Default::default(),
        );
        assert!(result.is_err());
    }
}
