//! # CNN Relation Classifier
//!
//! Convolution over word and distance embeddings, max-pooled over time and
//! joined with the two entity word vectors before a linear output layer.
//!
//! Parameters live in one [`SharedParams`]; [`CnnModel::training`] and
//! [`CnnModel::inference`] are two views over the same variables, so an
//! optimizer step through the training view is immediately visible to the
//! inference view.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::optim::{AdamW, Optimizer, ParamsAdamW};
use candle_nn::{Conv1d, Conv1dConfig, Embedding, Init, Linear, Module, VarBuilder, VarMap};
use tracing::debug;

use crate::batch::BatchInputs;
use crate::config::Config;
use crate::embedding::EmbeddingMatrix;
use crate::error::{RelextError, Result};
use crate::model::{RelationModel, StepOutput};

const WORD_EMBEDDING: &str = "word_embedding";

/// Hyperparameters of the network.
#[derive(Debug, Clone, PartialEq)]
pub struct CnnConfig {
    pub vocab_size: usize,
    pub embedding_dim: usize,
    pub num_distances: usize,
    pub pos_embedding_dim: usize,
    pub num_filters: usize,
    pub window_size: usize,
    pub num_relations: usize,
    pub dropout: f32,
    pub l2_lambda: f64,
    pub learning_rate: f64,
}

impl CnnConfig {
    pub fn from_config(config: &Config, vocab_size: usize) -> Self {
        Self {
            vocab_size,
            embedding_dim: config.embedding_dim,
            num_distances: config.num_distances(),
            pos_embedding_dim: config.pos_embedding_dim,
            num_filters: config.num_filters,
            window_size: config.window_size,
            num_relations: config.num_relations,
            dropout: config.dropout,
            l2_lambda: config.l2_lambda,
            learning_rate: config.learning_rate,
        }
    }

    fn conv_channels(&self) -> usize {
        self.embedding_dim + 2 * self.pos_embedding_dim
    }
}

/// The trainable variables shared by every view of the model.
#[derive(Clone)]
pub struct SharedParams {
    varmap: VarMap,
    device: Device,
}

impl SharedParams {
    /// Create the parameter set with the word embedding table initialised
    /// from `matrix`. The remaining variables are created on first use.
    pub fn with_embeddings(matrix: &EmbeddingMatrix, device: Device) -> Result<Self> {
        let mut varmap = VarMap::new();
        let shape = (matrix.rows(), matrix.dim());
        VarBuilder::from_varmap(&varmap, DType::F32, &device)
            .pp(WORD_EMBEDDING)
            .get_with_hints(shape, "weight", Init::Const(0.0))?;

        let init = Tensor::from_slice(matrix.as_slice(), shape, &device)?;
        varmap.set_one(format!("{WORD_EMBEDDING}.weight"), &init)?;

        Ok(Self { varmap, device })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    fn var_builder(&self) -> VarBuilder<'_> {
        VarBuilder::from_varmap(&self.varmap, DType::F32, &self.device)
    }

    /// Total number of scalar parameters.
    pub fn num_parameters(&self) -> usize {
        self.varmap
            .all_vars()
            .iter()
            .map(|v| v.as_tensor().elem_count())
            .sum()
    }

    /// Write every variable to a safetensors file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.varmap
            .save(path.as_ref())
            .map_err(|e| RelextError::Checkpoint(e.to_string()))
    }

    /// Overwrite every variable from a safetensors file. All views must
    /// already be built so that their variables exist.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut varmap = self.varmap.clone();
        varmap
            .load(path.as_ref())
            .map_err(|e| RelextError::Checkpoint(e.to_string()))
    }
}

struct CnnNet {
    word_emb: Embedding,
    dist1_emb: Embedding,
    dist2_emb: Embedding,
    conv: Conv1d,
    output: Linear,
    device: Device,
}

impl CnnNet {
    fn load(vb: VarBuilder, cfg: &CnnConfig, device: &Device) -> candle_core::Result<Self> {
        let word_weight = vb
            .pp(WORD_EMBEDDING)
            .get((cfg.vocab_size, cfg.embedding_dim), "weight")?;
        let word_emb = Embedding::new(word_weight, cfg.embedding_dim);

        let dist1_emb =
            candle_nn::embedding(cfg.num_distances, cfg.pos_embedding_dim, vb.pp("dist1_embedding"))?;
        let dist2_emb =
            candle_nn::embedding(cfg.num_distances, cfg.pos_embedding_dim, vb.pp("dist2_embedding"))?;

        let conv_cfg = Conv1dConfig {
            padding: cfg.window_size / 2,
            ..Default::default()
        };
        let conv = candle_nn::conv1d(
            cfg.conv_channels(),
            cfg.num_filters,
            cfg.window_size,
            conv_cfg,
            vb.pp("conv"),
        )?;

        let output = candle_nn::linear(
            cfg.num_filters + 2 * cfg.embedding_dim,
            cfg.num_relations,
            vb.pp("output"),
        )?;

        Ok(Self {
            word_emb,
            dist1_emb,
            dist2_emb,
            conv,
            output,
            device: device.clone(),
        })
    }

    /// Logits of shape `(batch, num_relations)`.
    fn forward(&self, inputs: &BatchInputs, dropout: Option<f32>) -> candle_core::Result<Tensor> {
        let (b, l) = (inputs.batch_size, inputs.seq_len);

        let ids = Tensor::from_slice(&inputs.sentence_ids, (b, l), &self.device)?;
        let d1 = Tensor::from_slice(&inputs.distance1, (b, l), &self.device)?;
        let d2 = Tensor::from_slice(&inputs.distance2, (b, l), &self.device)?;

        let words = self.word_emb.forward(&ids)?;
        let p1 = self.dist1_emb.forward(&d1)?;
        let p2 = self.dist2_emb.forward(&d2)?;

        // (b, l, channels) -> (b, channels, l)
        let x = Tensor::cat(&[&words, &p1, &p2], 2)?
            .transpose(1, 2)?
            .contiguous()?;
        let pooled = self.conv.forward(&x)?.tanh()?.max(2)?;

        let (h1, h2) = entity_heads(inputs);
        let e1 = self
            .word_emb
            .forward(&Tensor::from_vec(h1, b, &self.device)?)?;
        let e2 = self
            .word_emb
            .forward(&Tensor::from_vec(h2, b, &self.device)?)?;

        let mut features = Tensor::cat(&[&pooled, &e1, &e2], 1)?;
        if let Some(p) = dropout.filter(|&p| p > 0.0) {
            features = candle_nn::ops::dropout(&features, p)?;
        }

        self.output.forward(&features)
    }

    fn l2_penalty(&self) -> candle_core::Result<Tensor> {
        self.output.weight().sqr()?.sum_all()
    }
}

/// Word id at each entity position, clamped into the sequence.
fn entity_heads(inputs: &BatchInputs) -> (Vec<u32>, Vec<u32>) {
    let last = inputs.seq_len.saturating_sub(1);
    let pick = |row: usize, pos: u32| {
        let col = (pos as usize).min(last);
        inputs.sentence_ids[row * inputs.seq_len + col]
    };

    (0..inputs.batch_size)
        .map(|row| {
            (
                pick(row, inputs.entity1_pos[row]),
                pick(row, inputs.entity2_pos[row]),
            )
        })
        .unzip()
}

/// One view over [`SharedParams`]. Only the training view carries an
/// optimizer and applies dropout.
pub struct CnnModel {
    net: CnnNet,
    optimizer: Option<AdamW>,
    dropout: f32,
    l2_lambda: f64,
    global_step: usize,
}

impl CnnModel {
    /// Training view: dropout enabled, AdamW over every shared variable.
    pub fn training(params: &SharedParams, cfg: &CnnConfig) -> Result<Self> {
        let net = CnnNet::load(params.var_builder(), cfg, params.device())?;
        let adam = ParamsAdamW {
            lr: cfg.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let optimizer = AdamW::new(params.varmap.all_vars(), adam)?;
        debug!(
            "training view built over {} parameters",
            params.num_parameters()
        );

        Ok(Self {
            net,
            optimizer: Some(optimizer),
            dropout: cfg.dropout,
            l2_lambda: cfg.l2_lambda,
            global_step: 0,
        })
    }

    /// Inference view: no dropout, no optimizer.
    pub fn inference(params: &SharedParams, cfg: &CnnConfig) -> Result<Self> {
        let net = CnnNet::load(params.var_builder(), cfg, params.device())?;
        Ok(Self {
            net,
            optimizer: None,
            dropout: 0.0,
            l2_lambda: cfg.l2_lambda,
            global_step: 0,
        })
    }

    /// Optimization steps taken through this view.
    pub fn global_step(&self) -> usize {
        self.global_step
    }

    fn loss(&self, logits: &Tensor, labels: &Tensor) -> candle_core::Result<Tensor> {
        let ce = candle_nn::loss::cross_entropy(logits, labels)?;
        if self.l2_lambda > 0.0 {
            ce + self.net.l2_penalty()?.affine(self.l2_lambda, 0.0)?
        } else {
            Ok(ce)
        }
    }
}

impl RelationModel for CnnModel {
    fn predict(&self, inputs: &BatchInputs) -> Result<StepOutput> {
        let logits = self.net.forward(inputs, None)?;
        let predictions = logits.argmax(1)?.to_vec1::<u32>()?;
        Ok(StepOutput::new(predictions, &inputs.label, None))
    }

    fn train_step(&mut self, inputs: &BatchInputs) -> Result<StepOutput> {
        if self.optimizer.is_none() {
            return Err(RelextError::ModelInvocation(
                "inference view cannot run a training step".into(),
            ));
        }

        let labels = Tensor::from_slice(&inputs.label, inputs.batch_size, &self.net.device)?;
        let logits = self.net.forward(inputs, Some(self.dropout))?;
        let loss = self.loss(&logits, &labels)?;

        if let Some(optimizer) = self.optimizer.as_mut() {
            optimizer.backward_step(&loss)?;
        }
        self.global_step += 1;

        let predictions = logits.argmax(1)?.to_vec1::<u32>()?;
        let loss = loss.to_scalar::<f32>()?;
        Ok(StepOutput::new(predictions, &inputs.label, Some(loss)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchIter;
    use crate::vectorize::{Dataset, Record};

    fn tiny_config() -> CnnConfig {
        CnnConfig {
            vocab_size: 6,
            embedding_dim: 4,
            num_distances: 7,
            pos_embedding_dim: 2,
            num_filters: 8,
            window_size: 3,
            num_relations: 2,
            dropout: 0.0,
            l2_lambda: 0.0,
            learning_rate: 0.05,
        }
    }

    fn tiny_params(cfg: &CnnConfig) -> SharedParams {
        let sentence: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let vocab = crate::vocab::Vocabulary::build(std::iter::once(&sentence));
        let table = crate::embedding::PretrainedTable::new(cfg.embedding_dim);
        let (matrix, _) = crate::embedding::build_matrix(
            &vocab,
            &table,
            cfg.embedding_dim,
            &mut oorandom::Rand32::new(5),
        )
        .unwrap();
        SharedParams::with_embeddings(&matrix, Device::Cpu).unwrap()
    }

    fn tiny_dataset() -> Dataset {
        // label 0 when the first token is 2, label 1 when it is 3
        let records = (0..8)
            .map(|i| {
                let first = if i % 2 == 0 { 2 } else { 3 };
                Record {
                    sentence_ids: vec![first, 4, 5, 0],
                    relation: (i % 2) as u32,
                    e1: 0,
                    e2: 2,
                    dist1: vec![3, 4, 5, 6],
                    dist2: vec![1, 2, 3, 4],
                }
            })
            .collect();
        Dataset::new(records, 4)
    }

    #[test]
    fn test_predict_shapes() {
        let cfg = tiny_config();
        let params = tiny_params(&cfg);
        let model = CnnModel::inference(&params, &cfg).unwrap();

        let data = tiny_dataset();
        let batch = BatchIter::sequential(&data, 3).next().unwrap();
        let out = model.predict(&batch.inputs()).unwrap();

        assert_eq!(out.predictions.len(), 3);
        assert!(out.predictions.iter().all(|&p| p < 2));
        assert!(out.loss.is_none());
    }

    #[test]
    fn test_embedding_initialised_from_matrix() {
        let cfg = tiny_config();
        let params = tiny_params(&cfg);
        let model = CnnModel::inference(&params, &cfg).unwrap();

        let pad = model
            .net
            .word_emb
            .embeddings()
            .get(0)
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        assert_eq!(pad, vec![0.0; 4]);
    }

    #[test]
    fn test_inference_view_cannot_train() {
        let cfg = tiny_config();
        let params = tiny_params(&cfg);
        let mut model = CnnModel::inference(&params, &cfg).unwrap();
        let data = tiny_dataset();
        let batch = BatchIter::sequential(&data, 2).next().unwrap();

        assert!(matches!(
            model.train_step(&batch.inputs()),
            Err(RelextError::ModelInvocation(_))
        ));
    }

    #[test]
    fn test_training_updates_shared_view() {
        let cfg = tiny_config();
        let params = tiny_params(&cfg);
        let mut train = CnnModel::training(&params, &cfg).unwrap();
        let eval = CnnModel::inference(&params, &cfg).unwrap();

        let before = eval.net.output.weight().to_vec2::<f32>().unwrap();

        let data = tiny_dataset();
        let inputs = BatchIter::sequential(&data, 8).next().unwrap().inputs();
        let first = train.train_step(&inputs).unwrap().loss.unwrap();
        for _ in 0..60 {
            train.train_step(&inputs).unwrap();
        }
        let last = train.train_step(&inputs).unwrap().loss.unwrap();

        let after = eval.net.output.weight().to_vec2::<f32>().unwrap();
        assert_ne!(before, after);
        assert!(last < first, "loss did not decrease: {first} -> {last}");
        assert_eq!(train.global_step(), 62);
        assert_eq!(eval.predict(&inputs).unwrap().correct, 8);
    }

    #[test]
    fn test_checkpoint_roundtrip_restores_weights() {
        let cfg = tiny_config();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");

        let params = tiny_params(&cfg);
        let mut train = CnnModel::training(&params, &cfg).unwrap();
        let data = tiny_dataset();
        let inputs = BatchIter::sequential(&data, 8).next().unwrap().inputs();
        train.train_step(&inputs).unwrap();
        params.save(&path).unwrap();
        let saved = train.net.output.weight().to_vec2::<f32>().unwrap();

        let restored = tiny_params(&cfg);
        let eval = CnnModel::inference(&restored, &cfg).unwrap();
        restored.load(&path).unwrap();
        assert_eq!(eval.net.output.weight().to_vec2::<f32>().unwrap(), saved);
    }

    #[test]
    fn test_entity_heads_clamped() {
        let inputs = BatchInputs {
            batch_size: 1,
            seq_len: 3,
            sentence_ids: vec![7, 8, 9],
            entity1_pos: vec![1],
            entity2_pos: vec![10],
            distance1: vec![0; 3],
            distance2: vec![0; 3],
            label: vec![0],
        };
        assert_eq!(entity_heads(&inputs), (vec![8], vec![9]));
    }
}
