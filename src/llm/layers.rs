//! Inference-only layers for the next-word network
//!
//! Every layer runs with batch size 1. Sequence activations are `(T, D)`,
//! final activations are `(1, D)`. Weight layouts follow the exporting
//! framework: kernels are `(in, out)` and LSTM gates are packed as
//! input, forget, candidate, output.

use super::config::{Activation, MergeMode};
use candle_core::{DType, Tensor};

pub fn activate(xs: &Tensor, activation: Activation) -> candle_core::Result<Tensor> {
    match activation {
        Activation::Linear => Ok(xs.clone()),
        Activation::Tanh => xs.tanh(),
        Activation::Sigmoid => candle_nn::ops::sigmoid(xs),
        Activation::HardSigmoid => xs.affine(0.2, 0.5)?.clamp(0f32, 1f32),
        Activation::Relu => xs.relu(),
        Activation::Softmax => candle_nn::ops::softmax_last_dim(xs),
    }
}

/// Token embedding table `(input_dim, output_dim)`
pub struct Embedding {
    pub weights: Tensor,
    pub mask_zero: bool,
}

impl Embedding {
    pub fn forward(&self, ids: &Tensor) -> candle_core::Result<Tensor> {
        self.weights.index_select(ids, 0)
    }
}

/// Single-direction LSTM
pub struct Lstm {
    pub units: usize,
    /// `(in, 4 * units)`
    pub kernel: Tensor,
    /// `(units, 4 * units)`
    pub recurrent_kernel: Tensor,
    /// `(4 * units)`
    pub bias: Tensor,
    pub activation: Activation,
    pub recurrent_activation: Activation,
}

impl Lstm {
    /// Run over `xs: (T, in)`, newest step last when `reverse` is false.
    ///
    /// Returns the per-step outputs in processing order, each `(1, units)`.
    /// Steps with a `false` mask entry keep the previous state and repeat
    /// the previous output.
    pub fn run(
        &self,
        xs: &Tensor,
        mask: Option<&[bool]>,
        reverse: bool,
    ) -> candle_core::Result<Vec<Tensor>> {
        let steps = xs.dim(0)?;
        let u = self.units;
        let projected = xs.matmul(&self.kernel)?.broadcast_add(&self.bias)?;

        let mut h = Tensor::zeros((1, u), DType::F32, xs.device())?;
        let mut c = h.clone();
        let mut outputs = Vec::with_capacity(steps);

        let order: Box<dyn Iterator<Item = usize>> = if reverse {
            Box::new((0..steps).rev())
        } else {
            Box::new(0..steps)
        };

        for t in order {
            if mask.is_some_and(|m| !m[t]) {
                outputs.push(h.clone());
                continue;
            }

            let z = projected
                .narrow(0, t, 1)?
                .add(&h.matmul(&self.recurrent_kernel)?)?;
            let i = activate(&z.narrow(1, 0, u)?, self.recurrent_activation)?;
            let f = activate(&z.narrow(1, u, u)?, self.recurrent_activation)?;
            let g = activate(&z.narrow(1, 2 * u, u)?, self.activation)?;
            let o = activate(&z.narrow(1, 3 * u, u)?, self.recurrent_activation)?;

            c = f.mul(&c)?.add(&i.mul(&g)?)?;
            h = o.mul(&activate(&c, self.activation)?)?;
            outputs.push(h.clone());
        }

        Ok(outputs)
    }
}

/// Both directions over the same input, merged per step
pub struct Bidirectional {
    pub forward: Lstm,
    pub backward: Lstm,
    pub merge: MergeMode,
}

impl Bidirectional {
    pub fn merge(&self, fwd: &Tensor, bwd: &Tensor) -> candle_core::Result<Tensor> {
        match self.merge {
            MergeMode::Concat => Tensor::cat(&[fwd, bwd], 1),
            MergeMode::Sum => fwd.add(bwd),
            MergeMode::Ave => fwd.add(bwd)?.affine(0.5, 0.0),
            MergeMode::Mul => fwd.mul(bwd),
        }
    }
}

/// Fully connected layer
pub struct Dense {
    /// `(in, units)`
    pub kernel: Tensor,
    pub bias: Option<Tensor>,
    pub activation: Activation,
}

impl Dense {
    pub fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut ys = xs.matmul(&self.kernel)?;
        if let Some(bias) = &self.bias {
            ys = ys.broadcast_add(bias)?;
        }
        activate(&ys, self.activation)
    }
}

/// Recurrent layer shared between plain and bidirectional use
pub struct Recurrent {
    pub return_sequences: bool,
    pub kind: RecurrentKind,
}

pub enum RecurrentKind {
    Single { lstm: Lstm, go_backwards: bool },
    Both(Bidirectional),
}

impl Recurrent {
    /// `xs: (T, in)` to `(T, out)` or `(1, out)`
    pub fn forward(&self, xs: &Tensor, mask: Option<&[bool]>) -> candle_core::Result<Tensor> {
        match &self.kind {
            RecurrentKind::Single { lstm, go_backwards } => {
                let outputs = lstm.run(xs, mask, *go_backwards)?;
                self.collect(outputs)
            }
            RecurrentKind::Both(bi) => {
                let fwd = bi.forward.run(xs, mask, false)?;
                let mut bwd = bi.backward.run(xs, mask, true)?;
                if self.return_sequences {
                    // align backward outputs with input time steps
                    bwd.reverse();
                    let merged = fwd
                        .iter()
                        .zip(bwd.iter())
                        .map(|(f, b)| bi.merge(f, b))
                        .collect::<candle_core::Result<Vec<_>>>()?;
                    Tensor::cat(&merged, 0)
                } else {
                    match (fwd.last(), bwd.last()) {
                        (Some(f), Some(b)) => bi.merge(f, b),
                        _ => Err(candle_core::Error::Msg("empty input sequence".into())),
                    }
                }
            }
        }
    }

    fn collect(&self, outputs: Vec<Tensor>) -> candle_core::Result<Tensor> {
        if self.return_sequences {
            Tensor::cat(&outputs, 0)
        } else {
            outputs
                .last()
                .cloned()
                .ok_or_else(|| candle_core::Error::Msg("empty input sequence".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn tensor(data: &[f32], shape: (usize, usize)) -> Tensor {
        Tensor::from_slice(data, shape, &Device::Cpu).unwrap()
    }

    fn one_unit_lstm(kernel: [f32; 4], recurrent: [f32; 4]) -> Lstm {
        Lstm {
            units: 1,
            kernel: tensor(&kernel, (1, 4)),
            recurrent_kernel: tensor(&recurrent, (1, 4)),
            bias: Tensor::zeros(4, DType::F32, &Device::Cpu).unwrap(),
            activation: Activation::Tanh,
            recurrent_activation: Activation::Sigmoid,
        }
    }

    fn scalar(t: &Tensor) -> f32 {
        t.flatten_all().unwrap().to_vec1::<f32>().unwrap()[0]
    }

    #[test]
    fn test_lstm_single_step() {
        // only the candidate gate sees the input
        let lstm = one_unit_lstm([0.0, 0.0, 1.0, 0.0], [0.0; 4]);
        let xs = tensor(&[1.0], (1, 1));
        let outputs = lstm.run(&xs, None, false).unwrap();

        // i = f = o = 0.5, g = tanh(1), c = 0.5 * g, h = 0.5 * tanh(c)
        let c = 0.5 * 1f32.tanh();
        let expected = 0.5 * c.tanh();
        assert_eq!(outputs.len(), 1);
        assert!((scalar(&outputs[0]) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_masked_steps_keep_state() {
        let lstm = one_unit_lstm([0.3, -0.2, 0.9, 0.4], [0.1, 0.2, -0.3, 0.5]);
        let padded = tensor(&[7.0, 7.0, 1.0, -1.0], (4, 1));
        let plain = tensor(&[1.0, -1.0], (2, 1));

        let masked = lstm
            .run(&padded, Some(&[false, false, true, true]), false)
            .unwrap();
        let unmasked = lstm.run(&plain, None, false).unwrap();

        let a = scalar(masked.last().unwrap());
        let b = scalar(unmasked.last().unwrap());
        assert!((a - b).abs() < 1e-6);
        // leading masked steps emit the zero initial state
        assert_eq!(scalar(&masked[0]), 0.0);
    }

    #[test]
    fn test_bidirectional_concat() {
        let layer = Recurrent {
            return_sequences: false,
            kind: RecurrentKind::Both(Bidirectional {
                forward: one_unit_lstm([0.0, 0.0, 1.0, 0.0], [0.0; 4]),
                backward: one_unit_lstm([0.0, 0.0, -1.0, 0.0], [0.0; 4]),
                merge: MergeMode::Concat,
            }),
        };
        let xs = tensor(&[1.0], (1, 1));
        let out = layer.forward(&xs, None).unwrap();
        assert_eq!(out.dims(), &[1, 2]);

        let values = out.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(values[0] > 0.0);
        assert!((values[0] + values[1]).abs() < 1e-6);
    }

    #[test]
    fn test_bidirectional_sequences_shape() {
        let layer = Recurrent {
            return_sequences: true,
            kind: RecurrentKind::Both(Bidirectional {
                forward: one_unit_lstm([0.1, 0.2, 0.3, 0.4], [0.0; 4]),
                backward: one_unit_lstm([0.4, 0.3, 0.2, 0.1], [0.0; 4]),
                merge: MergeMode::Sum,
            }),
        };
        let xs = tensor(&[1.0, 2.0, 3.0], (3, 1));
        let out = layer.forward(&xs, None).unwrap();
        assert_eq!(out.dims(), &[3, 1]);
    }

    #[test]
    fn test_dense_softmax() {
        let dense = Dense {
            kernel: tensor(&[0.0, 0.0, 0.0], (1, 3)),
            bias: Some(Tensor::from_slice(&[0.0f32, 2.0, 0.0], 3, &Device::Cpu).unwrap()),
            activation: Activation::Softmax,
        };
        let xs = tensor(&[5.0], (1, 1));
        let probs = dense.forward(&xs).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[1] > probs[0]);
        assert!((probs[0] - probs[2]).abs() < 1e-6);
    }

    #[test]
    fn test_hard_sigmoid_clamps() {
        let xs = Tensor::from_slice(&[-10.0f32, 0.0, 10.0], 3, &Device::Cpu).unwrap();
        let ys = activate(&xs, Activation::HardSigmoid).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(ys, vec![0.0, 0.5, 1.0]);
    }
}
