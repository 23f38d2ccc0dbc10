//! Persisted network format: a magic/version header, then one record per
//! layer carrying its type tag, shape, activation tag, and (for weighted
//! layers) its weight/bias buffers. Every stored `f32` has its four bytes
//! written in reverse order — a cheap, deliberate corruption trip-wire: a
//! reader that forgets to un-reverse them gets garbage instead of
//! silently-plausible floats, and a genuinely corrupted file is just as
//! likely to fail this check as any other single byte.
//!
//! This is a bespoke binary format, not `serde_json`: the exact on-disk
//! layout (shuffled floats, per-kind tag bytes) doesn't map onto a
//! `Serialize` derive without fighting it, so this module writes its own
//! reader/writer directly against `std::io`. `serde`/`serde_json` remain
//! this crate's everyday (de)serialization layer for in-memory config
//! types — see `Tensor`'s own `Serialize`/`Deserialize` derives — just not
//! for the persisted network file.

use std::io::{Read, Write};

use crate::errors::{CnnError, CnnResult};
use crate::cost::CostKind;
use crate::kernels::batchnorm::BatchNormMode;
use crate::layers::{
    ActivationLayer, BatchNormLayer, ConvolutionalLayer, FullyConnectedLayer, Layer, OutputLayer, PoolingLayer,
    SoftmaxOutputLayer,
};
use crate::tensor::{Shape, Tensor};
use crate::types::ActivationKind;

const MAGIC: &[u8; 4] = b"CNNC";
const VERSION: u32 = 1;

fn activation_tag(a: ActivationKind) -> u8 {
    match a {
        ActivationKind::Identity => 0,
        ActivationKind::Sigmoid => 1,
        ActivationKind::Tanh => 2,
        ActivationKind::Relu => 3,
        ActivationKind::LeakyRelu => 4,
        ActivationKind::Elu => 5,
        ActivationKind::Softmax => 6,
    }
}

fn activation_from_tag(tag: u8) -> CnnResult<ActivationKind> {
    Ok(match tag {
        0 => ActivationKind::Identity,
        1 => ActivationKind::Sigmoid,
        2 => ActivationKind::Tanh,
        3 => ActivationKind::Relu,
        4 => ActivationKind::LeakyRelu,
        5 => ActivationKind::Elu,
        6 => ActivationKind::Softmax,
        other => return Err(CnnError::SerializationFailure(format!("unknown activation tag {other}"))),
    })
}

fn cost_tag(c: CostKind) -> u8 {
    match c {
        CostKind::Quadratic => 0,
        CostKind::CrossEntropy => 1,
        CostKind::LogLikelihood => 2,
    }
}

fn cost_from_tag(tag: u8) -> CnnResult<CostKind> {
    Ok(match tag {
        0 => CostKind::Quadratic,
        1 => CostKind::CrossEntropy,
        2 => CostKind::LogLikelihood,
        other => return Err(CnnError::SerializationFailure(format!("unknown cost tag {other}"))),
    })
}

fn bn_mode_tag(m: BatchNormMode) -> u8 {
    match m {
        BatchNormMode::Spatial => 0,
        BatchNormMode::PerActivation => 1,
    }
}

fn bn_mode_from_tag(tag: u8) -> CnnResult<BatchNormMode> {
    Ok(match tag {
        0 => BatchNormMode::Spatial,
        1 => BatchNormMode::PerActivation,
        other => return Err(CnnError::SerializationFailure(format!("unknown batch-norm mode tag {other}"))),
    })
}

fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_shape(out: &mut Vec<u8>, s: Shape) {
    for v in s.as_vec() {
        write_u32(out, v as u32);
    }
}

fn write_f32_shuffled(out: &mut Vec<u8>, v: f32) {
    let mut bytes = v.to_le_bytes();
    bytes.reverse();
    out.extend_from_slice(&bytes);
}

fn write_tensor(out: &mut Vec<u8>, t: &Tensor) {
    write_u32(out, t.shape().size() as u32);
    for &v in t.as_slice() {
        write_f32_shuffled(out, v);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> CnnResult<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(CnnError::SerializationFailure("unexpected end of file".into()));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u32(&mut self) -> CnnResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_u8(&mut self) -> CnnResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_shape(&mut self) -> CnnResult<Shape> {
        let n = self.read_u32()? as usize;
        let c = self.read_u32()? as usize;
        let h = self.read_u32()? as usize;
        let w = self.read_u32()? as usize;
        Ok(Shape::new(n, c, h, w))
    }

    fn read_f32_shuffled(&mut self) -> CnnResult<f32> {
        let bytes = self.take(4)?;
        let mut arr: [u8; 4] = bytes.try_into().unwrap();
        arr.reverse();
        Ok(f32::from_le_bytes(arr))
    }

    fn read_tensor(&mut self, shape: Shape) -> CnnResult<Tensor> {
        let len = self.read_u32()? as usize;
        if len != shape.size() {
            return Err(CnnError::SerializationFailure(format!(
                "tensor length {len} does not match declared shape {shape:?}"
            )));
        }
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(self.read_f32_shuffled()?);
        }
        Tensor::from_slice(&values, shape.n, shape.c, shape.h, shape.w)
    }
}

/// Writes a `Sequential`-style layer chain plus the cost function it was
/// trained with. DAG topologies and the `Inception` composite layer are
/// out of scope for persistence for now — see `DESIGN.md`.
pub fn save_network(writer: &mut dyn Write, layers: &[Layer], cost: CostKind) -> CnnResult<()> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    write_u32(&mut out, VERSION);
    write_u32(&mut out, layers.len() as u32);
    out.push(cost_tag(cost));

    for layer in layers {
        write_shape(&mut out, layer.input_shape());
        write_shape(&mut out, layer.output_shape());
        out.push(activation_tag(layer.activation()));

        match layer {
            Layer::FullyConnected(l) => {
                out.push(0);
                write_tensor(&mut out, &l.weights);
                write_tensor(&mut out, &l.biases);
            }
            Layer::Convolutional(l) => {
                out.push(1);
                write_tensor(&mut out, &l.weights);
                write_tensor(&mut out, &l.biases);
            }
            Layer::Pooling(_) => {
                out.push(2);
            }
            Layer::BatchNorm(l) => {
                out.push(3);
                out.push(bn_mode_tag(l.mode));
                write_tensor(&mut out, &l.gamma);
                write_tensor(&mut out, &l.beta);
                write_tensor(&mut out, &l.running_mean);
                write_tensor(&mut out, &l.running_var);
            }
            Layer::Activation(_) => {
                out.push(4);
            }
            Layer::SoftmaxOutput(_) => {
                out.push(5);
            }
            Layer::Output(_) => {
                out.push(6);
            }
            Layer::Inception(_) => {
                return Err(CnnError::SerializationFailure(
                    "Inception layers are not persistable".into(),
                ));
            }
        }
    }

    writer.write_all(&out).map_err(CnnError::from)
}

/// Reads back a layer chain and its cost function written by
/// `save_network`.
pub fn load_network(reader: &mut dyn Read) -> CnnResult<(Vec<Layer>, CostKind)> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).map_err(CnnError::from)?;
    let mut r = Reader::new(&bytes);

    let magic = r.take(4)?;
    if magic != MAGIC {
        return Err(CnnError::SerializationFailure("bad magic number".into()));
    }
    let version = r.read_u32()?;
    if version != VERSION {
        return Err(CnnError::SerializationFailure(format!("unsupported version {version}")));
    }
    let num_layers = r.read_u32()? as usize;
    let cost = cost_from_tag(r.read_u8()?)?;

    let mut layers = Vec::with_capacity(num_layers);
    for _ in 0..num_layers {
        let input_shape = r.read_shape()?;
        let output_shape = r.read_shape()?;
        let activation = activation_from_tag(r.read_u8()?)?;
        let tag = r.read_u8()?;

        let layer = match tag {
            0 => {
                let weights = r.read_tensor(Shape::new(input_shape.c, output_shape.c, 1, 1))?;
                let biases = r.read_tensor(Shape::new(1, output_shape.c, 1, 1))?;
                Layer::FullyConnected(FullyConnectedLayer {
                    input_shape,
                    output_shape,
                    activation,
                    weights,
                    biases,
                })
            }
            1 => {
                let kh = input_shape.h - output_shape.h + 1;
                let kw = input_shape.w - output_shape.w + 1;
                let weights = r.read_tensor(Shape::new(output_shape.c, input_shape.c, kh, kw))?;
                let biases = r.read_tensor(Shape::new(1, output_shape.c, 1, 1))?;
                Layer::Convolutional(ConvolutionalLayer {
                    input_shape,
                    output_shape,
                    activation,
                    weights,
                    biases,
                })
            }
            2 => Layer::Pooling(PoolingLayer {
                input_shape,
                output_shape,
                activation,
            }),
            3 => {
                let mode = bn_mode_from_tag(r.read_u8()?)?;
                let param_shape = mode.param_shape(input_shape);
                let gamma = r.read_tensor(param_shape)?;
                let beta = r.read_tensor(param_shape)?;
                let running_mean = r.read_tensor(param_shape)?;
                let running_var = r.read_tensor(param_shape)?;
                Layer::BatchNorm(BatchNormLayer::from_parts(
                    input_shape,
                    output_shape,
                    activation,
                    mode,
                    gamma,
                    beta,
                    running_mean,
                    running_var,
                ))
            }
            4 => Layer::Activation(ActivationLayer {
                input_shape,
                output_shape,
                activation,
            }),
            5 => Layer::SoftmaxOutput(SoftmaxOutputLayer {
                input_shape,
                output_shape,
            }),
            6 => Layer::Output(OutputLayer {
                input_shape,
                output_shape,
                activation,
            }),
            other => return Err(CnnError::SerializationFailure(format!("unknown layer tag {other}"))),
        };
        layers.push(layer);
    }

    Ok((layers, cost))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActivationKind;

    #[test]
    fn round_trips_a_fully_connected_chain() {
        let layer = FullyConnectedLayer::new(1, 3, 2, ActivationKind::Relu);
        let output_layer = OutputLayer::new(Shape::flat(1, 2), ActivationKind::Sigmoid);
        let layers = vec![Layer::FullyConnected(layer), Layer::Output(output_layer)];

        let mut buf = Vec::new();
        save_network(&mut buf, &layers, CostKind::Quadratic).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let (loaded, cost) = load_network(&mut cursor).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(cost, CostKind::Quadratic);
        if let (Layer::FullyConnected(a), Layer::FullyConnected(b)) = (&layers[0], &loaded[0]) {
            assert_eq!(a.weights.as_slice(), b.weights.as_slice());
        } else {
            panic!("expected fully-connected layers");
        }
    }
}
