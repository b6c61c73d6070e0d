use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        interpolate::{Interpolate2d, Interpolate2dConfig, InterpolateMode},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Initializer, LeakyRelu,
        LeakyReluConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

/// Running statistics keep 80% of their previous value on every update.
const BN_MOMENTUM: f64 = 0.2;
const BN_EPSILON: f64 = 1e-3;

pub(crate) fn glorot() -> Initializer {
    Initializer::XavierUniform { gain: 1.0 }
}

pub(crate) fn batch_norm<B: Backend, const D: usize>(
    channels: usize,
    device: &B::Device,
) -> BatchNorm<B, D> {
    BatchNormConfig::new(channels)
        .with_momentum(BN_MOMENTUM)
        .with_epsilon(BN_EPSILON)
        .init(device)
}

/// Padding `(before, after)` that makes a strided convolution produce `ceil(size / stride)`
/// outputs. Odd totals put the extra row on the trailing side.
pub fn same_padding(size: usize, kernel: usize, stride: usize) -> (usize, usize) {
    let out = same_output_size(size, stride);
    let total = ((out - 1) * stride + kernel).saturating_sub(size);
    let before = total / 2;
    (before, total - before)
}

pub fn same_output_size(size: usize, stride: usize) -> usize {
    size.div_ceil(stride)
}

/// Conv2d with "same" padding that also works for even kernels.
#[derive(Module, Debug)]
pub struct SameConv2d<B: Backend> {
    conv: Conv2d<B>,
    kernel: usize,
    stride: usize,
}
impl<B: Backend> SameConv2d<B> {
    pub fn new(channels: [usize; 2], kernel: usize, stride: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new(channels, [kernel, kernel])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Valid)
            .with_initializer(glorot())
            .init(device);

        Self {
            conv,
            kernel,
            stride,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = input.dims();
        let (top, bottom) = same_padding(height, self.kernel, self.stride);
        let (left, right) = same_padding(width, self.kernel, self.stride);

        let input = if top + bottom + left + right > 0 {
            input.pad((left, right, top, bottom), 0.0)
        } else {
            input
        };

        self.conv.forward(input)
    }
}

/// Dense -> ReLU -> BatchNorm
#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    fc: Linear<B>,
    bn: BatchNorm<B, 0>,
}
impl<B: Backend> DenseBlock<B> {
    pub fn new(input: usize, output: usize, device: &B::Device) -> Self {
        let fc = LinearConfig::new(input, output)
            .with_initializer(glorot())
            .init(device);
        let bn = batch_norm(output, device);

        Self { fc, bn }
    }

    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let output = self.fc.forward(input); // [batch, output]
        let output = relu(output);
        self.bn.forward(output)
    }
}

/// Nearest x2 upsample -> conv -> ReLU -> BatchNorm
#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    upsample: Interpolate2d,
    conv: SameConv2d<B>,
    bn: BatchNorm<B, 2>,
}
impl<B: Backend> UpBlock<B> {
    pub fn new(channels: [usize; 2], device: &B::Device) -> Self {
        let upsample = Interpolate2dConfig::new()
            .with_scale_factor(Some([2.0, 2.0]))
            .with_mode(InterpolateMode::Nearest)
            .init();
        let conv = SameConv2d::new(channels, 4, 1, device);
        let bn = batch_norm(channels[1], device);

        Self { upsample, conv, bn }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let output = self.upsample.forward(input);
        let output = self.conv.forward(output);
        let output = relu(output);
        self.bn.forward(output)
    }
}

/// Spatial size a [`DownBlock`] produces for a square input of `size`.
pub fn down_output_size(size: usize, pad_trailing: bool) -> usize {
    same_output_size(size, 2) + usize::from(pad_trailing)
}

/// Strided conv -> [zero pad] -> LeakyReLU -> Dropout -> [BatchNorm]
#[derive(Module, Debug)]
pub struct DownBlock<B: Backend> {
    conv: SameConv2d<B>,
    lrelu: LeakyRelu,
    dropout: Dropout,
    bn: Option<BatchNorm<B, 2>>,
    pad_trailing: bool,
}
impl<B: Backend> DownBlock<B> {
    pub fn new(
        channels: [usize; 2],
        pad_trailing: bool,
        normalize: bool,
        device: &B::Device,
    ) -> Self {
        let conv = SameConv2d::new(channels, 4, 2, device);
        let lrelu = LeakyReluConfig::new().with_negative_slope(0.1).init();
        let dropout = DropoutConfig::new(0.25).init();
        let bn = normalize.then(|| batch_norm(channels[1], device));

        Self {
            conv,
            lrelu,
            dropout,
            bn,
            pad_trailing,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let output = self.conv.forward(input);
        let output = if self.pad_trailing {
            output.pad((0, 1, 0, 1), 0.0)
        } else {
            output
        };
        let output = self.lrelu.forward(output);
        let output = self.dropout.forward(output);

        match &self.bn {
            Some(bn) => bn.forward(output),
            None => output,
        }
    }
}
