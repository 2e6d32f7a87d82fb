//! Neural Network inference.
//!
//! Networks are loaded from ONNX files and executed on the CPU with [`tract_onnx`].

pub mod tensor;

use std::{
    ops::{Index, RangeInclusive},
    path::Path,
    sync::Arc,
};

use anyhow::{bail, Context};
use tensor::Tensor;
use tract_onnx::prelude::{
    Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec, TypedFact, TypedOp,
};

use crate::{image::Image, resolution::Resolution};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A convolutional neural network (CNN) that operates on image data.
///
/// Like the underlying [`NeuralNetwork`], this is a cheaply [`Clone`]able handle to the underlying
/// data.
#[derive(Clone)]
pub struct Cnn {
    nn: NeuralNetwork,
    shape: CnnInputShape,
    input_res: Resolution,
    color_mapper: ColorMapper,
}

impl Cnn {
    /// Creates a CNN wrapper from a [`NeuralNetwork`].
    ///
    /// The network must have exactly one input with a shape that matches the given
    /// [`CnnInputShape`].
    pub fn new(
        nn: NeuralNetwork,
        shape: CnnInputShape,
        color_mapper: ColorMapper,
    ) -> anyhow::Result<Self> {
        let input_res = Self::get_input_res(&nn, shape)?;
        Ok(Self {
            nn,
            shape,
            input_res,
            color_mapper,
        })
    }

    fn get_input_res(nn: &NeuralNetwork, shape: CnnInputShape) -> anyhow::Result<Resolution> {
        if nn.num_inputs() != 1 {
            bail!(
                "CNN network has to take exactly 1 input, this one takes {}",
                nn.num_inputs(),
            );
        }

        input_resolution(shape, nn.inputs()[0].shape())
    }

    /// Returns the expected input image size.
    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Returns the underlying [`NeuralNetwork`].
    #[inline]
    pub fn network(&self) -> &NeuralNetwork {
        &self.nn
    }

    /// Converts an image to this network's input tensor.
    ///
    /// The image is resized to the network's input resolution. If the image's aspect ratio does
    /// not match the network's input aspect ratio, the image will be stretched.
    pub fn image_to_tensor(&self, image: &Image) -> Tensor {
        image_to_tensor(image, self.input_res, self.shape, &self.color_mapper)
    }

    /// Runs the network on an input image, returning the estimated outputs.
    pub fn estimate(&self, image: &Image) -> anyhow::Result<Outputs> {
        let tensor = self.image_to_tensor(image);
        self.nn.estimate(&Inputs::single(tensor))
    }
}

/// Computes the input image resolution of a CNN from the shape of its input tensor.
fn input_resolution(shape: CnnInputShape, tensor_shape: &[usize]) -> anyhow::Result<Resolution> {
    let (w, h) = match (shape, tensor_shape) {
        (CnnInputShape::NCHW, [1, 3, h, w]) | (CnnInputShape::NHWC, [1, h, w, 3]) => (*w, *h),
        _ => {
            bail!(
                "invalid model input shape for {:?} CNN: {:?}",
                shape,
                tensor_shape,
            );
        }
    };

    let (w, h): (u32, u32) = (w.try_into()?, h.try_into()?);
    Ok(Resolution::new(w, h))
}

fn image_to_tensor(
    image: &Image,
    input_res: Resolution,
    shape: CnnInputShape,
    mapper: &ColorMapper,
) -> Tensor {
    let resized;
    let image = if image.resolution() == input_res {
        image
    } else {
        resized = image.resize(input_res);
        &resized
    };

    let (h, w) = (input_res.height() as usize, input_res.width() as usize);
    match shape {
        CnnInputShape::NCHW => Tensor::from_array_shape_fn([1, 3, h, w], |[_, c, y, x]| {
            mapper.map(image.get(x as u32, y as u32)[c])
        }),
        CnnInputShape::NHWC => Tensor::from_array_shape_fn([1, h, w, 3], |[_, y, x, c]| {
            mapper.map(image.get(x as u32, y as u32)[c])
        }),
    }
}

/// Maps 8-bit sRGB channel values to the value range a network expects.
#[derive(Debug, Clone)]
pub struct ColorMapper {
    start: f32,
    scale: f32,
}

impl ColorMapper {
    /// Creates a color mapper that uniformly maps sRGB channel values `0..=255` to
    /// `target_range`.
    ///
    /// # Panics
    ///
    /// Panics if the target range is empty.
    pub fn linear(target_range: RangeInclusive<f32>) -> Self {
        let start = *target_range.start();
        let end = *target_range.end();
        assert!(end > start, "invalid color range {start}..={end}");

        Self {
            start,
            scale: (end - start) / 255.0,
        }
    }

    #[inline]
    fn map(&self, channel: u8) -> f32 {
        f32::from(channel) * self.scale + self.start
    }
}

/// Describes in what order a CNN expects its input image data.
///
/// - `N` is the number of images, often fixed at 1.
/// - `C` is the number of color channels, often 3 for RGB inputs.
/// - `H` and `W` are the height and width of the input, respectively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive] // shouldn't be matched on by user code
pub enum CnnInputShape {
    /// Shape is `[N, C, H, W]`.
    NCHW,
    /// Shape is `[N, H, W, C]`.
    NHWC,
}

/// A neural network that can be used for inference.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<NeuralNetworkImpl>);

struct NeuralNetworkImpl {
    inner: Model,
    inputs: Vec<NodeInfo>,
}

impl NeuralNetwork {
    /// Loads a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => bail!(
                "neural network path '{}' must have `.onnx` extension",
                path.display()
            ),
        }

        let model_data = std::fs::read(path)
            .with_context(|| format!("failed to read model file '{}'", path.display()))?;
        Self::from_onnx(&model_data)
    }

    /// Loads a pre-trained model from an in-memory ONNX file.
    ///
    /// Returns an error if the network data is malformed or uses unimplemented operations.
    pub fn from_onnx(raw: &[u8]) -> anyhow::Result<Self> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut &*raw)?
            .into_optimized()?
            .into_runnable()?;

        let graph = model.model();
        let mut inputs = Vec::new();
        for (id, outlet) in graph.input_outlets()?.iter().enumerate() {
            inputs.push(NodeInfo::new(
                graph.input_fact(id)?,
                &graph.node(outlet.node).name,
            )?);
        }
        let mut outputs = Vec::new();
        for (id, outlet) in graph.output_outlets()?.iter().enumerate() {
            outputs.push(NodeInfo::new(
                graph.output_fact(id)?,
                &graph.node(outlet.node).name,
            )?);
        }

        log::debug!(
            "loaded network with inputs {:?} and outputs {:?}",
            inputs,
            outputs
        );

        Ok(Self(Arc::new(NeuralNetworkImpl {
            inner: model,
            inputs,
        })))
    }

    /// Returns the number of input nodes of the network.
    pub fn num_inputs(&self) -> usize {
        self.0.inputs.len()
    }

    /// Returns information about the network's inputs.
    ///
    /// To perform inference, a matching input tensor has to be provided for each input.
    pub fn inputs(&self) -> &[NodeInfo] {
        &self.0.inputs
    }

    /// Runs the network on a set of inputs, returning the estimated outputs.
    #[doc(alias = "infer")]
    pub fn estimate(&self, inputs: &Inputs) -> anyhow::Result<Outputs> {
        if inputs.len() != self.num_inputs() {
            bail!(
                "network takes {} inputs, but {} were provided",
                self.num_inputs(),
                inputs.len()
            );
        }

        let mut values = TVec::new();
        for tensor in &inputs.inner {
            values.push(TValue::from_const(Arc::new(tensor.to_tract()?)));
        }

        let outputs = self.0.inner.run(values)?;
        let inner = outputs
            .iter()
            .map(|tract| Tensor::from_tract(tract))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Outputs { inner })
    }
}

/// Information about a neural network input or output node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    shape: Vec<usize>,
    name: String,
}

impl NodeInfo {
    fn new(fact: &TypedFact, name: &str) -> anyhow::Result<Self> {
        let Some(shape) = fact.shape.as_concrete() else {
            bail!("network node '{name}' has a symbolic shape, which is not supported");
        };
        Ok(Self {
            shape: shape.to_vec(),
            name: name.to_string(),
        })
    }

    /// Returns the tensor shape of this node.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the name of this node.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The result of a neural network inference pass.
///
/// This is a list of tensors corresponding to the network's output nodes.
#[derive(Debug)]
pub struct Outputs {
    inner: Vec<Tensor>,
}

impl Outputs {
    /// Returns the number of tensors in this inference output.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over the output tensors.
    pub fn iter(&self) -> std::slice::Iter<'_, Tensor> {
        self.inner.iter()
    }
}

impl Index<usize> for Outputs {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.inner[index]
    }
}

/// List of input tensors for neural network inference.
#[derive(Debug)]
pub struct Inputs {
    inner: Vec<Tensor>,
}

impl Inputs {
    /// Creates a network input from a single input tensor.
    pub fn single(tensor: Tensor) -> Self {
        Self {
            inner: vec![tensor],
        }
    }

    /// Returns the number of input tensors stored in `self`.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::image::Pixel;

    #[test]
    fn color_mapper() {
        let unit = ColorMapper::linear(0.0..=1.0);
        assert_eq!(unit.map(0), 0.0);
        assert_eq!(unit.map(255), 1.0);

        let signed = ColorMapper::linear(-1.0..=1.0);
        assert_eq!(signed.map(0), -1.0);
        assert_eq!(signed.map(255), 1.0);
    }

    #[test]
    fn input_shapes() {
        assert_eq!(
            input_resolution(CnnInputShape::NHWC, &[1, 256, 128, 3]).unwrap(),
            Resolution::new(128, 256)
        );
        assert_eq!(
            input_resolution(CnnInputShape::NCHW, &[1, 3, 64, 32]).unwrap(),
            Resolution::new(32, 64)
        );
        assert!(input_resolution(CnnInputShape::NHWC, &[1, 3, 64, 32]).is_err());
        assert!(input_resolution(CnnInputShape::NCHW, &[1, 64, 32, 3]).is_err());
        assert!(input_resolution(CnnInputShape::NHWC, &[2, 64, 32, 3]).is_err());
        assert!(input_resolution(CnnInputShape::NHWC, &[64, 32, 3]).is_err());
    }

    fn test_image() -> Image {
        // 2x1 image: red pixel on the left, blue pixel on the right
        Image::from_fn(Resolution::new(2, 1), |x, _| {
            if x == 0 {
                Pixel::from_rgb8(255, 0, 0)
            } else {
                Pixel::from_rgb8(0, 0, 255)
            }
        })
    }

    fn assert_values(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert_relative_eq!(a, e, epsilon = 1e-6);
        }
    }

    #[test]
    fn tensor_layouts() {
        let res = Resolution::new(2, 1);
        let unit = ColorMapper::linear(0.0..=1.0);

        let nhwc = image_to_tensor(&test_image(), res, CnnInputShape::NHWC, &unit);
        assert_eq!(nhwc.shape(), &[1, 1, 2, 3]);
        assert_values(nhwc.as_slice(), &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);

        let nchw = image_to_tensor(&test_image(), res, CnnInputShape::NCHW, &unit);
        assert_eq!(nchw.shape(), &[1, 3, 1, 2]);
        assert_values(nchw.as_slice(), &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        assert_relative_eq!(nchw.get(&[0, 2, 0, 1]), 1.0, epsilon = 1e-6);
        assert_relative_eq!(nchw.get(&[0, 0, 0, 1]), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn tensor_resizes_and_maps_colors() {
        let signed = ColorMapper::linear(-1.0..=1.0);
        let tensor = image_to_tensor(
            &test_image(),
            Resolution::new(4, 2),
            CnnInputShape::NHWC,
            &signed,
        );
        assert_eq!(tensor.shape(), &[1, 2, 4, 3]);
        // left half red, right half blue
        assert_relative_eq!(tensor.get(&[0, 1, 1, 0]), 1.0, epsilon = 1e-6);
        assert_relative_eq!(tensor.get(&[0, 1, 1, 2]), -1.0, epsilon = 1e-6);
        assert_relative_eq!(tensor.get(&[0, 0, 3, 0]), -1.0, epsilon = 1e-6);
        assert_relative_eq!(tensor.get(&[0, 0, 3, 2]), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn load_requires_onnx_extension() {
        let err = NeuralNetwork::load("model.tflite").err().unwrap();
        assert!(err.to_string().contains("`.onnx`"), "{err}");
    }

    #[test]
    fn from_onnx_rejects_garbage() {
        assert!(NeuralNetwork::from_onnx(b"definitely not a protobuf model").is_err());
    }
}
