//! Label encoders that look labels up with tensor equality alone.
//!
//! Strings are packed into fixed-width buffers of little-endian `u32` words,
//! so a string lookup becomes a word-wise integer comparison against the
//! packed vocabulary followed by an AND across the word axis.

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use ndarray::Array2;
use crate::backend::candle::TensorGraph;
use crate::backend::GraphOutput;
use crate::error::{Error, Result};
use crate::tensor::constant::WORD_BYTES;
use crate::tensor::HostArray;

/// `None` when `value` does not fit in `words` or contains a NUL byte, which
/// would be indistinguishable from padding.
fn pack_words(value: &str, words: usize) -> Option<Vec<u32>> {
    let bytes = value.as_bytes();
    if bytes.len() > words * WORD_BYTES || bytes.contains(&0) {
        return None;
    }
    let mut padded = vec![0u8; words * WORD_BYTES];
    padded[..bytes.len()].copy_from_slice(bytes);
    Some(
        padded
            .chunks_exact(WORD_BYTES)
            .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
            .collect(),
    )
}

fn unpack_words(words: &[u32]) -> String {
    let mut bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn no_classes() -> Error {
    Error::Config("a label encoder needs at least one class".to_string())
}

/// Maps strings to their index in the sorted, de-duplicated vocabulary.
#[derive(Debug)]
pub struct StringLabelEncoder {
    vocabulary: Vec<String>,
    words: usize,
    /// `(1, vocabulary, words)` packed vocabulary.
    classes: Tensor,
}

impl StringLabelEncoder {
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let mut vocabulary: Vec<String> = labels.iter().map(|label| label.as_ref().to_string()).collect();
        if let Some(label) = vocabulary.iter().find(|label| label.contains('\0')) {
            return Err(Error::Config(format!("label {label:?} contains a NUL byte")));
        }
        vocabulary.sort();
        vocabulary.dedup();

        let longest = vocabulary.iter().map(String::len).max().ok_or_else(no_classes)?;
        let words = longest.div_ceil(WORD_BYTES).max(1);
        let mut packed = Vec::with_capacity(vocabulary.len() * words);
        for label in &vocabulary {
            packed.extend(pack_words(label, words).ok_or_else(no_classes)?);
        }
        let classes = Tensor::from_vec(packed, (1, vocabulary.len(), words), &Device::Cpu)?;

        Ok(Self { vocabulary, words, classes })
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Number of `u32` words every label is packed into.
    pub fn word_count(&self) -> usize {
        self.words
    }

    /// Pack query strings into the `(N, word_count)` layout the encoder consumes.
    ///
    /// A query longer than the packed width, or containing a NUL byte, cannot
    /// be in the vocabulary.
    pub fn pack<S: AsRef<str>>(&self, values: &[S]) -> Result<HostArray> {
        let mut flat = Vec::with_capacity(values.len() * self.words);
        for (row, value) in values.iter().enumerate() {
            let value = value.as_ref();
            flat.extend(pack_words(value, self.words).ok_or_else(|| self.miss(row, value.to_string()))?);
        }
        Ok(HostArray::from(Array2::from_shape_vec((values.len(), self.words), flat)?))
    }

    fn miss(&self, row: usize, value: String) -> Error {
        Error::VocabularyMiss { row, value, vocabulary: self.vocabulary.clone() }
    }
}

#[async_trait]
impl TensorGraph for StringLabelEncoder {
    async fn forward(&self, inputs: Vec<Tensor>) -> Result<GraphOutput<Tensor>> {
        let x = inputs
            .first()
            .ok_or_else(|| Error::shape("label encoder inputs", 1, 0))?
            .to_dtype(DType::U32)?;
        let rows = x.elem_count() / self.words;
        let query = x.reshape((rows, 1, self.words))?;

        // a row matches a label only if every word is equal
        let matches = query.broadcast_eq(&self.classes)?.min(2)?;
        let hits = matches.to_dtype(DType::U32)?.sum(1)?.to_vec1::<u32>()?;
        if let Some(row) = hits.iter().position(|hit| *hit == 0) {
            let words = query.get(row)?.flatten_all()?.to_vec1::<u32>()?;
            return Err(self.miss(row, unpack_words(&words)));
        }

        Ok(GraphOutput::Single(matches.argmax(1)?.to_dtype(DType::I64)?))
    }
}

/// Maps integer labels to the position of the first equal class.
///
/// Queries are compared as `f64`, so a fractional query never matches.
#[derive(Debug)]
pub struct NumericLabelEncoder {
    classes: Vec<i64>,
    /// `(1, classes)` as `f64`
    check: Tensor,
}

impl NumericLabelEncoder {
    /// `classes` keep their given order.
    pub fn fit(classes: &[i64]) -> Result<Self> {
        if classes.is_empty() {
            return Err(no_classes());
        }
        let values = classes.iter().map(|class| *class as f64).collect::<Vec<_>>();
        let check = Tensor::from_vec(values, (1, classes.len()), &Device::Cpu)?;
        Ok(Self { classes: classes.to_vec(), check })
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }
}

#[async_trait]
impl TensorGraph for NumericLabelEncoder {
    async fn forward(&self, inputs: Vec<Tensor>) -> Result<GraphOutput<Tensor>> {
        let x = inputs
            .first()
            .ok_or_else(|| Error::shape("label encoder inputs", 1, 0))?
            .to_dtype(DType::F64)?;
        let query = x.reshape((x.elem_count(), 1))?;

        let matches = query.broadcast_eq(&self.check)?;
        let hits = matches.to_dtype(DType::U32)?.sum(1)?.to_vec1::<u32>()?;
        if let Some(row) = hits.iter().position(|hit| *hit == 0) {
            let value = query.get(row)?.flatten_all()?.to_vec1::<f64>()?;
            return Err(Error::VocabularyMiss {
                row,
                value: value.iter().map(f64::to_string).collect::<Vec<_>>().join(", "),
                vocabulary: self.classes.iter().map(i64::to_string).collect(),
            });
        }

        Ok(GraphOutput::Single(matches.argmax(1)?.to_dtype(DType::I64)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use crate::backend::candle::CandleAdapter;
    use crate::config::{ContainerConfig, ExtraConfig};
    use crate::container::{Container, Transformer, Transforms};
    use crate::tensor::Inputs;

    const CITIES: [&str; 5] = ["tokyo", "paris", "amsterdam", "milan", "paris"];

    fn string_encoder(config: ContainerConfig) -> Container<CandleAdapter<StringLabelEncoder>, Transformer> {
        let encoder = StringLabelEncoder::fit(&CITIES).unwrap();
        Container::new(encoder, config, ExtraConfig::new()).unwrap()
    }

    #[test]
    fn test_fit_sorts_and_pads() {
        let encoder = StringLabelEncoder::fit(&CITIES).unwrap();

        assert_eq!(encoder.vocabulary(), ["amsterdam", "milan", "paris", "tokyo"]);
        assert_eq!(encoder.word_count(), 3);
        assert!(StringLabelEncoder::fit::<&str>(&[]).is_err());
    }

    #[test]
    fn test_pack_round_trip() {
        let encoder = StringLabelEncoder::fit(&CITIES).unwrap();
        let packed = encoder.pack(&["milan"]).unwrap();
        let words: Vec<u32> = packed.as_u32().unwrap().iter().copied().collect();

        assert_eq!(packed.shape(), &[1, 3]);
        assert_eq!(unpack_words(&words), "milan");
    }

    #[tokio::test]
    async fn test_lookup_paris() {
        let container = string_encoder(ContainerConfig::new());
        let query = container.adapter().graph().pack(&["paris"]).unwrap();

        let output = container.transform(Inputs::single(query)).await.unwrap();

        assert_eq!(output, HostArray::from(arr2(&[[2i64]])));
    }

    #[tokio::test]
    async fn test_every_label_maps_to_its_index_in_batches() {
        let container = string_encoder(ContainerConfig::new().with_batch_size(3));
        let queries = ["tokyo", "amsterdam", "paris", "milan", "tokyo"];
        let packed = container.adapter().graph().pack(&queries).unwrap();

        let output = container.transform(Inputs::single(packed)).await.unwrap();

        assert_eq!(output, HostArray::from(arr2(&[[3i64], [0], [2], [1], [3]])));
    }

    #[tokio::test]
    async fn test_unseen_label_is_a_miss() {
        let container = string_encoder(ContainerConfig::new());
        let packed = container.adapter().graph().pack(&["milan", "rome"]).unwrap();

        match container.transform(Inputs::single(packed)).await {
            Err(Error::VocabularyMiss { row, value, vocabulary }) => {
                assert_eq!(row, 1);
                assert_eq!(value, "rome");
                assert_eq!(vocabulary.len(), 4);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_overlong_query_is_a_miss() {
        let encoder = StringLabelEncoder::fit(&CITIES).unwrap();

        assert!(encoder.pack(&["buenos aires"]).is_ok());
        match encoder.pack(&["paris", "buenos aires!"]) {
            Err(Error::VocabularyMiss { row, value, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(value, "buenos aires!");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_nul_bytes_rejected() {
        assert!(matches!(StringLabelEncoder::fit(&["a", "a\0"]), Err(Error::Config(_))));

        let encoder = StringLabelEncoder::fit(&["a", "b"]).unwrap();
        match encoder.pack(&["b", "a\0"]) {
            Err(Error::VocabularyMiss { row, value, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(value, "a\0");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_numeric_lookup() {
        let encoder = NumericLabelEncoder::fit(&[0, 1, 2]).unwrap();
        let container: Container<CandleAdapter<NumericLabelEncoder>, Transformer> =
            Container::new(encoder, ContainerConfig::new(), ExtraConfig::new()).unwrap();

        let output = container.transform(Inputs::single(arr2(&[[1i64], [0], [2]]))).await.unwrap();

        assert_eq!(output, HostArray::from(arr2(&[[1i64], [0], [2]])));
    }

    #[tokio::test]
    async fn test_numeric_unseen_label_is_a_miss() {
        let encoder = NumericLabelEncoder::fit(&[4, 8]).unwrap();
        let container: Container<CandleAdapter<NumericLabelEncoder>, Transformer> =
            Container::new(encoder, ContainerConfig::new(), ExtraConfig::new()).unwrap();

        match container.transform(Inputs::single(arr2(&[[8i64], [5]]))).await {
            Err(Error::VocabularyMiss { row, vocabulary, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(vocabulary, ["4", "8"]);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_numeric_fractional_query_is_a_miss() {
        let encoder = NumericLabelEncoder::fit(&[0, 1, 2]).unwrap();
        let container: Container<CandleAdapter<NumericLabelEncoder>, Transformer> =
            Container::new(encoder, ContainerConfig::new(), ExtraConfig::new()).unwrap();

        match container.transform(Inputs::single(arr2(&[[1.5f32], [0.0]]))).await {
            Err(Error::VocabularyMiss { row, value, .. }) => {
                assert_eq!(row, 0);
                assert_eq!(value, "1.5");
            }
            other => panic!("unexpected result {other:?}"),
        }

        let exact = container.transform(Inputs::single(arr2(&[[2.0f32], [0.0]]))).await.unwrap();
        assert_eq!(exact, HostArray::from(arr2(&[[2i64], [0]])));
    }
}
