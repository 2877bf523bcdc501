use crate::error::HmmError;
use std::collections::BTreeMap;

/// A single training sequence: `length()` frames of `dimension` values,
/// stored row-major.
///
/// A bimodal phrase splits each frame into an input segment
/// `[0, dimension_input)` and an output segment `[dimension_input, dimension)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Phrase {
    dimension: usize,
    dimension_input: Option<usize>,
    data: Vec<f64>,
}

impl Phrase {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            dimension_input: None,
            data: Vec::new(),
        }
    }

    pub fn bimodal(dimension: usize, dimension_input: usize) -> Result<Self, HmmError> {
        if dimension_input == 0 || dimension_input >= dimension {
            return Err(HmmError::InvalidInputDimension {
                input: dimension_input,
                total: dimension,
            });
        }
        Ok(Self {
            dimension,
            dimension_input: Some(dimension_input),
            data: Vec::new(),
        })
    }

    /// Builds a unimodal phrase from a list of frames.
    pub fn from_frames(dimension: usize, frames: &[Vec<f64>]) -> Result<Self, HmmError> {
        let mut phrase = Self::new(dimension);
        for frame in frames {
            phrase.push_frame(frame)?;
        }
        Ok(phrase)
    }

    pub fn push_frame(&mut self, frame: &[f64]) -> Result<(), HmmError> {
        if frame.len() != self.dimension {
            return Err(HmmError::DimensionMismatch {
                expected: self.dimension,
                actual: frame.len(),
            });
        }
        self.data.extend_from_slice(frame);
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn dimension_input(&self) -> Option<usize> {
        self.dimension_input
    }

    pub fn is_bimodal(&self) -> bool {
        self.dimension_input.is_some()
    }

    pub fn length(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Value of dimension `d` at time `t`.
    pub fn at(&self, t: usize, d: usize) -> f64 {
        self.data[t * self.dimension + d]
    }

    pub fn frame(&self, t: usize) -> &[f64] {
        &self.data[t * self.dimension..(t + 1) * self.dimension]
    }

    /// Input segment of frame `t` (the whole frame when unimodal).
    pub fn input(&self, t: usize) -> &[f64] {
        let split = self.dimension_input.unwrap_or(self.dimension);
        &self.frame(t)[..split]
    }

    /// Output segment of frame `t` (empty when unimodal).
    pub fn output(&self, t: usize) -> &[f64] {
        let split = self.dimension_input.unwrap_or(self.dimension);
        &self.frame(t)[split..]
    }
}

/// Indexed collection of phrases sharing one layout.
///
/// Iteration is ordered by phrase index.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    dimension: usize,
    dimension_input: Option<usize>,
    phrases: BTreeMap<usize, Phrase>,
}

impl TrainingSet {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            dimension_input: None,
            phrases: BTreeMap::new(),
        }
    }

    pub fn bimodal(dimension: usize, dimension_input: usize) -> Result<Self, HmmError> {
        if dimension_input == 0 || dimension_input >= dimension {
            return Err(HmmError::InvalidInputDimension {
                input: dimension_input,
                total: dimension,
            });
        }
        Ok(Self {
            dimension,
            dimension_input: Some(dimension_input),
            phrases: BTreeMap::new(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn dimension_input(&self) -> Option<usize> {
        self.dimension_input
    }

    pub fn is_bimodal(&self) -> bool {
        self.dimension_input.is_some()
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Inserts (or replaces) the phrase stored at `index`.
    pub fn insert(&mut self, index: usize, phrase: Phrase) -> Result<(), HmmError> {
        if phrase.dimension() != self.dimension {
            return Err(HmmError::DimensionMismatch {
                expected: self.dimension,
                actual: phrase.dimension(),
            });
        }
        if phrase.dimension_input() != self.dimension_input {
            return Err(HmmError::DimensionMismatch {
                expected: self.dimension_input.unwrap_or(self.dimension),
                actual: phrase.dimension_input().unwrap_or(phrase.dimension()),
            });
        }
        self.phrases.insert(index, phrase);
        Ok(())
    }

    /// Appends a phrase after the highest index and returns its index.
    pub fn push(&mut self, phrase: Phrase) -> Result<usize, HmmError> {
        let index = self
            .phrases
            .keys()
            .next_back()
            .map_or(0, |&last| last + 1);
        self.insert(index, phrase)?;
        Ok(index)
    }

    pub fn remove(&mut self, index: usize) -> Result<Phrase, HmmError> {
        let len = self.phrases.len();
        let phrase = self
            .phrases
            .remove(&index)
            .ok_or(HmmError::PhraseIndexOutOfRange { index, len })?;
        Ok(phrase)
    }

    pub fn clear(&mut self) {
        self.phrases.clear();
    }

    pub fn phrase(&self, index: usize) -> Result<&Phrase, HmmError> {
        self.phrases
            .get(&index)
            .ok_or(HmmError::PhraseIndexOutOfRange {
                index,
                len: self.phrases.len(),
            })
    }

    /// Phrases in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Phrase> {
        self.phrases.values()
    }

    /// Lengths of all phrases, in index order.
    pub fn lengths(&self) -> Vec<usize> {
        self.iter().map(Phrase::length).collect()
    }
}
