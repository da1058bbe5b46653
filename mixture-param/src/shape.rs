use crate::error::ShapeError;

/// Resolved shapes of a mixture with `K` components in `D` dimensions
///
/// ```text
/// locs   : batch_shape x K x D
/// scale  : batch_shape x D
/// logits : batch_shape x K
/// ```
///
/// The non-batch case is the empty `batch_shape`. Every kernel works
/// on flattened `B = prod(batch_shape)` rows (`B = 1` without a
/// batch).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixtureShape {
    batch_shape: Vec<usize>,
    event_shape: Vec<usize>,
    num_components: usize,
}

impl MixtureShape {
    /// Validate the parameter shapes and determine the batch shape
    ///
    /// # Arguments
    /// * `locs` - shape of the component means `(..., K, D)`
    /// * `scale` - shape of the shared scale `(..., D)`
    /// * `logits` - shape of the mixture logits `(..., K)`
    ///
    pub fn resolve(locs: &[usize], scale: &[usize], logits: &[usize]) -> Result<Self, ShapeError> {
        let rank = locs.len();
        if rank < 2 {
            return Err(ShapeError::LocsRank(locs.to_vec()));
        }

        let kk = locs[rank - 2];
        let dd = locs[rank - 1];
        if kk == 0 || dd == 0 {
            return Err(ShapeError::EmptyAxis(locs.to_vec()));
        }

        let batch_shape = locs[..(rank - 2)].to_vec();

        let expected_scale = [batch_shape.as_slice(), &[dd]].concat();
        if scale != expected_scale.as_slice() {
            return Err(ShapeError::Scale {
                expected: expected_scale,
                found: scale.to_vec(),
            });
        }

        let expected_logits = [batch_shape.as_slice(), &[kk]].concat();
        if logits != expected_logits.as_slice() {
            return Err(ShapeError::Logits {
                expected: expected_logits,
                found: logits.to_vec(),
            });
        }

        Ok(Self {
            batch_shape,
            event_shape: vec![dd],
            num_components: kk,
        })
    }

    pub fn batch_shape(&self) -> &[usize] {
        &self.batch_shape
    }

    pub fn event_shape(&self) -> &[usize] {
        &self.event_shape
    }

    pub fn is_batched(&self) -> bool {
        !self.batch_shape.is_empty()
    }

    /// number of mixture components `K`
    pub fn num_components(&self) -> usize {
        self.num_components
    }

    /// event dimension `D`
    pub fn dim(&self) -> usize {
        self.event_shape[0]
    }

    /// number of flattened batch rows `B`
    pub fn batch_size(&self) -> usize {
        self.batch_shape.iter().product()
    }

    /// `sample_shape + batch_shape + (D,)`
    pub fn extended_shape(&self, sample_shape: &[usize]) -> Vec<usize> {
        [sample_shape, self.batch_shape.as_slice(), self.event_shape.as_slice()].concat()
    }

    pub fn locs_shape(&self) -> Vec<usize> {
        [self.batch_shape.as_slice(), &[self.num_components, self.dim()]].concat()
    }

    pub fn scale_shape(&self) -> Vec<usize> {
        [self.batch_shape.as_slice(), self.event_shape.as_slice()].concat()
    }

    pub fn logits_shape(&self) -> Vec<usize> {
        [self.batch_shape.as_slice(), &[self.num_components]].concat()
    }

    /// Split the shape of a value into its extra leading axes.
    ///
    /// The trailing axes are right-aligned with `batch_shape + (D,)`
    /// and each must either match or be a singleton. A value of lower
    /// rank has no leading axes.
    pub fn leading_shape(&self, value: &[usize]) -> Result<Vec<usize>, ShapeError> {
        let target = self.extended_shape(&[]);
        let ntail = target.len().min(value.len());
        let nlead = value.len() - ntail;

        let tail = &value[nlead..];
        let target_tail = &target[(target.len() - ntail)..];

        let broadcastable = tail
            .iter()
            .zip(target_tail.iter())
            .all(|(&v, &t)| v == t || v == 1);

        if !broadcastable {
            return Err(ShapeError::Value {
                target,
                found: value.to_vec(),
            });
        }

        Ok(value[..nlead].to_vec())
    }
}
