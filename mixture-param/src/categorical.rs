use crate::traits::ComponentSampler;

use ndarray::{Array2, ArrayView2};
use rand::distr::weighted::WeightedIndex;
use rand::Rng;
use rand_distr::Distribution;

/// Component draws with one weighted-index table per batch row
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedIndexSampler;

impl ComponentSampler for WeightedIndexSampler {
    fn sample_components<R>(
        &self,
        weights: ArrayView2<f64>,
        num_draws: usize,
        rng: &mut R,
    ) -> anyhow::Result<Array2<usize>>
    where
        R: Rng + ?Sized,
    {
        let tables = weights
            .rows()
            .into_iter()
            .map(|w_b| WeightedIndex::new(w_b.iter().copied()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut which = Array2::<usize>::zeros((num_draws, tables.len()));
        for mut which_l in which.rows_mut() {
            for (k, table) in which_l.iter_mut().zip(tables.iter()) {
                *k = table.sample(&mut *rng);
            }
        }
        Ok(which)
    }
}
