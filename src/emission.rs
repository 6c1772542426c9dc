//! Validation and access for emission matrices produced by a sequence model.

use rten_tensor::prelude::*;
use rten_tensor::NdTensorView;

use crate::alphabet::Alphabet;
use crate::error::DecodeError;

/// Check that `emissions` is a `[timesteps, alphabet.num_labels()]` matrix of
/// finite values.
///
/// Rows are not required to sum to one.
pub fn check_emissions(
    emissions: &NdTensorView<f32, 2>,
    alphabet: &Alphabet,
) -> Result<(), DecodeError> {
    let [seq, n_labels] = emissions.shape();
    if n_labels != alphabet.num_labels() {
        return Err(DecodeError::RowWidthMismatch {
            expected: alphabet.num_labels(),
            actual: n_labels,
        });
    }

    for timestep in 0..seq {
        for label in 0..n_labels {
            if !emissions[[timestep, label]].is_finite() {
                return Err(DecodeError::NonFiniteValue { timestep, label });
            }
        }
    }

    Ok(())
}

/// Copy the probabilities for one timestep into `row`, replacing its
/// previous contents.
pub(crate) fn read_row(emissions: &NdTensorView<f32, 2>, timestep: usize, row: &mut Vec<f32>) {
    let [_, n_labels] = emissions.shape();
    row.clear();
    row.extend((0..n_labels).map(|label| emissions[[timestep, label]]));
}

#[cfg(test)]
mod tests {
    use rten_tensor::prelude::*;
    use rten_tensor::NdTensor;

    use super::{check_emissions, read_row};
    use crate::alphabet::Alphabet;
    use crate::error::DecodeError;

    #[test]
    fn test_check_emissions() {
        let alphabet = Alphabet::new("ab").unwrap();

        let ok = NdTensor::from_data([2, 3], vec![0.6, 0.3, 0.1, 0.2, 0.2, 0.2]);
        assert_eq!(check_emissions(&ok.view(), &alphabet), Ok(()));

        let too_wide = NdTensor::from_data([1, 4], vec![0.25; 4]);
        assert_eq!(
            check_emissions(&too_wide.view(), &alphabet),
            Err(DecodeError::RowWidthMismatch {
                expected: 3,
                actual: 4
            })
        );

        let nan = NdTensor::from_data([2, 3], vec![0.6, 0.3, 0.1, 0.2, f32::NAN, 0.2]);
        assert_eq!(
            check_emissions(&nan.view(), &alphabet),
            Err(DecodeError::NonFiniteValue {
                timestep: 1,
                label: 1
            })
        );
    }

    #[test]
    fn test_check_empty_emissions() {
        let alphabet = Alphabet::new("ab").unwrap();
        let empty = NdTensor::<f32, 2>::zeros([0, 3]);
        assert_eq!(check_emissions(&empty.view(), &alphabet), Ok(()));
    }

    #[test]
    fn test_read_row() {
        let mat = NdTensor::from_data([2, 3], vec![0.6, 0.3, 0.1, 0.2, 0.5, 0.3]);
        let mut row = vec![1.0; 7];
        read_row(&mat.view(), 1, &mut row);
        assert_eq!(row, [0.2, 0.5, 0.3]);
    }
}
