//! Best-path CTC decoding.

use rten_tensor::prelude::*;
use rten_tensor::NdTensorView;

use crate::alphabet::Alphabet;
use crate::beam::{Beam, Mass};
use crate::decoder::Hypothesis;
use crate::emission::check_emissions;
use crate::error::DecodeError;

/// Decode a `[sequence, n_labels]` emission matrix by choosing the most
/// probable label at each timestep.
///
/// Repeated labels are collapsed and blanks removed, so the path "a--bb"
/// decodes to "ab". The hypothesis's mass is the probability of the chosen
/// path alone, rather than the sum over all paths that produce its text.
///
/// This is much faster than [`TrieBeamSearch`](crate::TrieBeamSearch) but
/// ignores any lexicon or language model and may return less accurate
/// results.
pub fn decode_greedy(
    emissions: NdTensorView<f32, 2>,
    alphabet: &Alphabet,
) -> Result<Hypothesis, DecodeError> {
    check_emissions(&emissions, alphabet)?;

    let [seq, n_labels] = emissions.shape();
    let blank = alphabet.blank();

    let mut text = Beam::empty();
    let mut prob = 1.0f64;
    let mut last_label = blank;

    for t in 0..seq {
        // First label wins ties.
        let (label, label_prob) = (0..n_labels)
            .map(|label| (label, emissions[[t, label]]))
            .fold((blank, f32::NEG_INFINITY), |best, (label, p)| {
                if p > best.1 {
                    (label, p)
                } else {
                    best
                }
            });
        prob *= label_prob as f64;

        if label == last_label {
            continue;
        }
        last_label = label;

        if let Some(ch) = alphabet.char(label) {
            text = text.push(ch);
        }
    }

    // Report the path's mass according to whether it ends in a blank, to
    // match the beam search.
    let mass = if seq == 0 || last_label == blank {
        Mass {
            blank: prob,
            non_blank: 0.,
        }
    } else {
        Mass {
            blank: 0.,
            non_blank: prob,
        }
    };

    Ok(Hypothesis::new(text, mass, 1., 0.))
}
