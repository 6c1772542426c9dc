//! Internal testing utilities for the hwr-decode crates.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

use rten_tensor::rng::XorShiftRng;
use rten_tensor::NdTensor;

/// Utility for creating parametrized (aka. table-driven) tests.
///
/// Create a `Case` struct holding the data for one test case, a collection
/// of cases, and call `test_each` with the test function. All cases are run
/// even if some fail. If any case panics, `test_each` then panics with the
/// debug representations of the failing cases.
///
/// ```
/// use hwr_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///     text: &'static str,
///     len: usize,
/// }
///
/// let cases = [Case { text: "ab", len: 2 }, Case { text: "", len: 0 }];
/// cases.test_each(|case| assert_eq!(case.text.len(), case.len));
/// ```
///
/// Cases and the captures of the test function must be
/// [unwind safe](https://doc.rust-lang.org/std/panic/fn.catch_unwind.html).
/// Values that are not, such as decoders holding references to collaborators,
/// are easiest to create inside the test function.
pub trait TestCases {
    /// The data for a single test case.
    type Case;

    /// Call test function `test` with each test case in `self`, catching any panics.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Variant of [`test_each`](TestCases::test_each) which passes test cases
    /// to the test function by value.
    fn test_each_value(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe;
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe,
    {
        let failures: Vec<String> = self
            .into_iter()
            .filter(|case| std::panic::catch_unwind(|| test(case)).is_err())
            .map(|case| format!("{:?}", case))
            .collect();
        report_failures(&failures);
    }

    fn test_each_value(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe,
    {
        let mut failures = Vec::new();
        for case in self {
            let test = &test;
            let case_str = format!("{:?}", case);
            if std::panic::catch_unwind(move || test(case)).is_err() {
                failures.push(case_str);
            }
        }
        report_failures(&failures);
    }
}

fn report_failures(failures: &[String]) {
    assert_eq!(
        failures.len(),
        0,
        "{} test cases failed: {:?}",
        failures.len(),
        failures
    );
}

/// Create a `[timesteps, labels]` emission matrix from rows of label
/// probabilities. The blank is the last column of each row.
pub fn emissions<const N: usize>(rows: &[[f32; N]]) -> NdTensor<f32, 2> {
    let data: Vec<f32> = rows.iter().flat_map(|row| row.iter().copied()).collect();
    NdTensor::from_data([rows.len(), N], data)
}

/// Create an emission matrix in which each timestep gives probability 1 to
/// one character of `text`, over an alphabet of the characters in
/// `alphabet` plus a final blank.
///
/// If `separate_repeats` is true, a blank timestep is inserted between
/// repeated characters so that they are not collapsed when decoding.
/// Characters not in `alphabet` are encoded as blanks.
pub fn onehot_emissions(alphabet: &str, text: &str, separate_repeats: bool) -> NdTensor<f32, 2> {
    let chars: Vec<char> = alphabet.chars().collect();
    let blank = chars.len();

    let mut labels = Vec::new();
    let mut prev_ch = None;
    for ch in text.chars() {
        if separate_repeats && Some(ch) == prev_ch {
            labels.push(blank);
        }
        prev_ch = Some(ch);
        labels.push(chars.iter().position(|&c| c == ch).unwrap_or(blank));
    }

    let mut x = NdTensor::zeros([labels.len(), blank + 1]);
    for (t, label) in labels.into_iter().enumerate() {
        x[[t, label]] = 1.;
    }
    x
}

/// Create a `[seq, n_labels]` emission matrix of random probabilities
/// generated from `seed`.
///
/// Each row sums to one and every value is non-zero. `seed` must be non-zero.
pub fn random_emissions(seq: usize, n_labels: usize, seed: u64) -> NdTensor<f32, 2> {
    let mut rng = XorShiftRng::new(seed);
    let mut x = NdTensor::<f32, 2>::rand([seq, n_labels], &mut rng);
    for t in 0..seq {
        let sum: f32 = (0..n_labels).map(|l| x[[t, l]] + 0.01).sum();
        for l in 0..n_labels {
            x[[t, l]] = (x[[t, l]] + 0.01) / sum;
        }
    }
    x
}

/// Assert that `actual` is within `tolerance` of `expected`.
#[track_caller]
pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "{} is not within {} of {}",
        actual,
        tolerance,
        expected
    );
}
