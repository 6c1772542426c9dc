use std::collections::VecDeque;
use std::error::Error;
use std::fmt::Write;
use std::fs;
use std::time::Instant;

use hwr_decode::{
    decode_greedy_batch, Alphabet, DecoderConfig, Hypothesis, SequenceResult, TrieBeamSearch,
};
use rten_tensor::prelude::*;
use rten_tensor::NdTensor;
use serde::Deserialize;

struct Args {
    /// JSON file containing the alphabet and emissions.
    input: String,

    /// JSON file containing a `DecoderConfig`.
    config: Option<String>,

    beam_width: Option<usize>,
    top_paths: Option<usize>,
    candidate_cap: Option<usize>,

    /// Use best-path decoding instead of beam search.
    greedy: bool,

    /// Show decoding time.
    timing: bool,

    /// Enable verbose logging.
    verbose: bool,
}

fn parse_args() -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;

    let mut values = VecDeque::new();
    let mut config = None;
    let mut beam_width = None;
    let mut top_paths = None;
    let mut candidate_cap = None;
    let mut greedy = false;
    let mut timing = false;
    let mut verbose = false;

    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Value(val) => values.push_back(val.string()?),
            Long("config") => config = Some(parser.value()?.string()?),
            Long("beam-width") => beam_width = Some(parser.value()?.parse()?),
            Long("top-paths") => top_paths = Some(parser.value()?.parse()?),
            Long("candidate-cap") => candidate_cap = Some(parser.value()?.parse()?),
            Long("greedy") => greedy = true,
            Short('v') | Long("verbose") => verbose = true,
            Short('t') | Long("timing") => timing = true,
            Short('h') | Long("help") => {
                println!(
                    "Decode CTC emission matrices into text.

Usage: {bin_name} [OPTIONS] <emissions.json>

The input is a JSON object of the form
`{{\"alphabet\": \"...\", \"emissions\": [[[...]]]}}`, where `emissions` is a
list of `[timesteps, labels]` probability matrices, or a single matrix. The
last label of each row is the CTC blank.

  --config <file>        Read decoder settings from a JSON file
  --beam-width <n>       Number of beams kept at each timestep
  --top-paths <n>        Number of results returned per sequence
  --candidate-cap <n>    Maximum labels considered when extending a beam
  --greedy               Use best-path decoding instead of beam search
  -t, --timing           Output timing info
  -v, --verbose          Enable verbose logging
  -h, --help             Print help
",
                    bin_name = parser.bin_name().unwrap_or("hwr-decode")
                );
                std::process::exit(0);
            }
            _ => return Err(arg.unexpected()),
        }
    }

    let input = values.pop_front().ok_or("missing `<emissions.json>` arg")?;

    Ok(Args {
        input,
        config,
        beam_width,
        top_paths,
        candidate_cap,
        greedy,
        timing,
        verbose,
    })
}

/// Emissions for one or more sequences.
#[derive(Deserialize)]
#[serde(untagged)]
enum Emissions {
    Batch(Vec<Vec<Vec<f32>>>),
    Single(Vec<Vec<f32>>),
}

#[derive(Deserialize)]
struct Input {
    alphabet: String,
    emissions: Emissions,
}

/// Convert the rows of one sequence into a `[timesteps, labels]` tensor.
///
/// All rows must have the same length. Sequences with no rows get
/// `default_width` columns.
fn to_tensor(rows: Vec<Vec<f32>>, default_width: usize) -> Result<NdTensor<f32, 2>, String> {
    let width = rows.first().map(|row| row.len()).unwrap_or(default_width);
    let seq = rows.len();
    let mut data = Vec::with_capacity(seq * width);
    for (t, row) in rows.into_iter().enumerate() {
        if row.len() != width {
            return Err(format!(
                "row {} has {} values but row 0 has {}",
                t,
                row.len(),
                width
            ));
        }
        data.extend(row);
    }
    Ok(NdTensor::from_data([seq, width], data))
}

/// Parse the JSON input file into an alphabet and a list of emission
/// matrices.
fn parse_input(json: &str) -> Result<(Alphabet, Vec<NdTensor<f32, 2>>), Box<dyn Error>> {
    let input: Input = serde_json::from_str(json)?;
    let alphabet = Alphabet::new(&input.alphabet)?;

    let sequences = match input.emissions {
        Emissions::Batch(seqs) => seqs,
        Emissions::Single(rows) => vec![rows],
    };
    let tensors = sequences
        .into_iter()
        .enumerate()
        .map(|(index, rows)| {
            to_tensor(rows, alphabet.num_labels())
                .map_err(|err| format!("sequence {}: {}", index, err))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((alphabet, tensors))
}

/// Read the decoder config file, if any, and apply command line overrides.
fn decoder_config(args: &Args) -> Result<DecoderConfig, Box<dyn Error>> {
    let mut config: DecoderConfig = match &args.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => DecoderConfig::default(),
    };
    if let Some(beam_width) = args.beam_width {
        config.beam_width = beam_width;
    }
    if let Some(top_paths) = args.top_paths {
        config.top_paths = top_paths;
    }
    if let Some(candidate_cap) = args.candidate_cap {
        config.candidate_cap = candidate_cap;
    }
    Ok(config)
}

/// Format decoding results as one block per sequence.
fn format_results(results: &[SequenceResult<Vec<Hypothesis>>]) -> String {
    let mut out = String::new();
    for (index, result) in results.iter().enumerate() {
        _ = writeln!(out, "sequence {}:", index);
        match result {
            Ok(hyps) => {
                for (rank, hyp) in hyps.iter().enumerate() {
                    _ = writeln!(
                        out,
                        "  {}. {:?} score {:.6} mass {:.6}",
                        rank + 1,
                        hyp.text(),
                        hyp.score(),
                        hyp.mass()
                    );
                }
            }
            Err(err) => {
                _ = writeln!(out, "  error: {}", err.error);
            }
        }
    }
    out
}

/// Tool for decoding emission matrices produced by a CTC model, using either
/// beam search or best-path decoding.
///
/// ```
/// cargo run -p hwr-decode-cli --release emissions.json
/// ```
///
/// Set `HWR_NUM_THREADS` to control the number of threads used to decode
/// batches.
fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.verbose { "debug" } else { "warn" }),
    )
    .init();

    let (alphabet, sequences) = parse_input(&fs::read_to_string(&args.input)?)?;
    let views: Vec<_> = sequences.iter().map(|seq| seq.view()).collect();

    let start = Instant::now();
    let results: Vec<SequenceResult<Vec<Hypothesis>>> = if args.greedy {
        decode_greedy_batch(&views, &alphabet)
            .into_iter()
            .map(|result| result.map(|hyp| vec![hyp]))
            .collect()
    } else {
        let config = decoder_config(&args)?;
        let decoder = TrieBeamSearch::builder(alphabet).config(config).build()?;
        decoder.decode_batch(&views)
    };
    let elapsed = start.elapsed();

    print!("{}", format_results(&results));

    if args.timing {
        println!(
            "Decoded {} sequences in {:.2}ms",
            views.len(),
            elapsed.as_secs_f64() * 1000.
        );
    }

    let failed = results.iter().filter(|result| result.is_err()).count();
    if failed > 0 {
        return Err(format!("{} of {} sequences failed to decode", failed, results.len()).into());
    }

    Ok(())
}
