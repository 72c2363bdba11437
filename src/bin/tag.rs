//! Command line tool to tag sentences with a trained tagger

use anyhow::anyhow;
use arg_bilstm::{utils::files, SentenceRecord, Tagger};
use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
use pico_args::Arguments;

const HELP: &str = "\
Usage: tag ARTIFACT_DIR INPUT [OPTIONS]

Arguments:
  ARTIFACT_DIR         Directory written by the train command
  INPUT                Text file with one whitespace-tokenized sentence per line

Options:
  -h, --help           Print help
  --attention          Print the pre-attention weights of every sentence as JSON
";

#[derive(Debug)]
struct Args {
    /// Prints the usage menu
    help: bool,

    /// Print attention weights
    attention: bool,

    /// The trained tagger
    artifact_dir: String,

    /// The sentences to tag
    input: String,
}

fn parse_args() -> Result<Args, pico_args::Error> {
    let mut pargs = Arguments::from_env();

    let help = pargs.contains(["-h", "--help"]);
    let attention = pargs.contains("--attention");

    if help {
        return Ok(Args {
            help,
            attention,
            artifact_dir: String::new(),
            input: String::new(),
        });
    }

    let args = Args {
        help,
        attention,
        artifact_dir: pargs.free_from_str()?,
        input: pargs.free_from_str()?,
    };

    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let args = parse_args()?;

    if args.help {
        println!("{}", HELP);
        return Ok(());
    }

    let tagger = Tagger::<Autodiff<NdArray>>::load(&args.artifact_dir, NdArrayDevice::Cpu).await?;

    let mappings = tagger
        .mappings()
        .ok_or_else(|| anyhow!("The saved tagger has no mappings"))?;

    let sentences = files::read_file(&args.input)
        .await?
        .iter()
        .map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            SentenceRecord::from_raw_tokens(&tokens, mappings)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let predictions = tagger.predict(&sentences, args.attention)?;

    for (i, sentence) in sentences.iter().enumerate() {
        for (dataset, labels) in &predictions.labels {
            // Predictions skip the PADDING positions
            let tagged = sentence
                .raw_tokens
                .iter()
                .zip(&sentence.tokens)
                .filter(|&(_, &index)| index != 0)
                .map(|(token, _)| token)
                .zip(&labels[i])
                .map(|(token, label)| format!("{token}/{label}"))
                .collect::<Vec<_>>()
                .join(" ");

            println!("[{dataset}] {tagged}");

            if let Some(attention) = &predictions.attention {
                println!("{}", serde_json::to_string(&attention[dataset][i])?);
            }
        }
    }

    Ok(())
}
