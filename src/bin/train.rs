//! Command line tool to train a tagger on a JSON corpus

use std::{fs::File, path::Path};

use anyhow::anyhow;
use arg_bilstm::{
    cli::attention::Attention,
    datasets::{Corpus, LoadableCorpus},
    utils::files,
    Tagger, TaggerConfig,
};
use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
use pico_args::Arguments;

const HELP: &str = "\
Usage: train CORPUS [OPTIONS]

Arguments:
  CORPUS               JSON corpus with mappings, embeddings, datasets and data

Options:
  -h, --help           Print help
  -c, --config         YAML file with tagger parameters
  -n, --num-epochs     Number of epochs to train for (defaults to 10)
  -o, --output         Artifact directory (defaults to 'artifacts')
  -a, --attention      Pre-attention variant: 'none', 'time' or 'feature'
";

const DEFAULT_EPOCHS: usize = 10;

#[derive(Debug)]
struct Args {
    corpus: String,
    config: Option<String>,
    num_epochs: Option<usize>,
    output: Option<String>,
    attention: Option<String>,
}

impl Args {
    fn parse() -> anyhow::Result<Option<Self>> {
        let mut pargs = Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            return Ok(None);
        }

        let args = Args {
            config: pargs.opt_value_from_str(["-c", "--config"])?,
            num_epochs: pargs.opt_value_from_str(["-n", "--num-epochs"])?,
            output: pargs.opt_value_from_str(["-o", "--output"])?,
            attention: pargs.opt_value_from_str(["-a", "--attention"])?,
            corpus: pargs.free_from_str().map_err(|e| match e {
                pico_args::Error::MissingArgument => anyhow!("Missing required argument: CORPUS"),
                _ => anyhow!("{}", e),
            })?,
        };

        Ok(Some(args))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let Some(args) = Args::parse()? else {
        print!("{}", HELP);

        return Ok(());
    };

    let mut config = match &args.config {
        Some(path) => TaggerConfig::from_yaml(&files::read_to_string(path).await?)?,
        None => TaggerConfig::new(),
    };

    if let Some(attention) = &args.attention {
        config.attention = Attention::try_from(attention.as_str())?.config();
    }

    let corpus = Corpus::load(&args.corpus).await?;

    let mut tagger = Tagger::<Autodiff<NdArray>>::new(config, NdArrayDevice::Cpu)?;
    tagger.set_mappings(corpus.mappings, corpus.embeddings)?;
    tagger.set_dataset(corpus.datasets, corpus.data)?;
    tagger.build_model()?;

    let report = tagger.fit(args.num_epochs.unwrap_or(DEFAULT_EPOCHS))?;

    let output = args.output.unwrap_or_else(|| "artifacts".to_string());
    tagger.save(&output)?;

    serde_json::to_writer_pretty(File::create(Path::new(&output).join("report.json"))?, &report)?;

    println!("Trained {} epoch(s), artifacts in {}", report.epochs.len(), output);

    Ok(())
}
