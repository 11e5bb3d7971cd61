use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser};
use seqbeam_core::{
    decode_route, table::TableModel, DecodeEvent, DecodeRequest, ThreadRequest, Translation,
};
use tokio::{
    fs::File,
    io::{AsyncReadExt, BufReader},
};

mod config;

pub fn build_path(path: impl AsRef<Path>, name: impl AsRef<Path>) -> Result<PathBuf> {
    let permitted = path.as_ref();
    let name = name.as_ref();
    if name.ancestors().any(|p| p.ends_with(Path::new(".."))) {
        bail!("cannot have \"..\" in names");
    }
    let path = match name.is_absolute() || name.starts_with(permitted) {
        true => name.into(),
        false => permitted.join(name),
    };
    match path.starts_with(permitted) {
        true => Ok(path),
        false => bail!("path not permitted"),
    }
}

pub async fn load_config(path: impl AsRef<Path>) -> Result<config::Config> {
    let file = File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut contents = String::new();
    reader.read_to_string(&mut contents).await?;
    Ok(toml::from_str(&contents)?)
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(long, short, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Beam width.
    #[arg(long, short)]
    width: Option<usize>,
    /// Maximum output length, start token included.
    #[arg(long, short)]
    max_length: Option<usize>,
    /// Stop after this many completed hypotheses.
    #[arg(long)]
    max_completed: Option<usize>,
    /// Score the hypotheses of each step in parallel.
    #[arg(long)]
    parallel: bool,
}

fn render(model: &TableModel, translation: &Translation, output: &config::OutputOption) -> String {
    let tokens = match output.skip_start {
        true => translation.generated(),
        false => translation.tokens.as_slice(),
    };
    let words = model.vocab().decode(tokens, model.end()).join(" ");
    match output.scores {
        true => format!(
            "{words}\t{:.4}\t{:.4}",
            translation.score, translation.normalized
        ),
        false => words,
    }
}

/// Follow the events of one request until it yields a result.
async fn receive(receiver: flume::Receiver<DecodeEvent>) -> Result<Translation> {
    while let Ok(event) = receiver.recv_async().await {
        match event {
            DecodeEvent::Start => log::info!("decoding..."),
            DecodeEvent::Step(report) => log::info!(
                "step {}: {} active, {} completed",
                report.step,
                report.active,
                report.completed.len()
            ),
            DecodeEvent::Done(translation) => return Ok(translation),
            DecodeEvent::Error(err) => return Err(err.into()),
        }
    }
    bail!("search ended without a result")
}

#[tokio::main]
async fn main() -> Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .with_module_level("seqbeam", log::LevelFilter::Info)
        .with_module_level("seqbeam_core", log::LevelFilter::Info)
        .init()?;

    let args = Args::parse();

    let cmd = Args::command();
    let version = cmd.get_version().unwrap_or("0.0.1");
    let bin_name = cmd.get_bin_name().unwrap_or("seqbeam");

    log::info!("{}\tversion: {}", bin_name, version);

    let mut config = {
        let path = args
            .config
            .clone()
            .unwrap_or("assets/configs/Config.toml".into());
        log::info!("reading config {}...", path.to_string_lossy());
        load_config(path).await?
    };
    if let Some(width) = args.width {
        config.beam.width = width;
    }
    if let Some(max_length) = args.max_length {
        config.beam.max_length = max_length;
    }
    if let Some(max_completed) = args.max_completed {
        config.beam.max_completed = Some(max_completed);
    }
    config.beam.parallel |= args.parallel;
    log::info!("{:#?}", config.beam);

    let path = config.model_path()?;
    log::info!("loading table {:?}", path);
    let model = Arc::new(TableModel::load(&path).await?);
    log::info!("{} words", model.vocab().len());

    let (sender, receiver) = flume::unbounded::<ThreadRequest<TableModel>>();
    let route = tokio::spawn(decode_route(model.clone(), receiver));

    let (event_sender, event_receiver) = flume::unbounded();
    let request = Box::new(DecodeRequest {
        option: config.beam.clone(),
        start: model.start(),
        end: model.end(),
        state: 1,
        context: Arc::new(()),
    });
    let _ = sender.send(ThreadRequest::Decode {
        request,
        sender: event_sender,
    });
    drop(sender);

    let translation = receive(event_receiver).await?;
    println!("{}", render(&model, &translation, &config.output));

    route.await??;
    Ok(())
}
