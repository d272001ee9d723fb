use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use kaldi_align_rs::alignment::kaldi::{split_by_jobs, write_exported, JobMap};
use kaldi_align_rs::alignment::position::{to_position_dependent, to_position_independent};
use kaldi_align_rs::alignment::posterior::{score_utterance, ScoreFunction};
use kaldi_align_rs::alignment::records::{read_alignment_records, read_posterior_records};
use kaldi_align_rs::alignment::writer::{
    load_phone_alignment, write_phone_alignment, write_word_alignment,
};
use kaldi_align_rs::corpus::load_silences;
use kaldi_align_rs::{
    AlignConfig, AlignmentLevel, AlignmentPipelineBuilder, BatchInput, BatchReport,
    FailurePolicy, PosteriorFormat, RecordFormat, Utterance,
};
use tracing_subscriber::EnvFilter;

#[path = "kaldi_align/json_report_formatter.rs"]
mod json_report_formatter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LevelChoice {
    Phones,
    Words,
    Both,
}

impl LevelChoice {
    fn level(self) -> AlignmentLevel {
        match self {
            Self::Phones => AlignmentLevel::Phones,
            Self::Words => AlignmentLevel::Words,
            Self::Both => AlignmentLevel::Both,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PostFormatChoice {
    Auto,
    Vector,
    Pairs,
}

impl PostFormatChoice {
    fn format(self) -> PosteriorFormat {
        match self {
            Self::Auto => PosteriorFormat::Auto,
            Self::Vector => PosteriorFormat::Vector,
            Self::Pairs => PosteriorFormat::Pairs,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "kaldi_align")]
#[command(about = "Turn Kaldi frame alignments into time-stamped phone and word alignments")]
struct Args {
    /// JSON run configuration; flags override its values.
    #[arg(long, env = "KALDI_ALIGN_CONFIG", global = true)]
    config: Option<PathBuf>,
    #[arg(long, short, env = "KALDI_ALIGN_VERBOSE", global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert toolkit alignments into the canonical alignment format.
    Import(ImportArgs),
    /// Convert a canonical alignment back into per-frame toolkit alignments.
    Export(ExportArgs),
    /// Rewrite phones with word-position markers, or strip them with --strip.
    Tag(TagArgs),
    /// Score utterances from their segment posteriors.
    Score(ScoreArgs),
}

#[derive(Debug, ClapArgs)]
struct ImportArgs {
    #[arg(long, env = "KALDI_ALIGN_PHONES")]
    phones: PathBuf,
    #[arg(long, required = true, num_args = 1..)]
    ali: Vec<PathBuf>,
    /// Posterior archives, one per alignment archive and in the same order.
    #[arg(long, num_args = 1..)]
    post: Vec<PathBuf>,
    /// Line shape of the posterior archives.
    #[arg(long, value_enum, default_value = "auto")]
    post_format: PostFormatChoice,
    /// Alignment archives hold one phone code per frame instead of runs.
    #[arg(long, default_value_t = false)]
    per_frame: bool,
    #[arg(long, env = "KALDI_ALIGN_LEXICON")]
    lexicon: Option<PathBuf>,
    #[arg(long, env = "KALDI_ALIGN_TEXT")]
    text: Option<PathBuf>,
    #[arg(long, env = "KALDI_ALIGN_SILENCES")]
    silences: Option<PathBuf>,
    #[arg(long, env = "KALDI_ALIGN_LEVEL", value_enum)]
    level: Option<LevelChoice>,
    #[arg(long, env = "KALDI_ALIGN_JOBS")]
    jobs: Option<usize>,
    /// Skip failing utterances instead of aborting the run.
    #[arg(long, env = "KALDI_ALIGN_SKIP_FAILURES", default_value_t = false)]
    skip_failures: bool,
    /// The acoustic model used position-independent phones.
    #[arg(long, default_value_t = false)]
    position_independent: bool,
    #[arg(long, env = "KALDI_ALIGN_OUT", default_value = "alignment.txt")]
    out: PathBuf,
    /// Word-level output when both levels are written; defaults next to --out.
    #[arg(long)]
    words_out: Option<PathBuf>,
    #[arg(long, env = "KALDI_ALIGN_REPORT")]
    report: Option<PathBuf>,
}

#[derive(Debug, ClapArgs)]
struct ExportArgs {
    #[arg(long, env = "KALDI_ALIGN_PHONES")]
    phones: PathBuf,
    #[arg(long)]
    alignment: PathBuf,
    /// The canonical alignment carries a posterior column.
    #[arg(long, default_value_t = false)]
    with_posteriors: bool,
    #[arg(long, env = "KALDI_ALIGN_SILENCES")]
    silences: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    position_independent: bool,
    /// `utt job` mapping; output becomes a directory of `ali.<job>.txt` shards.
    #[arg(long)]
    jobs_map: Option<PathBuf>,
    #[arg(long, env = "KALDI_ALIGN_OUT")]
    out: PathBuf,
}

#[derive(Debug, ClapArgs)]
struct TagArgs {
    #[arg(long)]
    alignment: PathBuf,
    #[arg(long, default_value_t = false)]
    with_posteriors: bool,
    #[arg(long, env = "KALDI_ALIGN_SILENCES")]
    silences: Option<PathBuf>,
    /// Remove `_B`/`_I`/`_E`/`_S` markers instead of adding them.
    #[arg(long, default_value_t = false)]
    strip: bool,
    #[arg(long, env = "KALDI_ALIGN_OUT")]
    out: PathBuf,
}

#[derive(Debug, ClapArgs)]
struct ScoreArgs {
    #[arg(long)]
    alignment: PathBuf,
    /// Average segment posteriors instead of multiplying them.
    #[arg(long, default_value_t = false)]
    mean: bool,
    /// JSON output; scores are printed as `utt score` lines otherwise.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);
    if let Err(err) = run(args) {
        tracing::error!("{err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<(), String> {
    let config = match &args.config {
        Some(path) => AlignConfig::load(path)
            .map_err(|err| format!("Failed to load config '{}': {err}", path.display()))?,
        None => AlignConfig::default(),
    };

    match args.command {
        Command::Import(import) => run_import(config, import),
        Command::Export(export) => run_export(config, export),
        Command::Tag(tag) => run_tag(config, tag),
        Command::Score(score) => run_score(score),
    }
}

fn run_import(mut config: AlignConfig, args: ImportArgs) -> Result<(), String> {
    if !args.post.is_empty() && args.post.len() != args.ali.len() {
        return Err(format!(
            "--post needs one archive per --ali archive ({} given for {})",
            args.post.len(),
            args.ali.len()
        ));
    }

    let has_transcripts = args.lexicon.is_some() && args.text.is_some();
    config.level = match args.level {
        Some(choice) => choice.level(),
        None if has_transcripts => config.level,
        None => AlignmentLevel::Phones,
    };
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }
    if args.skip_failures {
        config.failure_policy = FailurePolicy::Skip;
    }
    if args.position_independent {
        config.word_position_dependent = false;
    }
    config.with_posteriors = !args.post.is_empty();

    let mut builder = AlignmentPipelineBuilder::new(config).with_phone_table_path(&args.phones);
    if let Some(lexicon) = &args.lexicon {
        builder = builder.with_lexicon_path(lexicon);
    }
    if let Some(text) = &args.text {
        builder = builder.with_transcripts_path(text);
    }
    if let Some(silences) = &args.silences {
        builder = builder.with_silences_path(silences);
    }
    let pipeline = builder
        .build()
        .map_err(|err| format!("Failed to set up alignment pipeline: {err}"))?;
    let config = pipeline.config();

    let format = if args.per_frame {
        RecordFormat::PerFrame
    } else {
        RecordFormat::Runs
    };

    let progress = ProgressBar::new(args.ali.len() as u64);
    progress.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    progress.set_message("starting...");

    let mut report = BatchReport::new(config.level, config.jobs, config.failure_policy);
    let mut utterances: Vec<Utterance> = Vec::new();
    let mut words = Vec::new();
    for (idx, ali_path) in args.ali.iter().enumerate() {
        let source_name = ali_path.display().to_string();
        progress.set_message(source_name.clone());

        let reader = open_input(ali_path)?;
        let records = read_alignment_records(reader, format, &source_name)
            .map_err(|err| format!("Failed to read alignment: {err}"))?;
        let posteriors = match args.post.get(idx) {
            Some(post_path) => Some(
                read_posterior_records(
                    open_input(post_path)?,
                    args.post_format.format(),
                    &post_path.display().to_string(),
                )
                .map_err(|err| format!("Failed to read posteriors: {err}"))?,
            ),
            None => None,
        };

        let output = pipeline
            .process(BatchInput {
                source_name,
                records,
                posteriors,
            })
            .map_err(|err| format!("Alignment failed: {err}"))?;
        utterances.extend(output.utterances);
        words.extend(output.words);
        report.merge(output.report);
        progress.inc(1);
    }
    progress.finish_with_message("done");
    report.log_out_of_lexicon_summary();

    match config.level {
        AlignmentLevel::Phones => write_phones(&args.out, &utterances, config.with_posteriors)?,
        AlignmentLevel::Words => write_words(&args.out, &words)?,
        AlignmentLevel::Both => {
            write_phones(&args.out, &utterances, config.with_posteriors)?;
            let words_out = args
                .words_out
                .clone()
                .unwrap_or_else(|| args.out.with_extension("words.txt"));
            write_words(&words_out, &words)?;
        }
    }

    tracing::info!(
        utterances = report.counts.utterances_out,
        segments = report.counts.segments,
        words = report.counts.words,
        skipped = report.skipped.len(),
        out = %args.out.display(),
        "import finished"
    );
    if let Some(report_path) = &args.report {
        json_report_formatter::write_report(report_path, &report)?;
    }
    Ok(())
}

fn run_export(mut config: AlignConfig, args: ExportArgs) -> Result<(), String> {
    config.level = AlignmentLevel::Phones;
    if args.position_independent {
        config.word_position_dependent = false;
    }
    let mut builder = AlignmentPipelineBuilder::new(config).with_phone_table_path(&args.phones);
    if let Some(silences) = &args.silences {
        builder = builder.with_silences_path(silences);
    }
    let pipeline = builder
        .build()
        .map_err(|err| format!("Failed to set up export: {err}"))?;

    let utterances = load_phone_alignment(&args.alignment, args.with_posteriors)
        .map_err(|err| format!("Failed to read alignment: {err}"))?;
    let exported = pipeline
        .export(&utterances)
        .map_err(|err| format!("Export failed: {err}"))?;

    match &args.jobs_map {
        Some(map_path) => {
            let job_map = JobMap::load(map_path)
                .map_err(|err| format!("Failed to read job map: {err}"))?;
            fs::create_dir_all(&args.out).map_err(|err| {
                format!(
                    "Failed to create output directory '{}': {err}",
                    args.out.display()
                )
            })?;
            for (job, shard) in split_by_jobs(exported, &job_map) {
                let path = args.out.join(format!("ali.{job}.txt"));
                write_exported(create_output(&path)?, &shard)
                    .map_err(|err| format!("Failed to write '{}': {err}", path.display()))?;
            }
        }
        None => {
            write_exported(create_output(&args.out)?, &exported)
                .map_err(|err| format!("Failed to write '{}': {err}", args.out.display()))?;
        }
    }
    Ok(())
}

fn run_tag(config: AlignConfig, args: TagArgs) -> Result<(), String> {
    let silences = match &args.silences {
        Some(path) => load_silences(path).map_err(|err| format!("Failed to read silences: {err}"))?,
        None => config.silences.iter().cloned().collect(),
    };
    let utterances = load_phone_alignment(&args.alignment, args.with_posteriors)
        .map_err(|err| format!("Failed to read alignment: {err}"))?;
    let tagged: Vec<Utterance> = utterances
        .into_iter()
        .map(|mut utterance| {
            if args.strip {
                to_position_independent(&mut utterance.segments);
            } else {
                utterance.segments = to_position_dependent(&utterance.segments, &silences);
            }
            utterance
        })
        .collect();
    write_phones(&args.out, &tagged, args.with_posteriors)
}

fn run_score(args: ScoreArgs) -> Result<(), String> {
    let function = if args.mean {
        ScoreFunction::Mean
    } else {
        ScoreFunction::Product
    };
    let utterances = load_phone_alignment(&args.alignment, true)
        .map_err(|err| format!("Failed to read alignment: {err}"))?;
    let scores = utterances
        .iter()
        .map(|utterance| score_utterance(utterance, function))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| format!("Scoring failed: {err}"))?;

    match &args.out {
        Some(path) => json_report_formatter::write_report(path, &scores)?,
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for score in &scores {
                writeln!(out, "{} {:.6}", score.utterance_id, score.score)
                    .map_err(|err| format!("Failed to write scores: {err}"))?;
            }
        }
    }
    tracing::info!(
        utterances = scores.len(),
        function = function.as_str(),
        "scoring finished"
    );
    Ok(())
}

fn write_phones(path: &Path, utterances: &[Utterance], with_posteriors: bool) -> Result<(), String> {
    write_phone_alignment(create_output(path)?, utterances, with_posteriors)
        .map_err(|err| format!("Failed to write '{}': {err}", path.display()))
}

fn write_words(
    path: &Path,
    words: &[kaldi_align_rs::WordSegment],
) -> Result<(), String> {
    write_word_alignment(create_output(path)?, words)
        .map_err(|err| format!("Failed to write '{}': {err}", path.display()))
}

fn open_input(path: &Path) -> Result<std::io::BufReader<File>, String> {
    File::open(path)
        .map(std::io::BufReader::new)
        .map_err(|err| format!("Failed to open '{}': {err}", path.display()))
}

fn create_output(path: &Path) -> Result<BufWriter<File>, String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            format!(
                "Failed to create output directory '{}': {err}",
                parent.display()
            )
        })?;
    }
    File::create(path)
        .map(BufWriter::new)
        .map_err(|err| format!("Failed to create '{}': {err}", path.display()))
}
