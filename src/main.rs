//! Next Word Prediction - Bi-LSTM over Kafka's "The Metamorphosis"
//!
//! Single-process, self-contained CLI application.
//! Uses Candle for inference; model and vocabulary are loaded once and
//! reused for every prediction.

use clap::{Parser, Subcommand};
use next_word::app::prompts::{self, GENERATED_SENTENCE_WORDS};
use next_word::app::QuizQuestion;
use next_word::cli::{log_writer, Display, InputHandler};
use next_word::llm::model::select_device;
use next_word::llm::vocab::words;
use next_word::llm::{Model, ModelBundle, Predictor, Vocab, CONTEXT_WORDS};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::error::Error;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "next-word")]
#[command(about = "Predict the next word of a phrase from Kafka's The Metamorphosis")]
struct Args {
    /// Path to the model bundle
    #[arg(short, long, global = true, default_value = "models/model_bilstm.bin")]
    model: PathBuf,

    /// Path to the corpus the vocabulary is built from
    #[arg(short, long, global = true, default_value = "data/metamorphosis_clean.txt")]
    corpus: PathBuf,

    /// Number of most recent words fed to the model
    #[arg(long, global = true, default_value_t = CONTEXT_WORDS)]
    context: usize,

    /// Enable GPU acceleration (if available)
    #[arg(long, global = true)]
    gpu: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Menu-driven terminal session (default)
    Interactive {
        /// Seed for placeholder, starter and quiz picks
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Predict the word(s) following a phrase
    Predict {
        text: String,
        /// Number of words to predict
        #[arg(short = 'n', long, default_value_t = 1)]
        words: usize,
    },
    /// Generate a sentence from a starter phrase
    Generate {
        /// Starter phrase, random when omitted
        #[arg(long)]
        start: Option<String>,
        #[arg(short = 'n', long, default_value_t = GENERATED_SENTENCE_WORDS)]
        words: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Show model layers and vocabulary statistics
    Info {
        /// Number of most frequent words to list
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Rewrite a legacy bundle with its architecture already patched
    Migrate {
        /// Destination bundle path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_writer::stderr)
        .with_target(false)
        .init();
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Load vocabulary and model once for the whole process
fn load_predictor(args: &Args) -> Result<Predictor, Box<dyn Error>> {
    let vocab = Vocab::from_corpus_file(&args.corpus)?;
    info!(path = %args.corpus.display(), size = vocab.size(), "vocabulary built");

    let device = select_device(args.gpu);
    let model = Model::load(&args.model, &device)?;
    if model.output_dim() != vocab.size() {
        warn!(
            model = model.output_dim(),
            vocab = vocab.size(),
            "model output size differs from vocabulary size"
        );
    }
    if vocab.size() > model.input_dim() {
        warn!(
            embedding_rows = model.input_dim(),
            vocab = vocab.size(),
            "rare corpus words fall outside the embedding table"
        );
    }

    Ok(Predictor::new(model, vocab).with_context(args.context))
}

fn predict(predictor: &Predictor, text: &str, count: usize) -> Result<(), Box<dyn Error>> {
    let display = Display::simple();
    let first = predictor.predict_next(text)?;
    display.show_prediction(&first)?;

    let mut predicted = vec![first.word];
    if count > 1 {
        let rest = predictor.generate(&format!("{text} {}", predicted[0]), count - 1)?;
        predicted.extend(rest.words);
    }

    display.show_word_sequence(&words(text), &predicted)?;
    Ok(())
}

fn run_interactive(predictor: &Predictor, seed: Option<u64>) -> Result<(), Box<dyn Error>> {
    let mut rng = rng_from(seed);
    let input = InputHandler::new();
    InputHandler::enable_raw_mode()?;
    let display = Display::interactive();

    'session: loop {
        display.clear()?;
        display.show_title()?;
        display.show_menu()?;

        let key = input.wait_key()?;
        if InputHandler::is_exit(&key) {
            break 'session;
        }

        match InputHandler::key_to_char(&key) {
            Some('p') => {
                display.show_prompt("Enter some text from 'The Metamorphosis':")?;
                let Some(text) = input.read_line(prompts::random_phrase(&mut rng))? else {
                    continue;
                };
                display.show_hint("Predicting...")?;
                match predictor.predict_next(&text) {
                    Ok(prediction) => {
                        display.show_prediction(&prediction)?;
                        display.show_word_sequence(&words(&text), &[prediction.word])?;
                    }
                    Err(e) => display.show_hint(&format!("Prediction failed: {e}"))?,
                }
            }
            Some('g') => {
                let starter = prompts::random_starter(&mut rng);
                match predictor.generate(starter, GENERATED_SENTENCE_WORDS) {
                    Ok(generation) => display.show_generated(&generation.text)?,
                    Err(e) => display.show_hint(&format!("Generation failed: {e}"))?,
                }
            }
            Some('q') => {
                let question = QuizQuestion::random(&mut rng);
                display.show_prompt(question.question)?;
                let Some(answer) = input.read_line("")? else {
                    continue;
                };
                display.show_quiz_result(question.check(&answer))?;
            }
            Some('a') => display.show_about()?,
            _ => continue,
        }

        display.show_hint("\r\nPress any key to continue...")?;
        let key = input.wait_key()?;
        if InputHandler::is_exit(&key) {
            break 'session;
        }
    }

    display.shutdown()?;
    println!("Made by RS. Thanks for reading Kafka!");
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.debug);

    match &args.command {
        Some(Command::Migrate { output }) => {
            let bundle = ModelBundle::read(&args.model)?.migrated()?;
            bundle.write(output)?;
            info!(from = %args.model.display(), to = %output.display(), "bundle migrated");
        }
        Some(Command::Predict { text, words }) => {
            let predictor = load_predictor(&args)?;
            predict(&predictor, text, (*words).max(1))?;
        }
        Some(Command::Generate { start, words, seed }) => {
            let predictor = load_predictor(&args)?;
            let mut rng = rng_from(*seed);
            let starter = start
                .as_deref()
                .unwrap_or_else(|| prompts::random_starter(&mut rng));
            let generation = predictor.generate(starter, *words)?;
            Display::simple().show_generated(&generation.text)?;
        }
        Some(Command::Info { top }) => {
            let predictor = load_predictor(&args)?;
            let model = predictor.model();
            Display::simple().show_model_info(
                model.summary(),
                model.parameter_count(),
                model.input_len(),
                predictor.vocab().size(),
                predictor.vocab().most_frequent(*top),
            )?;
        }
        Some(Command::Interactive { seed }) => {
            let predictor = load_predictor(&args)?;
            run_interactive(&predictor, *seed)?;
        }
        None => {
            let predictor = load_predictor(&args)?;
            run_interactive(&predictor, None)?;
        }
    }

    Ok(())
}
