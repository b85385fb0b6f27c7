use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use safepath_agent::speech::{audio_player_html, SpeechClient};
use safepath_agent::{AgentGraph, AgentRegistry};
use safepath_core::config::{AppConfig, LogFormat};
use safepath_core::domain::conversation::ThreadId;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::commands::{load_options, CommandResult, EXIT_AGENT, EXIT_CONFIG, EXIT_RUNTIME};

const EXIT_WORDS: [&str; 2] = ["exit", "quit"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub thread_id: ThreadId,
    pub turns: usize,
    pub failed_turns: usize,
}

/// Writes a self-contained HTML audio player per spoken reply.
pub struct Narrator {
    speech: SpeechClient,
    directory: PathBuf,
    written: usize,
}

impl Narrator {
    pub fn new(speech: SpeechClient, directory: impl Into<PathBuf>) -> Self {
        Self { speech, directory: directory.into(), written: 0 }
    }

    pub async fn speak(&mut self, text: &str) -> Result<Option<PathBuf>> {
        let Some(audio) = self.speech.text_to_speech(text, self.speech.default_speed()).await else {
            return Ok(None);
        };

        self.written += 1;
        let path = self.directory.join(format!("reply-{:03}.html", self.written));
        tokio::fs::write(&path, audio_player_html(&audio))
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(Some(path))
    }
}

pub fn run(config_path: Option<&Path>, agent: Option<&str>, audio_dir: Option<&Path>) -> CommandResult {
    let config = match AppConfig::load(load_options(config_path)) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("chat", "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };
    init_logging(&config);

    let registry = match AgentRegistry::from_config(&config) {
        Ok(registry) => registry,
        Err(error) => {
            return CommandResult::failure("chat", "agent_setup", error.to_string(), EXIT_AGENT)
        }
    };
    let key = agent.unwrap_or(registry.default_key()).to_string();
    let graph = match registry.graph(&key) {
        Ok(graph) => graph,
        Err(error) => {
            return CommandResult::failure("chat", "unknown_agent", error.to_string(), EXIT_AGENT)
        }
    };

    let mut narrator = match audio_dir {
        Some(directory) => match prepare_narrator(&config, directory) {
            Ok(narrator) => Some(narrator),
            Err(error) => {
                return CommandResult::failure("chat", "speech_setup", format!("{error:#}"), EXIT_RUNTIME)
            }
        },
        None => None,
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure("chat", "runtime", error.to_string(), EXIT_RUNTIME)
        }
    };

    let outcome = runtime.block_on(async {
        let input = BufReader::new(tokio::io::stdin());
        let mut output = tokio::io::stdout();
        chat_session(&graph, input, &mut output, narrator.as_mut()).await
    });

    match outcome {
        Ok(summary) => CommandResult::success(
            "chat",
            format!(
                "thread {} closed after {} turns ({} failed)",
                summary.thread_id, summary.turns, summary.failed_turns
            ),
        ),
        Err(error) => CommandResult::failure("chat", "io", format!("{error:#}"), EXIT_RUNTIME),
    }
}

fn prepare_narrator(config: &AppConfig, directory: &Path) -> Result<Narrator> {
    fs::create_dir_all(directory)
        .with_context(|| format!("creating audio directory {}", directory.display()))?;
    let speech = SpeechClient::from_config(&config.speech).context("building speech client")?;
    Ok(Narrator::new(speech, directory))
}

/// Opens a thread, prints the greeting, then answers one line at a time
/// until end of input or an exit word. Turn failures are reported inline.
pub async fn chat_session<R, W>(
    graph: &AgentGraph,
    input: R,
    output: &mut W,
    mut narrator: Option<&mut Narrator>,
) -> Result<SessionSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let opening = graph.open(None).await.context("opening conversation")?;
    let thread_id = opening.thread_id.clone();
    write_reply(output, opening.reply.content(), narrator.as_deref_mut()).await?;

    let mut summary = SessionSummary { thread_id: thread_id.clone(), turns: 0, failed_turns: 0 };
    let mut lines = input.lines();

    loop {
        output.write_all(b"you> ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if EXIT_WORDS.iter().any(|word| text.eq_ignore_ascii_case(word)) {
            break;
        }

        summary.turns += 1;
        match graph.invoke(Some(thread_id.clone()), text).await {
            Ok(report) => {
                write_reply(output, report.reply.content(), narrator.as_deref_mut()).await?
            }
            Err(error) => {
                summary.failed_turns += 1;
                output.write_all(format!("error> {error}\n").as_bytes()).await?;
            }
        }
    }

    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(summary)
}

async fn write_reply<W>(output: &mut W, text: &str, narrator: Option<&mut Narrator>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(format!("assistant> {text}\n").as_bytes()).await?;
    if let Some(narrator) = narrator {
        if let Some(path) = narrator.speak(text).await? {
            output.write_all(format!("audio> {}\n", path.display()).as_bytes()).await?;
        }
    }
    Ok(())
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
