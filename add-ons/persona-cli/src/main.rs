//! Persona CLI: send one message, stream the reply, persist the exchange.
//!
//! Usage:
//!   cargo run -p persona-cli -- [--conversation ID] [--speak out.mp3] "What is photosynthesis?"
//!   echo "What is photosynthesis?" | cargo run -p persona-cli
//!   cargo run -p persona-cli -- --history ID
//!
//! Endpoints and storage come from `config/persona.toml` and `PERSONA__*` env vars.

use persona_chat::{
    ChatSession, CompletionClient, HttpTitleGenerator, HttpUsageTracker, NoopUsageTracker,
    PersistenceSequencer, UsageTracker,
};
use persona_core::{ChatConfig, MessageStore, SledMessageStore};
use persona_voice::{
    AudioClip, CaptureEngine, HttpSpeechSynthesizer, PlaybackSink, VoiceError, VoiceResult,
};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// The terminal has no microphone stream.
struct NoCapture;

impl CaptureEngine for NoCapture {
    fn start(&mut self) -> VoiceResult<()> {
        Err(VoiceError::Engine("voice capture is not available in the terminal".to_string()))
    }

    fn stop(&mut self) -> VoiceResult<()> {
        Ok(())
    }
}

/// Writes each played clip to a file instead of a speaker.
struct FileSink {
    path: Option<PathBuf>,
}

impl PlaybackSink for FileSink {
    type Handle = AudioClip;

    fn load(&self, bytes: Vec<u8>) -> VoiceResult<AudioClip> {
        Ok(AudioClip::new(bytes))
    }

    fn play(&self, handle: &AudioClip) -> VoiceResult<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if handle.is_released() {
            return Err(VoiceError::Playback("clip already released".to_string()));
        }
        std::fs::write(path, handle.bytes()).map_err(|e| VoiceError::Playback(e.to_string()))?;
        info!("Wrote {} bytes of audio to {}", handle.len(), path.display());
        Ok(())
    }

    fn stop(&self) {}
}

fn usage() {
    eprintln!("Persona — chat from the terminal");
    eprintln!("  MESSAGE                 Message to send (or pipe it on stdin)");
    eprintln!("  --conversation ID       Continue an existing conversation");
    eprintln!("  --speak FILE            Synthesize the reply and write the audio to FILE");
    eprintln!("  --history ID            Print a stored conversation and exit");
    eprintln!();
    eprintln!("Config: PERSONA_CONFIG (default config/persona) and PERSONA__* env vars.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let mut conversation: Option<String> = None;
    let mut speak: Option<PathBuf> = None;
    let mut history: Option<String> = None;
    let mut words: Vec<String> = Vec::new();

    while let Some(a) = args.next() {
        match a.as_str() {
            "--conversation" => conversation = args.next(),
            "--speak" => speak = args.next().map(PathBuf::from),
            "--history" => history = args.next(),
            "-h" | "--help" => {
                usage();
                return Ok(());
            }
            _ => words.push(a),
        }
    }

    let config = ChatConfig::load()?;
    let store: Arc<dyn MessageStore> = Arc::new(SledMessageStore::open_in(&config.storage_path)?);

    if let Some(id) = history {
        let Some(conv) = store.conversation(&id).await? else {
            eprintln!("No conversation {}", id);
            return Ok(());
        };
        println!("# {}", conv.title);
        for m in store.messages(&id).await? {
            println!("[{}] {}", m.role.as_str(), m.text);
        }
        return Ok(());
    }

    let mut message = words.join(" ");
    if message.trim().is_empty() {
        std::io::stdin().read_to_string(&mut message)?;
    }
    let message = message.trim().to_string();
    if message.is_empty() {
        usage();
        return Ok(());
    }

    let timeout = config.request_timeout();
    let titles = Arc::new(HttpTitleGenerator::new(
        config.title_url.clone(),
        config.api_key.clone(),
        timeout,
    )?);
    let usage_tracker: Arc<dyn UsageTracker> = match config.usage_url {
        Some(ref url) => Arc::new(HttpUsageTracker::new(url.clone(), config.api_key.clone(), timeout)?),
        None => Arc::new(NoopUsageTracker),
    };
    let sequencer = PersistenceSequencer::new(Arc::clone(&store), titles, usage_tracker)
        .with_assistant_delay(config.assistant_append_delay());
    let completion = Arc::new(CompletionClient::from_config(&config)?);
    let synthesizer = HttpSpeechSynthesizer::new(config.synthesis_url.clone(), config.api_key.clone(), timeout)?;

    let session = ChatSession::new(
        config,
        completion,
        sequencer,
        NoCapture,
        synthesizer,
        FileSink { path: speak.clone() },
    );
    if let Some(id) = conversation {
        session.resume(id).await;
    }

    let mut reply_rx = session.subscribe_reply();
    let printer = tokio::spawn(async move {
        let mut printed = String::new();
        while reply_rx.changed().await.is_ok() {
            let Some(msg) = reply_rx.borrow_and_update().clone() else {
                continue;
            };
            if !msg.is_streaming && msg.text == printed {
                continue;
            }
            if msg.text.starts_with(&printed) {
                print!("{}", &msg.text[printed.len()..]);
            } else {
                print!("\n{}", msg.text);
            }
            let _ = std::io::stdout().flush();
            printed = msg.text;
        }
        println!();
    });

    let result = session.submit(message, Vec::new()).await;
    let outcome = match result {
        Ok(exchange) => {
            if let Some(ref e) = exchange.report.error {
                warn!("Reply not saved: {}", e);
            }
            if speak.is_some() {
                if let Err(e) = session.speak(&exchange.reply.text).await {
                    warn!("Could not synthesize reply: {}", e);
                }
            }
            if let Some(task) = exchange.report.title_task {
                if let Ok(title) = task.await {
                    info!("Conversation title: {}", title);
                }
            }
            if let Some(id) = exchange.report.conversation_id {
                info!("Conversation: {}", id);
            }
            Ok(())
        }
        Err(e) => Err(e),
    };

    session.teardown().await;
    drop(session);
    let _ = printer.await;
    outcome.map_err(|e| e.into())
}
