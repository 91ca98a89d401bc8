use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dopple_connectome::{
    Connectome, ConnectomeAnalytics, ConnectomeReport, ConnectomeStore, NodeType,
};
use dopple_memory_data::ConversationMemory;
use dopple_nlp::{ExtractiveSummarizer, LexiconAnalyzer, Role};
use dopple_orchestrator::{DoppleConfig, DoppleService, FilePersistence, OrchestratorError};
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    runtime::Runtime,
};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "dopple", version, about = "Dopple connectome and conversation tools")]
struct Cli {
    /// TOML configuration; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prints analytics for a connectome JSON document.
    Report {
        connectome: PathBuf,
        /// Emit the full report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Feeds a transcript through conversation memory and prints the result.
    Replay {
        transcript: PathBuf,
        #[arg(long, default_value = "dopple")]
        dopple_id: String,
        #[arg(long, default_value = "replay")]
        conversation_id: String,
        /// Writes the final conversation snapshot here.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Interactive conversation persisted under a directory.
    Chat {
        #[arg(long, default_value = "dopple")]
        dopple_id: String,
        #[arg(long, default_value = "default")]
        conversation_id: String,
        #[arg(long, default_value = "data/conversations")]
        store: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => DoppleConfig::load(path)?,
        None => DoppleConfig::default(),
    };
    match cli.command {
        Commands::Report { connectome, json } => report(&config, &connectome, json),
        Commands::Replay {
            transcript,
            dopple_id,
            conversation_id,
            out,
        } => {
            let runtime = Runtime::new()?;
            runtime.block_on(replay(
                &config,
                &transcript,
                &dopple_id,
                &conversation_id,
                out.as_deref(),
            ))
        }
        Commands::Chat {
            dopple_id,
            conversation_id,
            store,
        } => {
            let runtime = Runtime::new()?;
            runtime.block_on(chat(&config, &dopple_id, &conversation_id, store))
        }
    }
}

fn report(config: &DoppleConfig, path: &Path, json: bool) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading connectome {}", path.display()))?;
    let connectome =
        Connectome::from_json(&raw).with_context(|| format!("parsing {}", path.display()))?;
    // Reject dangling edges and out-of-range values before analysing.
    ConnectomeStore::from_connectome(config.connectome, connectome.clone())
        .with_context(|| format!("validating {}", path.display()))?;
    let report = ConnectomeAnalytics::new(&connectome).report(&config.analytics);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

fn render_report(report: &ConnectomeReport) -> String {
    let mut out = format!(
        "nodes: {}  edges: {}  density: {:.3}  complexity: {}/100\n",
        report.node_count, report.edge_count, report.density, report.complexity
    );
    let counts = report
        .type_counts
        .iter()
        .map(|(node_type, count)| format!("{node_type}={count}"))
        .collect::<Vec<_>>()
        .join(" ");
    out.push_str(&format!("types: {counts}\n"));
    if let Some(dominant) = report.dominant_type {
        out.push_str(&format!("dominant: {dominant}\n"));
    }
    if !report.strongest.is_empty() {
        out.push_str("strongest:\n");
        for node in &report.strongest {
            out.push_str(&format!(
                "  {:<24} {:<8} {:>5.2}\n",
                node.name,
                node.node_type.as_str(),
                node.strength
            ));
        }
    }
    for cluster in &report.clusters {
        out.push_str(&format!("cluster {}: {}\n", cluster.name, cluster.nodes.join(", ")));
    }
    for insight in &report.insights {
        out.push_str(&format!("* {}: {}\n", insight.title, insight.text));
    }
    for topic in &report.recommended_topics {
        out.push_str(&format!("? {} ({})\n", topic.topic, topic.reason));
    }
    out
}

#[derive(Deserialize)]
struct TranscriptLine {
    role: Role,
    content: String,
}

/// Parses `role: text` lines or JSON lines `{"role": .., "content": ..}`.
/// Blank lines and `#` comments are skipped.
fn parse_transcript(raw: &str) -> Result<Vec<(Role, String)>> {
    let mut lines = Vec::new();
    for (number, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('{') {
            let parsed: TranscriptLine = serde_json::from_str(line)
                .with_context(|| format!("line {}: invalid JSON", number + 1))?;
            lines.push((parsed.role, parsed.content));
            continue;
        }
        let Some((role, content)) = line.split_once(':') else {
            bail!("line {}: expected `role: text`", number + 1);
        };
        let role = match role.trim().to_ascii_lowercase().as_str() {
            "user" => Role::User,
            "dopple" | "assistant" => Role::Dopple,
            "system" => Role::System,
            other => bail!("line {}: unknown role `{other}`", number + 1),
        };
        lines.push((role, content.trim().to_string()));
    }
    Ok(lines)
}

async fn replay(
    config: &DoppleConfig,
    path: &Path,
    dopple_id: &str,
    conversation_id: &str,
    out: Option<&Path>,
) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading transcript {}", path.display()))?;
    let transcript = parse_transcript(&raw)?;
    let mut memory = ConversationMemory::new(
        dopple_id,
        conversation_id,
        config.memory.clone(),
        Arc::new(LexiconAnalyzer::new(config.analyzer)),
        Arc::new(ExtractiveSummarizer),
    )?
    .with_store(ConnectomeStore::new(config.connectome));
    for (role, content) in transcript {
        memory.add_message(role, content).await?;
    }
    debug!(entries = memory.entries().len(), "transcript replayed");

    let context = memory.context_for_generation();
    println!(
        "messages: {}  summaries: {}  stage: {}  context tokens: {}",
        memory.messages().count(),
        memory.summaries().count(),
        memory.stage(),
        context.estimated_tokens
    );
    for summary in memory.summaries() {
        println!("- {}", summary.condensed_text);
    }
    let connectome = memory.connectome();
    print!(
        "{}",
        render_report(&ConnectomeAnalytics::new(&connectome).report(&config.analytics))
    );
    if let Some(out) = out {
        fs::write(out, serde_json::to_vec_pretty(&memory.snapshot())?)
            .with_context(|| format!("writing snapshot {}", out.display()))?;
    }
    Ok(())
}

async fn chat(
    config: &DoppleConfig,
    dopple_id: &str,
    conversation_id: &str,
    store: PathBuf,
) -> Result<()> {
    let service = DoppleService::from_config(config, Arc::new(FilePersistence::new(store)))?;
    println!("Chatting as {dopple_id}/{conversation_id}. Commands: /top, /end, /quit");
    let mut reader = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        io::stdout().flush()?;
        let Some(line) = reader.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/end" => {
                service.end_conversation(dopple_id, conversation_id).await?;
                println!("conversation closed");
                break;
            }
            "/top" => {
                for node_type in NodeType::ALL {
                    let top = service
                        .top_nodes(dopple_id, conversation_id, node_type, 3)
                        .await?;
                    let names = top
                        .iter()
                        .map(|node| format!("{} ({:.1})", node.name, node.strength))
                        .collect::<Vec<_>>()
                        .join(", ");
                    println!("{node_type}: {names}");
                }
            }
            content => match service
                .generate_response(dopple_id, conversation_id, content)
                .await
            {
                Ok(turn) => println!("{dopple_id}> {}", turn.message.content),
                Err(err @ OrchestratorError::GenerationFailure(_)) => {
                    eprintln!("{err}; your message was kept");
                }
                Err(err) => return Err(err.into()),
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_both_transcript_forms() {
        let raw = "# header\nuser: I love music\n\n{\"role\":\"dopple\",\"content\":\"Me too\"}\nSystem: note: kept\n";
        let lines = parse_transcript(raw).unwrap();
        assert_eq!(
            lines,
            [
                (Role::User, "I love music".to_string()),
                (Role::Dopple, "Me too".to_string()),
                (Role::System, "note: kept".to_string()),
            ]
        );
        assert!(parse_transcript("robot: hi").is_err());
        assert!(parse_transcript("no separator").is_err());
    }

    #[test]
    fn report_text_lists_strongest_nodes() {
        let mut store = ConnectomeStore::default();
        let a = store.reinforce_node("curious", NodeType::Trait, 5.0).unwrap().id;
        let b = store.reinforce_node("music", NodeType::Interest, 3.0).unwrap().id;
        store.reinforce_edge(&a, &b, 6.0).unwrap();
        let connectome = store.connectome();
        let text = render_report(
            &ConnectomeAnalytics::new(&connectome).report(&DoppleConfig::default().analytics),
        );
        assert!(text.starts_with("nodes: 2  edges: 1"));
        assert!(text.contains("curious"));
        assert!(text.contains("dominant: "));
    }

    #[test]
    fn replay_writes_snapshot() {
        let dir = tempdir().unwrap();
        let transcript = dir.path().join("t.txt");
        fs::write(&transcript, "user: I'm happy at work\ndopple: great\n").unwrap();
        let out = dir.path().join("snapshot.json");
        let runtime = Runtime::new().unwrap();
        runtime
            .block_on(replay(
                &DoppleConfig::default(),
                &transcript,
                "d",
                "c",
                Some(&out),
            ))
            .unwrap();
        let snapshot: dopple_memory_data::ConversationSnapshot =
            serde_json::from_str(&fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(snapshot.entries.len(), 2);
        assert_eq!(snapshot.connectome.nodes.len(), 2);
    }
}
