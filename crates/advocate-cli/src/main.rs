use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use advocate_core::config_file::ConfigFile;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod output;

use output::ColorMode;

/// Brief Advocate - Extract key passages from a legal brief and argue both sides
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug-level logging for the advocate crates
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a PDF brief: rank its key passages and synthesize for/against arguments
    Analyze {
        /// Path to the PDF file to analyze
        file_path: PathBuf,

        /// Ollama model name
        #[arg(long)]
        model: Option<String>,

        /// Base URL of the Ollama server
        #[arg(long)]
        ollama_url: Option<String>,

        /// Completion timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Extraction worker count
        #[arg(long)]
        workers: Option<usize>,

        /// Skip the model entirely and build arguments from the excerpts
        #[arg(long)]
        no_llm: bool,

        /// Disable the result cache for this run
        #[arg(long)]
        no_cache: bool,

        /// Print the full analysis as JSON instead of a report
        #[arg(long)]
        json: bool,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Path to output log file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Inspect or clear the persistent result cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Print entry counts for the cache database
    Stats,
    /// Remove every cached result
    Clear,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the resolved config file location
    Path,
    /// Write a commented default config file
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Analyze {
            file_path,
            model,
            ollama_url,
            timeout,
            workers,
            no_llm,
            no_cache,
            json,
            quiet,
            no_color,
            output,
        } => {
            analyze(
                file_path, model, ollama_url, timeout, workers, no_llm, no_cache, json, quiet,
                no_color, output,
            )
            .await
        }
        Command::Cache { command } => match command {
            CacheCommand::Stats => cache_stats(),
            CacheCommand::Clear => cache_clear(),
        },
        Command::Config { command } => match command {
            ConfigCommand::Path => show_config_path(),
            ConfigCommand::Init => init_config(),
        },
    }
}

fn init_tracing(verbose: bool) {
    let default_directives = if verbose {
        "warn,advocate_core=debug,advocate_pdf_lopdf=debug,advocate_cli=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[allow(clippy::too_many_arguments)]
async fn analyze(
    file_path: PathBuf,
    model: Option<String>,
    ollama_url: Option<String>,
    timeout: Option<u64>,
    workers: Option<usize>,
    no_llm: bool,
    no_cache: bool,
    json: bool,
    quiet: bool,
    no_color: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let file_config = advocate_core::config_file::load_config();

    // Resolve configuration: CLI flags > env vars > config file > defaults
    let settings = resolve_settings(
        model,
        ollama_url,
        timeout,
        workers,
        std::env::var("ADVOCATE_MODEL").ok(),
        std::env::var("ADVOCATE_OLLAMA_URL").ok(),
        &file_config,
    );

    let cache_enabled = !no_cache
        && file_config
            .cache
            .as_ref()
            .and_then(|c| c.enabled)
            .unwrap_or(true);
    let cache_path = if cache_enabled {
        resolve_cache_path(&file_config)
    } else {
        None
    };

    // Determine color mode and output writer
    let use_color = !no_color && output.is_none();
    let color = ColorMode(use_color);

    let mut writer: Box<dyn Write> = if let Some(ref output_path) = output {
        Box::new(std::fs::File::create(output_path)?)
    } else {
        Box::new(std::io::stdout())
    };

    if !file_path.exists() {
        anyhow::bail!("File not found: {}", file_path.display());
    }

    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.display().to_string());

    let result_cache = if cache_enabled {
        Some(advocate_core::build_result_cache(cache_path.as_deref()))
    } else {
        None
    };

    let backend = advocate_pdf_lopdf::LopdfBackend::new();
    let ollama = (!no_llm).then(|| {
        advocate_core::OllamaBackend::new(
            settings.ollama_url.as_str(),
            settings.model.as_str(),
            Duration::from_secs(settings.timeout_secs),
        )
    });
    let llm = ollama
        .as_ref()
        .map(|b| b as &dyn advocate_core::CompletionBackend);

    let config = advocate_core::Config {
        model: settings.model,
        ollama_url: settings.ollama_url,
        llm_timeout_secs: settings.timeout_secs,
        llm_max_tokens: settings.max_tokens,
        num_workers: settings.num_workers,
        result_cache,
        cache_path,
        in_flight: Arc::new(advocate_core::InFlightLocks::default()),
    };

    // Progress spinner on stderr; stdout stays clean for the report.
    let spinner = if quiet || json {
        None
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}").unwrap());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message(format!("Analyzing {}...", file_name));
        Some(bar)
    };

    let event_spinner = spinner.clone();
    let progress_cb = move |event: advocate_core::ProgressEvent| {
        let Some(ref bar) = event_spinner else {
            return;
        };
        match event {
            advocate_core::ProgressEvent::Hashed { content_hash } => {
                let short = &content_hash[..12.min(content_hash.len())];
                bar.set_message(format!("Hashed content ({})", short));
            }
            advocate_core::ProgressEvent::CacheHit => {
                bar.set_message("Found a cached analysis for this document");
            }
            advocate_core::ProgressEvent::WaitingOnDuplicate => {
                bar.set_message("Waiting for an in-flight analysis of the same document...");
            }
            advocate_core::ProgressEvent::Extracting {
                page_count,
                selected_pages,
            } => {
                bar.set_message(format!(
                    "Extracting {} of {} pages...",
                    selected_pages, page_count
                ));
            }
            advocate_core::ProgressEvent::PageDone { page, excerpts } => {
                bar.set_message(format!("Page {}: {} excerpts kept", page, excerpts));
            }
            advocate_core::ProgressEvent::Synthesizing { excerpts, backend } => {
                bar.set_message(format!(
                    "Synthesizing arguments from {} excerpts via {}...",
                    excerpts, backend
                ));
            }
            advocate_core::ProgressEvent::FallbackUsed => {
                bar.set_message("Model unavailable, building rule-based arguments");
            }
            advocate_core::ProgressEvent::Stored => {
                bar.set_message("Result cached");
            }
        }
    };

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let result =
        advocate_core::analyze_document(&file_path, &backend, llm, &config, progress_cb, cancel)
            .await;

    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    let analysis = result?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&analysis)?)?;
        return Ok(());
    }

    output::print_report_header(&mut writer, &file_name, &analysis, color)?;
    output::print_arguments(&mut writer, &analysis, color)?;
    output::print_excerpts(&mut writer, &analysis, color)?;

    Ok(())
}

/// Connection and pipeline settings for one analyze run.
#[derive(Debug)]
struct AnalyzeSettings {
    model: String,
    ollama_url: String,
    timeout_secs: u64,
    max_tokens: u32,
    num_workers: usize,
}

/// Apply the precedence chain: CLI flag > environment variable > config
/// file > built-in default. The caller supplies the environment values.
fn resolve_settings(
    model_flag: Option<String>,
    url_flag: Option<String>,
    timeout_flag: Option<u64>,
    workers_flag: Option<usize>,
    env_model: Option<String>,
    env_url: Option<String>,
    file_config: &ConfigFile,
) -> AnalyzeSettings {
    let llm = file_config.llm.as_ref();
    AnalyzeSettings {
        model: model_flag
            .or(env_model)
            .or_else(|| llm.and_then(|l| l.model.clone()))
            .unwrap_or_else(|| advocate_core::DEFAULT_MODEL.to_string()),
        ollama_url: url_flag
            .or(env_url)
            .or_else(|| llm.and_then(|l| l.base_url.clone()))
            .unwrap_or_else(|| advocate_core::DEFAULT_OLLAMA_URL.to_string()),
        timeout_secs: timeout_flag
            .or_else(|| llm.and_then(|l| l.timeout_secs))
            .unwrap_or(120),
        max_tokens: llm.and_then(|l| l.max_tokens).unwrap_or(1024),
        num_workers: workers_flag
            .or_else(|| file_config.extraction.as_ref().and_then(|e| e.workers))
            .unwrap_or(advocate_core::MAX_EXTRACTION_WORKERS),
    }
}

/// Cache database location: config file `[cache].path`, else the platform
/// cache directory.
fn resolve_cache_path(file_config: &ConfigFile) -> Option<PathBuf> {
    file_config
        .cache
        .as_ref()
        .and_then(|c| c.path.clone())
        .map(PathBuf::from)
        .or_else(advocate_core::config_file::default_cache_path)
}

fn cache_stats() -> anyhow::Result<()> {
    let file_config = advocate_core::config_file::load_config();
    let Some(path) = resolve_cache_path(&file_config) else {
        anyhow::bail!("Could not determine the cache directory");
    };

    if !path.exists() {
        println!("No cache database at {}", path.display());
        return Ok(());
    }

    let cache = advocate_core::ResultCache::open(&path)
        .map_err(|e| anyhow::anyhow!("Failed to open cache at {}: {}", path.display(), e))?;
    let stats = cache.stats();
    println!("Cache: {}", path.display());
    println!("  Persisted results: {}", stats.l2_entries);
    Ok(())
}

fn cache_clear() -> anyhow::Result<()> {
    let file_config = advocate_core::config_file::load_config();
    let Some(path) = resolve_cache_path(&file_config) else {
        anyhow::bail!("Could not determine the cache directory");
    };

    if !path.exists() {
        println!("No cache database at {}", path.display());
        return Ok(());
    }

    let cache = advocate_core::ResultCache::open(&path)
        .map_err(|e| anyhow::anyhow!("Failed to open cache at {}: {}", path.display(), e))?;
    let removed = cache.disk_len();
    cache.clear();
    println!("Removed {} cached results from {}", removed, path.display());
    Ok(())
}

fn show_config_path() -> anyhow::Result<()> {
    let Some(path) = advocate_core::config_file::config_path() else {
        anyhow::bail!("Could not determine the platform config directory");
    };
    let status = if path.exists() {
        ""
    } else {
        " (not created yet)"
    };
    println!("{}{}", path.display(), status);

    let cwd_override = PathBuf::from(".advocate.toml");
    if cwd_override.exists() {
        println!("Overridden by .advocate.toml in the working directory");
    }
    Ok(())
}

fn init_config() -> anyhow::Result<()> {
    let Some(path) = advocate_core::config_file::config_path() else {
        anyhow::bail!("Could not determine the platform config directory");
    };
    if path.exists() {
        anyhow::bail!("Config file already exists: {}", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, DEFAULT_CONFIG_TOML)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

const DEFAULT_CONFIG_TOML: &str = r#"# Brief Advocate configuration.
#
# Values here sit below command-line flags and ADVOCATE_* environment
# variables in precedence. A .advocate.toml in the working directory
# overrides this file.

[llm]
# base_url = "http://localhost:11434"
# model = "mistral"
# timeout_secs = 120
# max_tokens = 1024

[cache]
# Persistent result cache. Defaults to the platform cache directory.
# path = "/path/to/results.db"
# enabled = true

[extraction]
# Worker pool width for page extraction.
# workers = 4
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use advocate_core::config_file::{ExtractionConfig, LlmConfig};

    fn full_file_config() -> ConfigFile {
        ConfigFile {
            llm: Some(LlmConfig {
                base_url: Some("http://filehost:11434".to_string()),
                model: Some("file-model".to_string()),
                timeout_secs: Some(30),
                max_tokens: Some(512),
            }),
            cache: None,
            extraction: Some(ExtractionConfig { workers: Some(2) }),
        }
    }

    #[test]
    fn flags_beat_environment_and_file() {
        let settings = resolve_settings(
            Some("flag-model".to_string()),
            Some("http://flaghost:11434".to_string()),
            Some(7),
            Some(1),
            Some("env-model".to_string()),
            Some("http://envhost:11434".to_string()),
            &full_file_config(),
        );
        assert_eq!(settings.model, "flag-model");
        assert_eq!(settings.ollama_url, "http://flaghost:11434");
        assert_eq!(settings.timeout_secs, 7);
        assert_eq!(settings.num_workers, 1);
    }

    #[test]
    fn environment_beats_config_file() {
        let settings = resolve_settings(
            None,
            None,
            None,
            None,
            Some("env-model".to_string()),
            Some("http://envhost:11434".to_string()),
            &full_file_config(),
        );
        assert_eq!(settings.model, "env-model");
        assert_eq!(settings.ollama_url, "http://envhost:11434");
    }

    #[test]
    fn config_file_beats_defaults() {
        let settings = resolve_settings(None, None, None, None, None, None, &full_file_config());
        assert_eq!(settings.model, "file-model");
        assert_eq!(settings.ollama_url, "http://filehost:11434");
        assert_eq!(settings.timeout_secs, 30);
        assert_eq!(settings.max_tokens, 512);
        assert_eq!(settings.num_workers, 2);
    }

    #[test]
    fn defaults_when_nothing_is_configured() {
        let settings = resolve_settings(None, None, None, None, None, None, &ConfigFile::default());
        assert_eq!(settings.model, advocate_core::DEFAULT_MODEL);
        assert_eq!(settings.ollama_url, advocate_core::DEFAULT_OLLAMA_URL);
        assert_eq!(settings.timeout_secs, 120);
        assert_eq!(settings.max_tokens, 1024);
        assert_eq!(settings.num_workers, advocate_core::MAX_EXTRACTION_WORKERS);
    }

    #[test]
    fn partial_llm_section_falls_back_per_field() {
        let config = ConfigFile {
            llm: Some(LlmConfig {
                model: Some("file-model".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let settings = resolve_settings(None, None, None, None, None, None, &config);
        assert_eq!(settings.model, "file-model");
        assert_eq!(settings.ollama_url, advocate_core::DEFAULT_OLLAMA_URL);
        assert_eq!(settings.timeout_secs, 120);
        assert_eq!(settings.num_workers, advocate_core::MAX_EXTRACTION_WORKERS);
    }
}
