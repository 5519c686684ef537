use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use odin_feed::config::Config;
use odin_feed::feed::{Fetcher, RetryPolicy, DEFAULT_FEED_URL};
use odin_feed::pipeline::{run_cycle, PollContext};
use odin_feed::wizard::{
    DetailInput, Form, FormError, GroupInput, StepOutcome, Wizard, WizardMode, WizardStep,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::time::MissedTickBehavior;

/// Get the config directory path (~/.config/odin-feed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("odin-feed"))
}

#[derive(Parser, Debug)]
#[command(name = "odin-feed", about = "Poll the ODIN 112 alarm feed")]
struct Args {
    /// Config file (default: ~/.config/odin-feed/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override the feed URL (for testing against a local server)
    #[arg(long, value_name = "URL", global = true, hide = true)]
    feed_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the feed and print a JSON snapshot after every cycle
    Poll {
        /// Alarm group (beredskabsID)
        #[arg(long)]
        identifier: Option<String>,
        /// Station (enhed)
        #[arg(long)]
        station: Option<String>,
        /// Number of alarms to keep (1-20)
        #[arg(long)]
        count: Option<i64>,
        /// Seconds between cycles
        #[arg(long)]
        interval: Option<u64>,
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// List the alarm groups currently in the feed
    Groups,
    /// List the stations seen for an alarm group
    Stations { identifier: String },
    /// Choose group, station and count interactively and print the config
    Setup,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout is reserved for JSON output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("config.toml"),
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let fetcher = Fetcher::new(RetryPolicy::default()).context("Failed to create HTTP client")?;
    let feed_url = args.feed_url.as_deref().unwrap_or(DEFAULT_FEED_URL);

    match args.command {
        Command::Poll {
            identifier,
            station,
            count,
            interval,
            once,
        } => {
            if let Some(identifier) = identifier {
                config.identifier = identifier;
            }
            if let Some(station) = station {
                config.station = station;
            }
            if let Some(count) = count {
                config.count = count;
            }
            if let Some(interval) = interval {
                config.poll_interval_secs = interval;
            }
            poll(&fetcher, &config, feed_url, once).await
        }
        Command::Groups => {
            let mut wizard = Wizard::setup(fetcher, feed_url);
            let outcome = wizard.select_group(None).await;
            print_form(&outcome)
        }
        Command::Stations { identifier } => {
            let mut wizard = Wizard::setup(fetcher, feed_url);
            let outcome = wizard.select_group(Some(GroupInput { identifier })).await;
            print_form(&outcome)
        }
        Command::Setup => setup(fetcher, &config, feed_url).await,
    }
}

async fn poll(fetcher: &Fetcher, config: &Config, feed_url: &str, once: bool) -> Result<()> {
    let settings = config.feed_settings().with_feed_url(feed_url);
    let mut ctx = PollContext::new(settings);
    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        source = %ctx.settings().unique_id(),
        interval_secs = config.poll_interval().as_secs(),
        "Polling started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        // Ctrl-C drops the in-flight cycle; the published result is left as is
        let completed = tokio::select! {
            _ = run_cycle(fetcher, &mut ctx) => true,
            _ = tokio::signal::ctrl_c() => false,
        };
        if !completed {
            tracing::info!("Interrupted during a cycle, abandoning fetch");
            break;
        }

        let json = serde_json::to_string(&ctx.snapshot()).context("Failed to serialize snapshot")?;
        println!("{json}");

        if once {
            break;
        }
    }

    tracing::info!("Polling stopped");
    Ok(())
}

fn print_form(outcome: &StepOutcome) -> Result<()> {
    let json = serde_json::to_string_pretty(outcome).context("Failed to serialize form")?;
    println!("{json}");
    Ok(())
}

async fn setup(fetcher: Fetcher, config: &Config, feed_url: &str) -> Result<()> {
    let mut wizard = Wizard::start(fetcher, feed_url, config.wizard_mode(feed_url));
    if matches!(wizard.mode(), WizardMode::Reconfigure(_)) {
        eprintln!("Reconfiguring alarm group {}", config.identifier);
    }
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut outcome = wizard.select_group(None).await;
    loop {
        let form = match &outcome {
            StepOutcome::Complete(settings) => {
                let rendered = Config::from_settings(settings, config.poll_interval_secs)
                    .to_toml()
                    .context("Failed to render config")?;
                println!("{rendered}");
                return Ok(());
            }
            StepOutcome::Form(form) => form.clone(),
        };

        if form.error == Some(FormError::FetchError) {
            eprint!("Fetching the feed failed. Press Enter to retry: ");
            if lines.next_line().await.context("Failed to read from stdin")?.is_none() {
                anyhow::bail!("Setup aborted");
            }
            outcome = match form.step {
                WizardStep::SelectGroup => wizard.select_group(None).await,
                WizardStep::SelectDetail => wizard.select_detail(None).await,
            };
            continue;
        }

        show_form(&form);
        let Some(answer) = prompt(&mut lines, &form).await? else {
            anyhow::bail!("Setup aborted");
        };

        outcome = match form.step {
            WizardStep::SelectGroup => {
                let identifier = pick(&form, &answer);
                wizard.select_group(Some(GroupInput { identifier })).await
            }
            WizardStep::SelectDetail => {
                let station = pick(&form, &answer);
                let Some(count) = prompt_count(&mut lines, &form).await? else {
                    anyhow::bail!("Setup aborted");
                };
                wizard.select_detail(Some(DetailInput { station, count })).await
            }
        };
    }
}

fn show_form(form: &Form) {
    if let Some(error) = form.error {
        eprintln!("Error: {error:?}");
    }
    for (i, choice) in form.choices.iter().enumerate() {
        eprintln!("  {}) {}", i + 1, choice);
    }
}

/// Maps a numbered answer to its choice; anything else is taken literally,
/// and an empty answer takes the default.
fn pick(form: &Form, answer: &str) -> String {
    let answer = answer.trim();
    if answer.is_empty() {
        return form.default_choice.clone().unwrap_or_default();
    }
    answer
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| form.choices.get(i).cloned())
        .unwrap_or_else(|| answer.to_string())
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, form: &Form) -> Result<Option<String>> {
    let default = form.default_choice.as_deref().unwrap_or("");
    eprint!("Choice [{default}]: ");
    lines.next_line().await.context("Failed to read from stdin")
}

async fn prompt_count(lines: &mut Lines<BufReader<Stdin>>, form: &Form) -> Result<Option<i64>> {
    let Some(field) = form.count else {
        return Ok(None);
    };
    eprint!("Count {}-{} [{}]: ", field.min, field.max, field.default);
    let Some(line) = lines.next_line().await.context("Failed to read from stdin")? else {
        return Ok(None);
    };
    let line = line.trim();
    if line.is_empty() {
        return Ok(Some(i64::from(field.default)));
    }
    // Unparseable input is sent as 0 so the wizard reports it as out of range
    Ok(Some(line.parse().unwrap_or(0)))
}
