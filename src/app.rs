use std::process::ExitCode;
use std::time::Duration;

use clap::{error::ErrorKind, CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::enumerator::Mode;
use crate::output::{self, OutputFormat};
use crate::runner::{self, Options, Runner, ScanResult, WordlistSource};

const EXIT_INTERRUPTED: u8 = 130;

fn print_banner() {
    const BANNER: &str = r#"
    ____        __  __   _  __
   / __ \____ _/ /_/ /_ | |/ /
  / /_/ / __ `/ __/ __ \|   /
 / ____/ /_/ / /_/ / / /   |
/_/    \__,_/\__/_/ /_/_/|_|
"#;
    print!("{}", BANNER);
    println!();
    println!("v{}", env!("CARGO_PKG_VERSION"));
}

fn format_kv_line(label: &str, value: &str) {
    println!("{:<12}: {}", label, value);
}

fn print_scan_summary(run: &RunConfig) {
    let rule = "-".repeat(47);
    println!("{}", rule);
    format_kv_line("METHOD", "GET");
    format_kv_line("URL", &run.options.url);
    format_kv_line("MODE", run.options.mode.label());
    format_kv_line(
        "TIMEOUT",
        &crate::probe::effective_timeout(run.options.timeout_seconds)
            .as_secs()
            .to_string(),
    );
    format_kv_line("RATE LIMIT", &run.options.rate.to_string());
    format_kv_line(
        "CONCURRENCY",
        &run.options
            .concurrency
            .unwrap_or(run.options.rate)
            .to_string(),
    );
    format_kv_line("STATUS CODE", "200-208, 300-308, 401, 403");
    if let Some(code) = run.options.ignore_status {
        format_kv_line("IGNORE", &code.to_string());
    }
    if let Some(path) = run.options.output.as_deref() {
        format_kv_line("OUTPUT", path);
    }
    println!("{}", rule);
}

fn print_run_stats(result: &ScanResult) {
    println!(
        "{}",
        output::info_line(&format!(
            "ELAPSED TIME : {:.2}",
            result.elapsed.as_secs_f64()
        ))
    );
    println!(
        "{}",
        output::info_line(&format!("FOUND : {}", result.stats.found))
    );
    println!(
        "{}",
        output::error_line(&format!("ERRORS ENCOUNTERED : {}", result.stats.errors))
    );
}

#[derive(Clone, Debug)]
struct RunConfig {
    options: Options,
    workers: usize,
    no_color: bool,
    no_progress: bool,
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let mode = match args.mode {
        Some(mode) => mode,
        None => match cfg.mode.as_deref() {
            Some(raw) => {
                Mode::parse(raw).ok_or_else(|| format!("invalid mode '{raw}' in config"))?
            }
            None => Mode::Dir,
        },
    };

    let rate = args
        .rate_limit
        .or(cfg.rate_limit)
        .unwrap_or(runner::DEFAULT_RATE);
    if rate == 0 {
        return Err("invalid rate_limit 0 in config, expected positive integer".to_string());
    }
    let concurrency = args.concurrency.or(cfg.concurrency);
    if concurrency == Some(0) {
        return Err("invalid concurrency 0 in config, expected positive integer".to_string());
    }
    let timeout_seconds = args
        .timeout
        .or(cfg.timeout)
        .unwrap_or(crate::probe::TIMEOUT_FLOOR_SECS);
    let workers = args.workers.or(cfg.workers).unwrap_or(10).max(1);

    let output = args.output.or(cfg.output);
    let output_format = match args.output_format {
        Some(format) => format,
        None => match cfg.output_format.as_deref() {
            Some(raw) => OutputFormat::parse(raw)
                .ok_or_else(|| format!("invalid output_format '{raw}' in config"))?,
            None => output
                .as_deref()
                .and_then(output::infer_format_from_path)
                .unwrap_or_default(),
        },
    };

    let follow_redirects = !args.no_redirects && cfg.follow_redirects.unwrap_or(true);
    let no_color = args.no_color || cfg.no_color.unwrap_or(false);
    let no_progress = args.no_progress || cfg.no_progress.unwrap_or(false);

    Ok(RunConfig {
        options: Options {
            url: args.url.trim().to_string(),
            wordlist: WordlistSource::FilePath(config::expand_tilde_string(args.wordlist.trim())),
            mode,
            ignore_status: args
                .ignore_status_code
                .or(cfg.ignore_status_code)
                .filter(|&code| code != 0),
            rate,
            concurrency,
            timeout_seconds,
            output: output.map(|p| config::expand_tilde_string(&p)),
            output_format,
            user_agent: args.user_agent.or(cfg.user_agent),
            proxy: args.proxy.or(cfg.proxy),
            follow_redirects,
        },
        workers,
        no_color,
        no_progress,
    })
}

fn build_progress_bar(total: usize, hidden: bool) -> Result<ProgressBar, String> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(total.max(1) as u64);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(200));
    pb.set_style(
        ProgressStyle::with_template(
            ":: Progress: [{pos}/{len}] :: {per_sec} :: Duration: [{elapsed_precise}] ::",
        )
        .map_err(|e| format!("failed to build progress bar style: {e}"))?
        .progress_chars(r#"#>-"#),
    );
    Ok(pb)
}

async fn run_async(run: RunConfig) -> Result<ExitCode, String> {
    if run.no_color {
        colored::control::set_override(false);
    }
    print_banner();
    print_scan_summary(&run);

    let runner = Runner::new(run.options.clone()).map_err(|e| e.to_string())?;
    let total = runner.count_candidates().await.map_err(|e| e.to_string())?;
    println!(
        "{}",
        output::info_line(&format!("TOTAL REQUESTS : {}", total))
    );

    let pb = build_progress_bar(total, run.no_progress)?;

    let cancel = CancellationToken::new();
    let interrupt_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let result = runner.run_until(cancel, pb.clone()).await;
    interrupt_handle.abort();
    pb.finish_and_clear();
    let result = result.map_err(|e| e.to_string())?;

    if result.interrupted {
        println!(
            "{}",
            output::error_line("KEYBOARD INTERRUPT TRIGGERED!")
        );
        print_run_stats(&result);
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }

    print_run_stats(&result);
    Ok(ExitCode::SUCCESS)
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pathx=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run_cli() -> Result<ExitCode, String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp => {
                let mut cmd = CliArgs::command();
                print!("{}", cmd.render_long_help());
                return Ok(ExitCode::SUCCESS);
            }
            ErrorKind::DisplayVersion => {
                let cmd = CliArgs::command();
                print!("{}", cmd.render_version());
                return Ok(ExitCode::SUCCESS);
            }
            _ => return Err(e.to_string()),
        },
    };

    init_tracing();

    let cfg = match args.config.as_deref() {
        Some(path) => config::load_config(&config::expand_tilde(path), false)?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true)?,
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(run.workers)
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    let status = rt.block_on(run_async(run));
    // in-flight DNS lookups run on blocking threads; don't wait for them
    rt.shutdown_background();
    status
}
