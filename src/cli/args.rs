use clap::{ArgAction, Parser};

use crate::enumerator::Mode;
use crate::output::OutputFormat;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pathx",
    version,
    about = "rate-limited directory and subdomain brute-forcer",
    long_about = "PathX requests one URL per word list entry and reports every response whose status is 200-208, 300-308, 401 or 403.\n\nExamples:\n  pathx -u https://target.tld -w words.txt\n  pathx -u target.tld -w subdomains.txt -m sub --rate-limit 32\n  pathx -u https://target.tld -w words.txt -i 403 -o found.txt\n\nTip: Use --config to persist scan settings and keep CLI invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 'u',
        long = "url",
        value_name = "URL",
        help_heading = "Input",
        help = "Base URL to brute force (a bare domain in sub mode)."
    )]
    pub url: String,

    #[arg(
        short = 'w',
        long = "wordlist",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to the word list (one candidate per line)."
    )]
    pub wordlist: String,

    #[arg(
        short = 'C',
        long = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.pathx/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        short = 'm',
        long = "mode",
        value_enum,
        help_heading = "Scan",
        help = "dir appends candidates as paths, sub prefixes them as subdomains [default: dir]."
    )]
    pub mode: Option<Mode>,

    #[arg(
        short = 'i',
        long = "ignore-status-code",
        value_name = "CODE",
        help_heading = "Scan",
        help = "Status code to always skip, even when it would count as a hit (0 disables)."
    )]
    pub ignore_status_code: Option<u16>,

    #[arg(
        long = "rate-limit",
        value_name = "RPS",
        help_heading = "Performance",
        help = "Requests submitted per second; also the default pool size [default: 16]."
    )]
    pub rate_limit: Option<u32>,

    #[arg(
        long = "concurrency",
        value_name = "N",
        help_heading = "Performance",
        help = "Maximum probes in flight [default: --rate-limit]."
    )]
    pub concurrency: Option<u32>,

    #[arg(
        long = "timeout",
        value_name = "SECONDS",
        help_heading = "Performance",
        help = "Per-request timeout in seconds, never below 10 [default: 10]."
    )]
    pub timeout: Option<u64>,

    #[arg(
        long = "workers",
        value_name = "N",
        help_heading = "Performance",
        help = "Number of runtime worker threads [default: 10]."
    )]
    pub workers: Option<usize>,

    #[arg(
        long = "user-agent",
        value_name = "UA",
        help_heading = "HTTP",
        help = "User-Agent header sent with every probe."
    )]
    pub user_agent: Option<String>,

    #[arg(
        long = "proxy",
        value_name = "URL",
        help_heading = "HTTP",
        help = "HTTP proxy URL (e.g. http://127.0.0.1:8080)."
    )]
    pub proxy: Option<String>,

    #[arg(
        long = "no-redirects",
        help_heading = "HTTP",
        help = "Report 3xx responses as-is instead of following them."
    )]
    pub no_redirects: bool,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Append found URLs to this file."
    )]
    pub output: Option<String>,

    #[arg(
        long = "output-format",
        value_enum,
        help_heading = "Output",
        help = "Output file format, inferred from the file extension when omitted [default: text]."
    )]
    pub output_format: Option<OutputFormat>,

    #[arg(
        long = "verbose",
        action = ArgAction::SetTrue,
        default_value_t = true,
        help_heading = "Output",
        help = "Verbose output (always on)."
    )]
    pub verbose: bool,

    #[arg(
        long = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        long = "no-progress",
        help_heading = "Output",
        help = "Hide the progress bar."
    )]
    pub no_progress: bool,
}
