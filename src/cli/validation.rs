use crate::cli::args::CliArgs;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if args.url.trim().is_empty() {
        return Err("invalid --url, expected a non-empty target".to_string());
    }
    if args.wordlist.trim().is_empty() {
        return Err("invalid --wordlist, expected a file path".to_string());
    }
    if args.rate_limit == Some(0) {
        return Err("invalid --rate-limit 0, expected positive integer".to_string());
    }
    if args.concurrency == Some(0) {
        return Err("invalid --concurrency 0, expected positive integer".to_string());
    }
    if args.workers == Some(0) {
        return Err("invalid --workers 0, expected positive integer".to_string());
    }
    if args.output_format.is_some() && args.output.is_none() {
        return Err("--output-format requires --output".to_string());
    }
    Ok(())
}
