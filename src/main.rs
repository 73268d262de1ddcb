//! twarchive - Archive tweets for a Hugo site
//!
//! Main entry point for the twarchive command-line tool.

use anyhow::{Result, bail};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::{info, warn};

use twarchive::api::tweet_from_api;
use twarchive::archive::{TwitterArchive, archive_to_data, find_archives};
use twarchive::cli::{
    Archive2dataArgs, Cli, Commands, CompletionsArgs, ConfigArgs, LsArgs, LsTarget,
    Tweet2dataArgs, Tweet2jsonArgs, User2dataArgs, WalkArgs,
};
use twarchive::config::{ApiConfig, Config, redact};
use twarchive::logging::{OperationGuard, init_cli_logging};
use twarchive::site::list_tweet_files;
use twarchive::storage::write_record;
use twarchive::{
    Archiver, HttpTwitterApi, HugoSite, TwarchiveError, TwitterApi, WalkOptions, WalkReport,
    WalkTarget, format_error, format_number_usize, tweet_id_from_uri,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    init_cli_logging(cli.quiet, cli.verbose, !cli.no_color);

    let config = Config::load();
    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err, cli.debug);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, config: &Config) -> Result<()> {
    let guard = OperationGuard::new(command_name(&cli.command));

    let result = match &cli.command {
        Commands::Ls(args) => cmd_ls(cli, config, args),
        Commands::Tweet2json(args) => cmd_tweet2json(cli, config, args),
        Commands::Tweet2data(args) => cmd_tweet2data(cli, config, args),
        Commands::Showinlines => cmd_showinlines(cli, config),
        Commands::Inline2data(args) => cmd_inline2data(cli, config, args),
        Commands::Data2md => cmd_data2md(cli, config),
        Commands::User2data(args) => cmd_user2data(cli, config, args),
        Commands::Archive2data(args) => cmd_archive2data(cli, config, args),
        Commands::Reencode => cmd_reencode(cli, config),
        Commands::Config(args) => cmd_config(cli, config, args),
        Commands::Completions(args) => cmd_completions(args.clone()),
    };

    match &result {
        Ok(()) => guard.complete(),
        Err(e) => guard.fail(e),
    }
    result
}

const fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Ls(_) => "ls",
        Commands::Tweet2json(_) => "tweet2json",
        Commands::Tweet2data(_) => "tweet2data",
        Commands::Showinlines => "showinlines",
        Commands::Inline2data(_) => "inline2data",
        Commands::Data2md => "data2md",
        Commands::User2data(_) => "user2data",
        Commands::Archive2data(_) => "archive2data",
        Commands::Reencode => "reencode",
        Commands::Config(_) => "config",
        Commands::Completions(_) => "completions",
    }
}

fn report_error(err: &anyhow::Error, debug: bool) {
    let suggestion = err
        .chain()
        .filter_map(|e| e.downcast_ref::<TwarchiveError>())
        .find_map(TwarchiveError::suggestion);

    let explanation = err
        .chain()
        .skip(1)
        .map(|cause| format!("caused by: {cause}"))
        .collect::<Vec<_>>()
        .join("\n   ");

    eprintln!(
        "{}",
        format_error(&err.to_string(), &explanation, suggestion.as_slice())
    );
    if debug {
        eprintln!("\n{err:?}");
    }
}

fn get_site(cli: &Cli, config: &Config) -> HugoSite {
    HugoSite::new(cli.site.clone().unwrap_or_else(|| config.site_path()))
}

/// Config file and environment credentials, overridden by flags.
fn api_config(config: &Config, args: &WalkArgs) -> ApiConfig {
    let mut api = config.api.clone();
    if let Some(key) = &args.consumer_key {
        api.consumer_key = Some(key.clone());
    }
    if let Some(secret) = &args.consumer_secret {
        api.consumer_secret = Some(secret.clone());
    }
    if let Some(token) = &args.bearer_token {
        api.bearer_token = Some(token.clone());
    }
    api
}

fn walk_options(config: &Config, args: &WalkArgs) -> WalkOptions {
    WalkOptions {
        max_rlevel: args.max_recurse.unwrap_or(config.walk.max_recurse),
        force: args.force,
        page_size: config.walk.page_size,
    }
}

fn connect(config: &Config, args: &WalkArgs) -> Result<HttpTwitterApi> {
    Ok(HttpTwitterApi::from_config(&api_config(config, args))?)
}

/// Accept either a bare ID or a single-tweet URL.
fn parse_tweet_id(input: &str) -> Result<String> {
    if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
        return Ok(input.to_string());
    }
    tweet_id_from_uri(input).ok_or_else(|| {
        TwarchiveError::invalid_argument(format!("not a tweet ID or tweet URL: {input}")).into()
    })
}

fn print_report(report: &WalkReport, quiet: bool) {
    if quiet {
        return;
    }
    println!(
        "{} Saved {} tweets",
        "✓".green(),
        format_number_usize(report.saved.len()).bold()
    );
    if !report.already_present.is_empty() {
        println!(
            "  {} already archived",
            format_number_usize(report.already_present.len())
        );
    }
    if !report.too_deep.is_empty() {
        println!(
            "  {} beyond the recursion limit",
            format_number_usize(report.too_deep.len()).yellow()
        );
    }
    if !report.abandoned.is_empty() {
        println!(
            "  {} deleted or protected: {}",
            format_number_usize(report.abandoned.len()).yellow(),
            report.abandoned.join(", ").dimmed()
        );
    }
}

fn regenerate_pages(cli: &Cli, site: &HugoSite) -> Result<()> {
    let pages = site.data_to_md(!cli.quiet)?;
    if !cli.quiet {
        println!(
            "{} Generated {} pages in {}",
            "✓".green(),
            format_number_usize(pages).bold(),
            site.content_twarchive().display()
        );
    }
    Ok(())
}

fn cmd_ls(cli: &Cli, config: &Config, args: &LsArgs) -> Result<()> {
    let site = get_site(cli, config);
    let dir = match args.directory {
        LsTarget::Data => site.data_twarchive(),
        LsTarget::Content => site.content_twarchive(),
    };
    if !dir.is_dir() {
        info!(dir = %dir.display(), "Nothing archived yet");
        return Ok(());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for path in list_tweet_files(&dir)? {
        if let Some(name) = path.file_name() {
            writeln!(out, "{}", name.to_string_lossy())?;
        }
    }
    Ok(())
}

fn cmd_tweet2json(cli: &Cli, config: &Config, args: &Tweet2jsonArgs) -> Result<()> {
    let id = parse_tweet_id(&args.tweetid)?;
    let api = connect(config, &args.walk)?;

    let tweet = api.get_tweet(&id)?;
    let archived = tweet_from_api(&tweet, &api)?;
    write_record(&args.filename, &archived)?;

    if !cli.quiet {
        println!(
            "{} Wrote tweet {} to {}",
            "✓".green(),
            id.bold(),
            args.filename.display()
        );
    }
    Ok(())
}

fn cmd_tweet2data(cli: &Cli, config: &Config, args: &Tweet2dataArgs) -> Result<()> {
    let id = parse_tweet_id(&args.tweetid)?;
    let site = get_site(cli, config);
    let store = site.store();
    let api = connect(config, &args.walk)?;

    let mut archiver = Archiver::new(&api, &store, walk_options(config, &args.walk));
    archiver.tweet_to_data(WalkTarget::Id(id), 0)?;
    print_report(&archiver.into_report(), cli.quiet);

    regenerate_pages(cli, &site)
}

fn cmd_showinlines(cli: &Cli, config: &Config) -> Result<()> {
    let site = get_site(cli, config);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for id in site.find_inline_tweets()? {
        writeln!(out, "- {id}")?;
    }
    Ok(())
}

fn cmd_inline2data(cli: &Cli, config: &Config, args: &WalkArgs) -> Result<()> {
    let site = get_site(cli, config);
    let ids = site.find_inline_tweets()?;
    info!(count = ids.len(), "Found inline tweet references");

    let store = site.store();
    let api = connect(config, args)?;
    let mut archiver = Archiver::new(&api, &store, walk_options(config, args));
    archiver.inline_to_data(ids)?;
    print_report(&archiver.into_report(), cli.quiet);

    regenerate_pages(cli, &site)
}

fn cmd_data2md(cli: &Cli, config: &Config) -> Result<()> {
    regenerate_pages(cli, &get_site(cli, config))
}

fn cmd_user2data(cli: &Cli, config: &Config, args: &User2dataArgs) -> Result<()> {
    let screen_name = args.username.trim_start_matches('@');
    if screen_name.is_empty() {
        bail!(TwarchiveError::invalid_argument("empty username"));
    }
    let site = get_site(cli, config);
    let store = site.store();
    let api = connect(config, &args.walk)?;

    let mut archiver = Archiver::new(&api, &store, walk_options(config, &args.walk));
    let walked = archiver.user_tweets_to_data(screen_name, args.retrieve_all)?;
    if !cli.quiet {
        println!(
            "{} Walked {} timeline tweets from @{}",
            "✓".green(),
            format_number_usize(walked).bold(),
            screen_name
        );
    }
    print_report(&archiver.into_report(), cli.quiet);

    regenerate_pages(cli, &site)
}

fn cmd_archive2data(cli: &Cli, config: &Config, args: &Archive2dataArgs) -> Result<()> {
    let site = get_site(cli, config);
    let archives_dir = site.twitter_archives();
    let archives = match &args.archive {
        Some(name) => {
            let archive = TwitterArchive::from_path(archives_dir.join(name));
            archive.validate()?;
            vec![archive]
        }
        None if archives_dir.is_dir() => find_archives(&archives_dir)?,
        None => Vec::new(),
    };
    if archives.is_empty() {
        bail!(TwarchiveError::archive_not_found(archives_dir));
    }

    let api_config = api_config(config, &args.walk);
    let api = if args.no_api {
        None
    } else if api_config.has_credentials() {
        Some(HttpTwitterApi::from_config(&api_config)?)
    } else {
        warn!("No API credentials configured; retweets in the archive will be skipped");
        None
    };

    let store = site.store();
    let mut archiver = api
        .as_ref()
        .map(|api| Archiver::new(api, &store, walk_options(config, &args.walk)));

    for archive in &archives {
        let import = archive_to_data(&store, archive, archiver.as_mut())?;
        if !cli.quiet {
            println!(
                "{} {}: {} tweets saved, {} retweets fetched, {} retweets skipped",
                "✓".green(),
                archive.root().display(),
                format_number_usize(import.saved.len()).bold(),
                format_number_usize(import.fetched_live.len()),
                format_number_usize(import.skipped.len()),
            );
            if !import.unavailable.is_empty() {
                println!(
                    "  {} retweets deleted or protected: {}",
                    format_number_usize(import.unavailable.len()).yellow(),
                    import.unavailable.join(", ").dimmed()
                );
            }
        }
    }

    if let Some(archiver) = archiver {
        print_report(&archiver.into_report(), cli.quiet);
    }
    Ok(())
}

fn cmd_reencode(cli: &Cli, config: &Config) -> Result<()> {
    let count = get_site(cli, config).store().reencode_all()?;
    if !cli.quiet {
        println!(
            "{} Re-encoded {} records",
            "✓".green(),
            format_number_usize(count).bold()
        );
    }
    Ok(())
}

fn cmd_config(cli: &Cli, config: &Config, args: &ConfigArgs) -> Result<()> {
    if args.path {
        match Config::user_config_path() {
            Some(path) => println!("{}", path.display()),
            None => bail!("could not determine the config directory"),
        }
    }

    if args.init {
        if let Some(path) = Config::user_config_path().filter(|p| p.exists()) {
            bail!("config file already exists: {}", path.display());
        }
        let path = Config::default().save()?;
        println!("{} Wrote {}", "✓".green(), path.display());
    }

    if args.show {
        println!("{}", "Current Configuration".bold().cyan());
        println!("  Site: {}", get_site(cli, config).base().display());
        println!("  API base URL: {}", config.api.base_url);
        println!("  Bearer token: {}", redact(config.api.bearer_token.as_deref()));
        println!("  Consumer key: {}", redact(config.api.consumer_key.as_deref()));
        println!(
            "  Consumer secret: {}",
            redact(config.api.consumer_secret.as_deref())
        );
        println!("  Max recurse: {}", config.walk.max_recurse);
        println!("  Page size: {}", config.walk.page_size);
    }

    if !(args.path || args.init || args.show) {
        print!("{}", Config::default_config_content());
    }
    Ok(())
}

fn cmd_completions(args: CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "twarchive", &mut io::stdout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tweet_id() {
        assert_eq!(parse_tweet_id("20").unwrap(), "20");
        assert_eq!(
            parse_tweet_id("https://x.com/jack/status/20?s=21").unwrap(),
            "20"
        );
        assert!(parse_tweet_id("").is_err());
        assert!(parse_tweet_id("jack").is_err());
    }

    #[test]
    fn test_walk_args_override_config() {
        let mut config = Config::default();
        config.api.bearer_token = Some("from-config".into());
        let args = WalkArgs {
            bearer_token: Some("from-flag".into()),
            max_recurse: Some(2),
            force: true,
            ..WalkArgs::default()
        };

        assert_eq!(
            api_config(&config, &args).bearer_token.as_deref(),
            Some("from-flag")
        );
        let options = walk_options(&config, &args);
        assert_eq!(options.max_rlevel, 2);
        assert!(options.force);
        assert_eq!(options.page_size, 200);
    }
}
