//! Thin CLI layer: parse args, merge config, and run one action from lockstash-core.

mod actions;
mod ui;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use lockstash_core::{load_config, Error, HttpFetcher, Options, Result};
use tracing_subscriber::EnvFilter;

use crate::actions::{Action, Runner};

fn cli() -> Command {
    Command::new("lockstash")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Download, verify and cache everything a package-lock.json needs, for offline npm installs")
        .after_help(
            "Examples:\n  lockstash --download\n  lockstash --verify -d vendor/npm\n  lockstash --cacache -c npm-cache\n  lockstash --fixup -l app/package-lock.json",
        )
        .arg(
            Arg::new("download")
                .long("download")
                .action(ArgAction::SetTrue)
                .help("Download missing artifacts and remove stale ones"),
        )
        .arg(
            Arg::new("verify")
                .long("verify")
                .action(ArgAction::SetTrue)
                .help("Check downloaded artifacts against the lockfile integrity"),
        )
        .arg(
            Arg::new("cacache")
                .long("cacache")
                .action(ArgAction::SetTrue)
                .help("Download, then build an npm cache directory usable with --offline"),
        )
        .arg(
            Arg::new("fixup")
                .long("fixup")
                .action(ArgAction::SetTrue)
                .help("Remove integrity fields from git dependencies in the lockfile"),
        )
        .arg(
            Arg::new("lockfile")
                .short('l')
                .long("lockfile")
                .value_parser(value_parser!(PathBuf))
                .help("Lockfile to read (default: package-lock.json)"),
        )
        .arg(
            Arg::new("dir")
                .short('d')
                .long("dir")
                .value_parser(value_parser!(PathBuf))
                .help("Download directory (default: npm-deps)"),
        )
        .arg(
            Arg::new("cache-dir")
                .short('c')
                .long("cache-dir")
                .value_parser(value_parser!(PathBuf))
                .help("Cache directory for --cacache; must be new or empty (default: npm-cache)"),
        )
        .arg(
            Arg::new("force-git-deps")
                .long("force-git-deps")
                .action(ArgAction::SetTrue)
                .help("Accept git dependencies with install scripts but no lockfile"),
        )
        .arg(
            Arg::new("force-empty-cache")
                .long("force-empty-cache")
                .action(ArgAction::SetTrue)
                .help("Allow a lockfile with no downloadable packages"),
        )
        .arg(
            Arg::new("delete-orphans")
                .long("delete-orphans")
                .action(ArgAction::SetTrue)
                .help("Delete stale files in the download directory without asking"),
        )
        .arg(
            Arg::new("yes")
                .short('y')
                .long("yes")
                .action(ArgAction::SetTrue)
                .help("Answer yes to every prompt"),
        )
        .arg(
            Arg::new("keep-temp")
                .long("keep-temp")
                .action(ArgAction::SetTrue)
                .help("Keep extracted git dependencies on disk after exit"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Only print warnings and errors"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("More logging (-v info, -vv debug); RUST_LOG overrides"),
        )
}

/// Exactly one action flag must be set.
fn selected_action(matches: &ArgMatches) -> Result<Action> {
    let selected: Vec<(Action, &str)> = Action::ALL
        .into_iter()
        .filter(|(_, flag)| matches.get_flag(flag))
        .collect();
    match selected.as_slice() {
        [] => Err(Error::NoAction),
        [(action, _)] => Ok(*action),
        many => Err(Error::MultipleActions(
            many.iter().map(|(_, flag)| format!("--{}", flag)).collect(),
        )),
    }
}

/// CLI flags on top of rc-file values on top of defaults.
fn merge_options(mut opts: Options, matches: &ArgMatches) -> Options {
    if let Some(p) = matches.get_one::<PathBuf>("lockfile") {
        opts.lockfile = p.clone();
    }
    if let Some(p) = matches.get_one::<PathBuf>("dir") {
        opts.dir = p.clone();
    }
    if let Some(p) = matches.get_one::<PathBuf>("cache-dir") {
        opts.cache_dir = p.clone();
    }
    opts.force_git_deps |= matches.get_flag("force-git-deps");
    opts.force_empty_cache |= matches.get_flag("force-empty-cache");
    opts.delete_orphans |= matches.get_flag("delete-orphans");
    opts.keep_temp |= matches.get_flag("keep-temp");
    opts.assume_yes |= matches.get_flag("yes");
    opts
}

fn init_logging(verbose: u8) {
    // 0 = warn, 1 = info, 2+ = debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("lockstash=warn,lockstash_core=warn"),
        1 => EnvFilter::new("lockstash=info,lockstash_core=info"),
        _ => EnvFilter::new("lockstash=debug,lockstash_core=debug"),
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_count("verbose"));

    let action = selected_action(&matches)?;
    let cwd = std::env::current_dir().map_err(|e| Error::io("reading", ".", e))?;
    let rc = load_config(&cwd)?;
    let opts = merge_options(Options::from_rc(&rc), &matches);
    tracing::debug!(?opts, ?action, "starting");

    let fetcher = HttpFetcher::new();
    Runner::new(&opts, &fetcher, matches.get_flag("quiet")).run(action)
}

fn main() -> ExitCode {
    if !ui::use_color() {
        colored::control::set_override(false);
    }
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui::report(&e);
            ExitCode::from(e.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ArgMatches {
        let mut argv = vec!["lockstash"];
        argv.extend_from_slice(args);
        cli().try_get_matches_from(argv).unwrap()
    }

    #[test]
    fn cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn exactly_one_action_is_required() {
        assert!(matches!(selected_action(&parse(&[])), Err(Error::NoAction)));
        assert_eq!(selected_action(&parse(&["--verify"])).unwrap(), Action::Verify);
        match selected_action(&parse(&["--download", "--fixup"])) {
            Err(Error::MultipleActions(flags)) => assert_eq!(flags, ["--download", "--fixup"]),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn cli_flags_override_rc_values() {
        let rc_opts = Options {
            dir: PathBuf::from("from-rc"),
            keep_temp: true,
            ..Options::default()
        };
        let opts = merge_options(rc_opts, &parse(&["--cacache", "-d", "from-cli", "-y"]));
        assert_eq!(opts.dir, PathBuf::from("from-cli"));
        assert_eq!(opts.lockfile, PathBuf::from("package-lock.json"));
        assert!(opts.keep_temp);
        assert!(opts.assume_yes);
        assert!(!opts.delete_orphans);
    }
}
