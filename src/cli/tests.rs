use super::*;
use tempfile::TempDir;

mod test_helpers {
    use super::*;

    pub(super) fn parse_args(argv: &[&str]) -> Args {
        Args::try_parse_from(argv)
            .unwrap_or_else(|err| panic!("argv={argv:?} should parse successfully: {err}"))
    }
}

use test_helpers::parse_args;

#[test]
fn bare_invocation_defaults_to_chat() {
    let args = parse_args(&["llamachat"]);
    assert!(args.command.is_none());
    assert!(args.endpoint.is_none());
    assert!(args.model.is_none());
}

#[test]
fn global_flags_feed_overrides() {
    let argv = [
        "llamachat",
        "-m",
        "mistral",
        "--endpoint",
        "http://box:11434/api/generate",
        "--read-timeout",
        "45",
        "chat",
    ];
    let args = parse_args(&argv);
    assert!(matches!(args.command, Some(Commands::Chat)));

    let overrides = args.overrides();
    assert_eq!(overrides.model.as_deref(), Some("mistral"));
    assert_eq!(
        overrides.endpoint.as_deref(),
        Some("http://box:11434/api/generate")
    );
    assert_eq!(overrides.read_timeout_secs, Some(45));
    assert_eq!(overrides.connect_timeout_secs, None);
}

#[test]
fn say_joins_trailing_words() {
    let args = parse_args(&["llamachat", "say", "why", "is", "the", "sky", "-blue"]);
    match args.command {
        Some(Commands::Say { prompt }) => {
            assert_eq!(prompt, vec!["why", "is", "the", "sky", "-blue"]);
        }
        _ => panic!("expected say subcommand"),
    }
}

#[test]
fn say_requires_a_prompt() {
    assert!(Args::try_parse_from(["llamachat", "say"]).is_err());
}

#[test]
fn config_init_refuses_to_overwrite_without_force() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "model = \"keep-me\"\n").expect("write failed");

    let result = run_config(
        ConfigAction::Init { force: false },
        &config_path,
        &Overrides::default(),
    );
    assert!(result.is_err());
    let kept = Config::load_from_path(&config_path).expect("load");
    assert_eq!(kept.model.as_deref(), Some("keep-me"));

    run_config(
        ConfigAction::Init { force: true },
        &config_path,
        &Overrides::default(),
    )
    .expect("forced init");
    let written = Config::load_from_path(&config_path).expect("load");
    assert_eq!(written, Config::with_defaults());
}

#[test]
fn config_path_flag_wins() {
    let args = parse_args(&["llamachat", "--config", "/tmp/custom.toml", "config", "show"]);
    assert_eq!(
        args.config_path().expect("path"),
        PathBuf::from("/tmp/custom.toml")
    );
    assert!(matches!(
        args.command,
        Some(Commands::Config {
            action: ConfigAction::Show
        })
    ));
}
