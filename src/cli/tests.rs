use super::*;
use tempfile::TempDir;

fn parse_args(argv: &[&str]) -> Args {
    Args::try_parse_from(argv)
        .unwrap_or_else(|err| panic!("argv={argv:?} should parse successfully: {err}"))
}

#[test]
fn test_default_command_is_chat() {
    let args = parse_args(&["mcp-chat"]);
    assert!(args.command.is_none());
    assert!(!args.verbose);
    assert!(args.config.is_none());
}

#[test]
fn test_global_flags_parse_after_subcommand() {
    let args = parse_args(&[
        "mcp-chat",
        "say",
        "--config",
        "/tmp/settings.toml",
        "-v",
        "--log",
        "chat.log",
        "hello",
        "world",
    ]);
    assert_eq!(args.config, Some(PathBuf::from("/tmp/settings.toml")));
    assert_eq!(args.log, Some(PathBuf::from("chat.log")));
    assert!(args.verbose);
    match args.command {
        Some(Commands::Say { prompt }) => assert_eq!(prompt, vec!["hello", "world"]),
        _ => panic!("expected say"),
    }
}

#[test]
fn test_page_action_flags() {
    let args = parse_args(&[
        "mcp-chat",
        "explain",
        "--title",
        "Docs",
        "--url",
        "https://example.com",
        "async",
        "closures",
    ]);
    match args.command {
        Some(Commands::Explain(page)) => {
            assert_eq!(page.title, "Docs");
            assert_eq!(page.url, "https://example.com");
            assert_eq!(page.text.join(" "), "async closures");
        }
        _ => panic!("expected explain"),
    }

    let args = parse_args(&["mcp-chat", "analyze", "x = 1"]);
    match args.command {
        Some(Commands::Analyze(page)) => {
            assert!(page.title.is_empty());
            assert_eq!(page.text, vec!["x = 1"]);
        }
        _ => panic!("expected analyze"),
    }
}

#[test]
fn test_mcp_and_config_subcommands() {
    let cases: [(&[&str], McpCommands); 3] = [
        (&["mcp-chat", "mcp", "test"], McpCommands::Test),
        (&["mcp-chat", "mcp", "watch"], McpCommands::Watch),
        (
            &["mcp-chat", "mcp", "call", "echo", "{\"a\":1}"],
            McpCommands::Call {
                tool: "echo".to_string(),
                params: Some("{\"a\":1}".to_string()),
            },
        ),
    ];
    for (argv, expected) in cases {
        match parse_args(argv).command {
            Some(Commands::Mcp { command }) => assert_eq!(command, expected, "argv={argv:?}"),
            _ => panic!("expected mcp subcommand for argv={argv:?}"),
        }
    }

    match parse_args(&["mcp-chat", "config", "set", "llm.temperature", "0.5"]).command {
        Some(Commands::Config {
            command: ConfigCommands::Set { key, value },
        }) => {
            assert_eq!(key, "llm.temperature");
            assert_eq!(value, vec!["0.5"]);
        }
        _ => panic!("expected config set"),
    }

    assert!(matches!(
        parse_args(&["mcp-chat", "llm", "test"]).command,
        Some(Commands::Llm {
            command: LlmCommands::Test
        })
    ));
}

#[test]
fn test_config_set_persists_and_reset_restores() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("settings.toml");

    run_config(
        Some(&path),
        ConfigCommands::Set {
            key: "llm.provider".to_string(),
            value: vec!["local".to_string()],
        },
    )
    .expect("set provider");
    run_config(
        Some(&path),
        ConfigCommands::Set {
            key: "mcp.endpoint".to_string(),
            value: vec!["wss://bridge.example.com/mcp".to_string()],
        },
    )
    .expect("set endpoint");

    let settings = Settings::load_from_path(&path).expect("load");
    assert_eq!(settings.llm.provider, "local");
    assert_eq!(settings.llm.base_url, "");
    assert_eq!(settings.mcp.endpoint, "wss://bridge.example.com/mcp");

    run_config(Some(&path), ConfigCommands::Reset).expect("reset");
    assert_eq!(Settings::load_from_path(&path).expect("load"), Settings::default());
}

#[test]
fn test_load_settings_uses_defaults_for_missing_file() {
    let dir = TempDir::new().expect("temp dir");
    let settings = load_settings(Some(&dir.path().join("absent.toml"))).expect("load");
    assert_eq!(settings.mcp, Settings::default().mcp);
    assert_eq!(settings.llm.provider, "google");
}
