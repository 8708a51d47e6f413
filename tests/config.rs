use clap::Parser;
use object_voice::cli::resolve_config;
use object_voice::config::{config_path, load_config, load_config_from, Config};
use object_voice::{Cli, Commands};
use proptest::prelude::*;
use serial_test::serial;
use std::path::PathBuf;
use tempfile::tempdir;

proptest! {
    #[test]
    fn parse_serve_camera(index in 0u32..64) {
        let cli = Cli::parse_from(["object-voice", "serve", "--camera", &index.to_string()]);
        match cli.command {
            Commands::Serve { camera, data_dir } => {
                prop_assert_eq!(camera, Some(index));
                prop_assert!(data_dir.is_none());
            }
            _ => prop_assert!(false, "unexpected subcommand"),
        }
    }

    #[test]
    fn parse_process_image(path in "[a-zA-Z0-9][a-zA-Z0-9/_\\.-]*") {
        let cli = Cli::parse_from(["object-voice", "--config", "c.json", "process", &path]);
        prop_assert_eq!(cli.config, Some(PathBuf::from("c.json")));
        match cli.command {
            Commands::Process { image } => prop_assert_eq!(image, PathBuf::from(path)),
            _ => prop_assert!(false, "unexpected subcommand"),
        }
    }
}

#[test]
fn parse_list_cameras() {
    let cli = Cli::parse_from(["object-voice", "list-cameras"]);
    assert!(matches!(cli.command, Commands::ListCameras));
    assert!(cli.config.is_none());
}

#[test]
fn partial_file_keeps_other_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"camera": {"index": 2, "sample_frames": 7}, "speech": {"enabled": false}}"#,
    )
    .unwrap();
    let cfg = load_config_from(&path);
    assert_eq!(cfg.camera.index, Some(2));
    assert_eq!(cfg.camera.sample_frames, 7);
    assert_eq!(cfg.camera.warmup_frames, 5);
    assert!(!cfg.speech.enabled);
    assert_eq!(cfg.pipeline.history_limit, 100);
    assert_eq!(cfg.pipeline.display_threshold, 0.9);
    assert_eq!(cfg.detector.iou_threshold, 0.45);
}

#[test]
fn malformed_file_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ nope").unwrap();
    let cfg = load_config_from(&path);
    assert_eq!(cfg.camera.index, None);
    assert!(!cfg.memories.is_empty());
}

#[test]
#[serial]
fn env_path_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested/config.json");
    std::env::set_var("OBJECT_VOICE_CONFIG", &path);
    assert_eq!(config_path(), path);

    let mut cfg = Config::default();
    cfg.pipeline.debounce_ms = 750;
    cfg.camera.fallback_index = 3;
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, serde_json::to_vec_pretty(&cfg).unwrap()).unwrap();

    let loaded = load_config();
    assert_eq!(loaded.pipeline.debounce_ms, 750);
    assert_eq!(loaded.camera.fallback_index, 3);
    std::env::remove_var("OBJECT_VOICE_CONFIG");
}

#[test]
#[serial]
fn explicit_path_wins_over_env() {
    let dir = tempdir().unwrap();
    let env_path = dir.path().join("env.json");
    let cli_path = dir.path().join("cli.json");
    std::fs::write(&env_path, r#"{"pipeline": {"history_limit": 5}}"#).unwrap();
    std::fs::write(&cli_path, r#"{"pipeline": {"history_limit": 9}}"#).unwrap();
    std::env::set_var("OBJECT_VOICE_CONFIG", &env_path);
    assert_eq!(resolve_config(None).pipeline.history_limit, 5);
    assert_eq!(resolve_config(Some(&cli_path)).pipeline.history_limit, 9);
    std::env::remove_var("OBJECT_VOICE_CONFIG");
}
