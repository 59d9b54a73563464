//! jetpref: inspect and edit the `app` preference model from the shell.
//!
//! # Usage
//!
//! ```text
//! jetpref list
//! jetpref list --json
//! jetpref get audio.volume
//! jetpref set audio.volume 80
//! jetpref reset audio.volume
//! jetpref reset
//! jetpref path
//! ```

mod prefs;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use jetpref_datastore::{Datastore, DatastoreConfig, EntryInfo, ModelHandle};

use crate::prefs::AppPrefs;


const ROOT_ENV: &str = "JETPREF_ROOT";


/// Inspect and edit JetPref preferences.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Storage root; backing files live in `<root>/jetpref_datastore/`
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// YAML file with a datastore configuration
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Quiet period before pending changes are written
    #[arg(long, value_name = "MS")]
    save_interval_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print one value
    Get { key: String },

    /// Write one value; prints the value actually stored
    Set { key: String, value: String },

    /// Restore one entry, or every entry, to its default
    Reset { key: Option<String> },

    /// Print every entry
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the backing file path
    Path,
}


fn main() {
    init_logging();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            eprintln!("jetpref: {:#}", e);
            process::exit(1);
        }
    }
}


fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}


/// Execute one command and flush before returning, whatever the outcome.
fn run(cli: &Cli) -> anyhow::Result<String> {
    let config = resolve_config(cli)?;
    let store = Datastore::init(config);
    let prefs = store.get_or_create(prefs::MODEL_ID, prefs::declare);
    let result = execute(&store, &prefs, &cli.command);
    log_current(&prefs);
    store.shutdown();
    result
}


fn execute(
    store: &Datastore,
    prefs: &ModelHandle<AppPrefs>,
    command: &Commands,
) -> anyhow::Result<String> {
    match command {
        Commands::Get { key } => prefs
            .get_raw(key)
            .with_context(|| format!("no preference named '{}'", key)),
        Commands::Set { key, value } => {
            prefs.set_raw(key, value)?;
            Ok(prefs.get_raw(key).unwrap_or_default())
        }
        Commands::Reset { key: Some(key) } => {
            prefs.reset(key)?;
            Ok(prefs.get_raw(key).unwrap_or_default())
        }
        Commands::Reset { key: None } => {
            prefs.reset_all();
            Ok(String::new())
        }
        Commands::List { json } => {
            let entries = prefs.entries();
            if *json {
                let rows: Vec<Row> = entries.iter().map(Row::from).collect();
                Ok(serde_json::to_string_pretty(&rows)?)
            } else {
                Ok(format_table(&entries))
            }
        }
        Commands::Path => Ok(match store.backing_path(prefs.name()) {
            Some(path) => path.display().to_string(),
            None => String::from("(in memory; not persisted)"),
        }),
    }
}


fn log_current(prefs: &AppPrefs) {
    debug!(
        theme = %prefs.theme.get(),
        language = %prefs.language.get(),
        volume = prefs.volume.get(),
        muted = prefs.muted.get(),
        repeat_rate = prefs.repeat_rate.get(),
        "app preferences"
    );
}


// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Config file first, then `JETPREF_ROOT`, then flags.
fn resolve_config(cli: &Cli) -> anyhow::Result<DatastoreConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_file(path)?,
        None => DatastoreConfig::new(default_root()),
    };
    if let Ok(root) = std::env::var(ROOT_ENV) {
        config.storage_root = PathBuf::from(root);
    }
    if let Some(root) = &cli.root {
        config.storage_root = root.clone();
    }
    if let Some(ms) = cli.save_interval_ms {
        config.save_interval_ms = ms;
    }
    Ok(config)
}


fn load_config_file(path: &Path) -> anyhow::Result<DatastoreConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}


fn default_root() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".config").join("jetpref")
}


// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Row<'a> {
    key: &'a str,
    kind: &'static str,
    value: &'a str,
    default: &'a str,
    #[serde(skip_serializing_if = "no_choices")]
    choices: &'a [String],
}

impl<'a> From<&'a EntryInfo> for Row<'a> {
    fn from(info: &'a EntryInfo) -> Self {
        Row {
            key: &info.key,
            kind: info.kind.as_str(),
            value: &info.value,
            default: &info.default,
            choices: &info.choices,
        }
    }
}


fn no_choices(choices: &&[String]) -> bool {
    choices.is_empty()
}


fn format_table(entries: &[EntryInfo]) -> String {
    let width = entries.iter().map(|e| e.key.len()).max().unwrap_or(0);
    entries
        .iter()
        .map(|e| {
            let marker = if e.value == e.default { "" } else { "  *" };
            format!("{:<width$}  {}{}", e.key, e.value, marker, width = width)
        })
        .collect::<Vec<_>>()
        .join("\n")
}


#[cfg(test)]
mod tests {
    use super::*;

    fn cli(root: &Path, args: &[&str]) -> Cli {
        let mut argv = vec!["jetpref", "--root"];
        let root = root.to_str().unwrap();
        argv.push(root);
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn set_then_get_persists_across_runs() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(run(&cli(tmp.path(), &["set", "audio.volume", "150"])).unwrap(), "100");
        assert_eq!(run(&cli(tmp.path(), &["get", "audio.volume"])).unwrap(), "100");

        let file = tmp.path().join("jetpref_datastore").join("app.jetpref");
        let text = std::fs::read_to_string(file).unwrap();
        assert!(text.lines().any(|l| l == "audio.volume;100"));
    }

    #[test]
    fn rejected_write_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(run(&cli(tmp.path(), &["set", "keyboard.repeat_rate", "500"])).is_err());
        assert!(run(&cli(tmp.path(), &["set", "keyboard.repeat_rate", "NaN"])).is_err());
        assert_eq!(run(&cli(tmp.path(), &["get", "keyboard.repeat_rate"])).unwrap(), "25");
        assert!(run(&cli(tmp.path(), &["set", "theme", "sepia"])).is_err());
        assert_eq!(run(&cli(tmp.path(), &["get", "theme"])).unwrap(), "system");
    }

    #[test]
    fn unknown_key_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = run(&cli(tmp.path(), &["get", "nope"])).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn reset_restores_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        run(&cli(tmp.path(), &["set", "theme", "dark"])).unwrap();
        run(&cli(tmp.path(), &["set", "audio.muted", "true"])).unwrap();
        assert_eq!(run(&cli(tmp.path(), &["reset", "theme"])).unwrap(), "system");
        assert_eq!(run(&cli(tmp.path(), &["get", "audio.muted"])).unwrap(), "true");
        run(&cli(tmp.path(), &["reset"])).unwrap();
        assert_eq!(run(&cli(tmp.path(), &["get", "audio.muted"])).unwrap(), "false");
    }

    #[test]
    fn list_as_json() {
        let tmp = tempfile::tempdir().unwrap();
        run(&cli(tmp.path(), &["set", "language", "fr"])).unwrap();
        let out = run(&cli(tmp.path(), &["list", "--json"])).unwrap();
        let rows: serde_json::Value = serde_json::from_str(&out).unwrap();
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 5);
        let language = rows.iter().find(|r| r["key"] == "language").unwrap();
        assert_eq!(language["value"], "fr");
        assert_eq!(language["default"], "en");
        let theme = rows.iter().find(|r| r["key"] == "theme").unwrap();
        assert_eq!(theme["choices"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn list_as_table_marks_changed_entries() {
        let tmp = tempfile::tempdir().unwrap();
        run(&cli(tmp.path(), &["set", "audio.volume", "10"])).unwrap();
        let out = run(&cli(tmp.path(), &["list"])).unwrap();
        let volume = out.lines().find(|l| l.starts_with("audio.volume")).unwrap();
        assert!(volume.ends_with("10  *"));
        let theme = out.lines().find(|l| l.starts_with("theme")).unwrap();
        assert!(theme.ends_with("system"));
    }

    #[test]
    fn path_points_into_datastore_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let out = run(&cli(tmp.path(), &["path"])).unwrap();
        assert_eq!(
            PathBuf::from(out),
            tmp.path().join("jetpref_datastore").join("app.jetpref")
        );
    }

    #[test]
    fn config_file_supplies_defaults_and_flags_override() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("jetpref.yaml");
        std::fs::write(&file, "storage_root: /srv/prefs\nsave_interval_ms: 250\n").unwrap();

        let parsed = Cli::try_parse_from([
            "jetpref",
            "--config",
            file.to_str().unwrap(),
            "--save-interval-ms",
            "10",
            "path",
        ])
        .unwrap();
        let config = resolve_config(&parsed).unwrap();
        assert_eq!(config.save_interval_ms, 10);

        let with_root = cli(tmp.path(), &["--config", file.to_str().unwrap(), "path"]);
        let config = resolve_config(&with_root).unwrap();
        assert_eq!(config.storage_root, tmp.path());
        assert_eq!(config.save_interval_ms, 250);
    }

    #[test]
    fn unreadable_config_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let parsed = cli(tmp.path(), &["--config", "/nonexistent/jetpref.yaml", "path"]);
        assert!(resolve_config(&parsed).is_err());
    }

    #[test]
    fn default_root_under_home_config() {
        let root = default_root();
        assert!(root.to_string_lossy().ends_with(".config/jetpref"));
    }

    #[test]
    fn root_from_env() {
        std::env::set_var(ROOT_ENV, "/tmp/test-jetpref-root");
        let parsed = Cli::try_parse_from(["jetpref", "path"]).unwrap();
        let config = resolve_config(&parsed).unwrap();
        assert_eq!(config.storage_root, PathBuf::from("/tmp/test-jetpref-root"));
        std::env::remove_var(ROOT_ENV);
    }
}
