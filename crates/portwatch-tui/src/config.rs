use anyhow::{Context, Result};
use clap::Parser;
use portwatch_core::settings::clamp_interval;
use portwatch_core::{AppSettings, ProtocolFilter, SortColumn, SortDirection, SortSpec};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "portwatch", about = "Live view of listening ports and the processes behind them")]
pub struct Cli {
    /// Refresh interval in milliseconds (minimum 500).
    #[arg(long)]
    pub interval_ms: Option<u64>,
    /// Settings file to read and save.
    #[arg(long)]
    pub settings: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    pub no_control_socket: bool,
    /// Print the filtered view as JSON lines and exit.
    #[arg(long, default_value_t = false)]
    pub dump: bool,
    #[arg(long, default_value = "")]
    pub search: String,
    #[arg(long, default_value = "all")]
    pub protocol: ProtocolFilter,
    #[arg(long)]
    pub sort: Option<SortColumn>,
    #[arg(long, default_value_t = false)]
    pub desc: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub settings_path: PathBuf,
    pub settings: AppSettings,
    pub control_socket: Option<PathBuf>,
    pub dump: bool,
    pub search: String,
    pub protocol: ProtocolFilter,
    pub sort: SortSpec,
}

impl Config {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.settings.refresh_interval_ms)
    }
}

pub fn load_config(cli: &Cli) -> Result<Config> {
    load_config_with(cli, &|key| std::env::var(key).ok())
}

/// Defaults, then the settings file, then environment, then flags.
pub fn load_config_with(cli: &Cli, env: &dyn Fn(&str) -> Option<String>) -> Result<Config> {
    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(|| resolve_settings_path(env));
    let mut settings = AppSettings::load(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    if let Some(ms) = non_empty(env, "PORTWATCH_REFRESH_MS").and_then(|value| value.parse().ok()) {
        settings.refresh_interval_ms = ms;
    }
    if let Some(ms) = cli.interval_ms {
        settings.refresh_interval_ms = ms;
    }
    settings.refresh_interval_ms = clamp_interval(settings.refresh_interval_ms);

    let socket_enabled = !cli.no_control_socket
        && non_empty(env, "PORTWATCH_CONTROL_SOCK_ENABLED")
            .and_then(|value| parse_bool_flag(&value))
            .unwrap_or(true);
    let control_socket = socket_enabled.then(|| resolve_control_socket(env));

    let default_sort = settings.default_sort();
    let sort = match (cli.sort, cli.desc) {
        (Some(column), desc) => SortSpec {
            column,
            direction: if desc {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            },
        },
        (None, true) => SortSpec {
            column: default_sort.column,
            direction: SortDirection::Descending,
        },
        (None, false) => default_sort,
    };

    Ok(Config {
        settings_path,
        settings,
        control_socket,
        dump: cli.dump,
        search: cli.search.clone(),
        protocol: cli.protocol,
        sort,
    })
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    env(key).filter(|value| !value.trim().is_empty())
}

fn resolve_settings_path(env: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = non_empty(env, "PORTWATCH_SETTINGS") {
        return PathBuf::from(path);
    }
    let config_dir = non_empty(env, "XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(dirs::config_dir)
        .unwrap_or_else(|| PathBuf::from(".config"));
    config_dir.join("portwatch").join("settings.toml")
}

fn resolve_control_socket(env: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = non_empty(env, "PORTWATCH_CONTROL_SOCK") {
        return PathBuf::from(path);
    }
    if let Some(runtime_dir) = non_empty(env, "XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir)
            .join("portwatch")
            .join("control.sock");
    }
    let owner = non_empty(env, "UID").unwrap_or_else(|| std::process::id().to_string());
    PathBuf::from(format!("/tmp/portwatch-{owner}")).join("control.sock")
}

/// The terminal belongs to the UI, so logs are discarded unless sent to a
/// file (`PORTWATCH_LOG_FILE`) or explicitly to stdout (`PORTWATCH_LOG_STDOUT`).
pub fn init_logging() {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(path) = std::env::var("PORTWATCH_LOG_FILE")
        .ok()
        .filter(|value| !value.trim().is_empty())
    {
        match open_log_file(Path::new(&path)) {
            Ok(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter())
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
                return;
            }
            Err(err) => eprintln!("log_file_error: {err}"),
        }
    }

    let stdout_enabled = std::env::var("PORTWATCH_LOG_STDOUT")
        .ok()
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(false);
    if stdout_enabled {
        let _ = tracing_subscriber::fmt().with_env_filter(filter()).try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(io::sink)
            .try_init();
    }
}

fn open_log_file(path: &Path) -> io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["portwatch"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parse_bool_flag_accepts_common_spellings() {
        assert_eq!(parse_bool_flag("1"), Some(true));
        assert_eq!(parse_bool_flag(" On "), Some(true));
        assert_eq!(parse_bool_flag("off"), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
    }

    #[test]
    fn layers_apply_file_then_env_then_flags() {
        let dir = TempDir::new().expect("tempdir");
        let settings_path = dir.path().join("settings.toml");
        std::fs::write(
            &settings_path,
            "refresh_interval_ms = 8000\n[display]\ndefault_sort = \"user\"\n",
        )
        .expect("write settings");
        let settings_arg = settings_path.to_string_lossy().to_string();

        let env = env_from(&[("PORTWATCH_REFRESH_MS", "3000")]);
        let from_env =
            load_config_with(&cli(&["--settings", &settings_arg]), &env).expect("config");
        assert_eq!(from_env.settings.refresh_interval_ms, 3000);
        assert_eq!(from_env.sort.column, SortColumn::User);

        let from_flag = load_config_with(
            &cli(&["--settings", &settings_arg, "--interval-ms", "100", "--desc"]),
            &env,
        )
        .expect("config");
        assert_eq!(from_flag.settings.refresh_interval_ms, 500);
        assert_eq!(
            from_flag.sort,
            SortSpec {
                column: SortColumn::User,
                direction: SortDirection::Descending
            }
        );
    }

    #[test]
    fn settings_path_prefers_override_then_xdg() {
        let explicit = env_from(&[("PORTWATCH_SETTINGS", "/etc/pw.toml")]);
        assert_eq!(resolve_settings_path(&explicit), PathBuf::from("/etc/pw.toml"));

        let xdg = env_from(&[("XDG_CONFIG_HOME", "/home/a/.cfg")]);
        assert_eq!(
            resolve_settings_path(&xdg),
            PathBuf::from("/home/a/.cfg/portwatch/settings.toml")
        );
    }

    #[test]
    fn control_socket_can_be_disabled_or_relocated() {
        let dir = TempDir::new().expect("tempdir");
        let settings_arg = dir.path().join("s.toml").to_string_lossy().to_string();

        let env = env_from(&[("XDG_RUNTIME_DIR", "/run/user/1000")]);
        let config = load_config_with(&cli(&["--settings", &settings_arg]), &env).expect("config");
        assert_eq!(
            config.control_socket,
            Some(PathBuf::from("/run/user/1000/portwatch/control.sock"))
        );

        let disabled = env_from(&[("PORTWATCH_CONTROL_SOCK_ENABLED", "0")]);
        let config =
            load_config_with(&cli(&["--settings", &settings_arg]), &disabled).expect("config");
        assert!(config.control_socket.is_none());

        let config = load_config_with(
            &cli(&["--settings", &settings_arg, "--no-control-socket"]),
            &env,
        )
        .expect("config");
        assert!(config.control_socket.is_none());

        let fallback = env_from(&[("UID", "42")]);
        assert_eq!(
            resolve_control_socket(&fallback),
            PathBuf::from("/tmp/portwatch-42/control.sock")
        );
    }

    #[test]
    fn dump_flags_parse_criteria() {
        let dir = TempDir::new().expect("tempdir");
        let settings_arg = dir.path().join("s.toml").to_string_lossy().to_string();
        let config = load_config_with(
            &cli(&[
                "--settings",
                &settings_arg,
                "--dump",
                "--search",
                "nginx",
                "--protocol",
                "udp",
                "--sort",
                "pid",
            ]),
            &env_from(&[]),
        )
        .expect("config");
        assert!(config.dump);
        assert_eq!(config.search, "nginx");
        assert_eq!(config.protocol, ProtocolFilter::Udp);
        assert_eq!(config.sort.column, SortColumn::Pid);
    }
}
