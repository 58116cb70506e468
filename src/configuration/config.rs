use super::types::OperatingMode;
use crate::error_handling::types::ConfigError;
use crate::storage::types::{RetryPolicy, WriteMode};
use clap::Parser;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5062;
pub const DEFAULT_LOG_DIR: &str = "cnc_logs";

const EXAMPLES: &str = "\
Examples:
  CLIENT MODE (connect to the machine):
    cnc-collector -t 192.168.1.100                  Connect to the machine at this IP
    cnc-collector -t 192.168.1.100 -p 5063          Connect on a custom port
    cnc-collector -t 192.168.1.100 -a -n Mill_1     Append mode with a custom name

  SERVER MODE (machines connect to the collector):
    cnc-collector                                   Listen on the default port 5062
    cnc-collector -p 5063 -a                        Listen on port 5063 in append mode

Notes:
  - In append mode, close log files in other programs to avoid file locks
  - A locked file is retried 3 times, then the cycle goes to a _BACKUP file
  - In client mode the collector reconnects automatically";

/// Command-line arguments of the collector.
///
/// Every value can come from the command line; `--config` switches to a TOML
/// file instead, which also exposes the timing knobs.
#[derive(Parser, Debug, Clone)]
#[command(name = "cnc-collector")]
#[command(version)]
#[command(about = "Collects CNC cycle telemetry over TCP and logs each cycle to CSV")]
#[command(after_help = EXAMPLES)]
pub struct Args {
    /// TOML configuration file; when given, the other flags are ignored
    #[arg(short = 'c', long, env = "CNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind in server mode
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on or connect to
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Machine name used in file names (default: Machine_Port<port>)
    #[arg(short = 'n', long = "name")]
    pub machine_name: Option<String>,

    /// Save every cycle of one part number to a single file
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    pub append: bool,

    /// Machine address to connect to (client mode); without it the collector listens
    #[arg(short, long)]
    pub target: Option<String>,

    /// Directory receiving the CSV logs
    #[arg(long, env = "CNC_LOG_DIR", default_value = DEFAULT_LOG_DIR)]
    pub log_dir: PathBuf,
}

/// Runtime configuration of the collector.
///
/// # Fields Overview
///
/// - `host`, `port`: bind address in server mode, `port` is also the dial port
/// - `machine_name`: identity label, defaults to `Machine_Port<port>`
/// - `append`: append mode instead of one file per cycle
/// - `target`: switches to client mode when set
/// - `log_dir`: where CSV files are written
/// - the remaining fields tune reconnects, write retries and shutdown
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub machine_name: Option<String>,
    pub append: bool,
    pub target: Option<String>,
    pub log_dir: PathBuf,
    pub reconnect_delay_secs: u64,
    pub connect_timeout_secs: u64,
    pub write_attempts: u32,
    pub retry_delay_secs: u64,
    pub drain_timeout_secs: u64,
    pub read_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            machine_name: None,
            append: false,
            target: None,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            reconnect_delay_secs: 5,
            connect_timeout_secs: 10,
            write_attempts: 3,
            retry_delay_secs: 1,
            drain_timeout_secs: 5,
            read_buffer_size: 4096,
        }
    }
}

impl Config {
    /// Builds the configuration from parsed arguments, loading `--config` if given.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        if let Some(path) = args.config.as_deref() {
            return Self::from_file(path);
        }
        let config = Config {
            host: args.host,
            port: args.port,
            machine_name: args.machine_name,
            append: args.append,
            target: args.target,
            log_dir: args.log_dir,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML configuration file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.machine_name {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyValue("machine name".to_string()));
            }
        }
        match &self.target {
            Some(target) if target.trim().is_empty() => {
                return Err(ConfigError::EmptyValue("target".to_string()));
            }
            Some(_) if self.port == 0 => {
                return Err(ConfigError::BadPort(
                    "port 0 cannot be used to connect to a machine".to_string(),
                ));
            }
            Some(_) => {}
            None => {
                self.host.parse::<IpAddr>().map_err(|e| {
                    ConfigError::BadIPFormatting(format!("{:?}: {}", self.host, e))
                })?;
            }
        }
        if self.write_attempts == 0 {
            return Err(ConfigError::NotInRange(
                "write_attempts must be at least 1".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::NotInRange(
                "read_buffer_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Identity label: the supplied name or one derived from the port.
    pub fn machine_name(&self) -> String {
        match &self.machine_name {
            Some(name) => name.trim().to_string(),
            None => format!("Machine_Port{}", self.port),
        }
    }

    /// Listening or dialing, as selected by `target`. Call after `validate`.
    pub fn mode(&self) -> Result<OperatingMode, ConfigError> {
        match &self.target {
            Some(target) => Ok(OperatingMode::Dial {
                target: target.trim().to_string(),
                port: self.port,
            }),
            None => {
                let ip: IpAddr = self.host.parse().map_err(|e| {
                    ConfigError::BadIPFormatting(format!("{:?}: {}", self.host, e))
                })?;
                Ok(OperatingMode::Listen {
                    bind: SocketAddr::new(ip, self.port),
                })
            }
        }
    }

    pub fn write_mode(&self) -> WriteMode {
        WriteMode::from_append_flag(self.append)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.write_attempts,
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::net::Ipv4Addr;

    fn parse(args: &[&str]) -> Result<Config, ConfigError> {
        let mut argv = vec!["cnc-collector"];
        argv.extend_from_slice(args);
        let args = Args::try_parse_from(argv).unwrap_or_else(|e| panic!("{}", e));
        Config::from_args(args)
    }

    #[test]
    #[serial]
    fn defaults_select_server_mode_on_5062() {
        let config = parse(&[]).unwrap();

        assert_eq!(config.port, 5062);
        assert_eq!(config.machine_name(), "Machine_Port5062");
        assert_eq!(config.write_mode(), WriteMode::NewFile);
        assert_eq!(config.log_dir, PathBuf::from("cnc_logs"));
        assert_eq!(
            config.mode().unwrap(),
            OperatingMode::Listen {
                bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5062)
            }
        );
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn short_flags_match_the_original_command_line() {
        let config = parse(&["-t", "192.168.1.100", "-p", "5063", "-a", "-n", "Mill_1"]).unwrap();

        assert_eq!(config.machine_name(), "Mill_1");
        assert_eq!(config.write_mode(), WriteMode::Append);
        assert_eq!(
            config.mode().unwrap(),
            OperatingMode::Dial {
                target: "192.168.1.100".to_string(),
                port: 5063
            }
        );
    }

    #[test]
    #[serial]
    fn bind_host_must_be_an_ip_address() {
        assert!(matches!(
            parse(&["-H", "not-an-ip"]),
            Err(ConfigError::BadIPFormatting(_))
        ));
        // the bind host is irrelevant when dialing out
        assert!(parse(&["-H", "not-an-ip", "-t", "cnc-07.plant.local"]).is_ok());
    }

    #[test]
    #[serial]
    fn rejects_empty_labels_and_dial_port_zero() {
        assert!(matches!(parse(&["-n", " "]), Err(ConfigError::EmptyValue(_))));
        assert!(matches!(parse(&["-t", ""]), Err(ConfigError::EmptyValue(_))));
        assert!(matches!(
            parse(&["-t", "10.0.0.5", "-p", "0"]),
            Err(ConfigError::BadPort(_))
        ));
        // an ephemeral port is fine for listening
        assert!(parse(&["-p", "0"]).is_ok());
    }

    #[test]
    #[serial]
    fn log_dir_can_come_from_the_environment() {
        std::env::set_var("CNC_LOG_DIR", "/var/log/cnc");
        let config = parse(&[]);
        std::env::remove_var("CNC_LOG_DIR");

        assert_eq!(config.unwrap().log_dir, PathBuf::from("/var/log/cnc"));
    }

    #[test]
    #[serial]
    fn config_file_overrides_flags_and_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector.toml");
        std::fs::write(
            &path,
            r#"
port = 5070
machine_name = "VF2"
append = true
target = "10.0.0.7"
reconnect_delay_secs = 2
write_attempts = 5
"#,
        )
        .unwrap();

        let config = parse(&["-c", path.to_str().unwrap(), "-p", "1"]).unwrap();

        assert_eq!(config.port, 5070);
        assert_eq!(config.machine_name(), "VF2");
        assert_eq!(config.write_mode(), WriteMode::Append);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(2));
        assert_eq!(config.retry_policy().attempts, 5);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.drain_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn config_file_rejects_unknown_keys_and_bad_values() {
        let dir = tempfile::tempdir().unwrap();

        let unknown = dir.path().join("unknown.toml");
        std::fs::write(&unknown, "prot = 5062\n").unwrap();
        assert!(matches!(Config::from_file(&unknown), Err(ConfigError::TomlError(_))));

        let zero = dir.path().join("zero.toml");
        std::fs::write(&zero, "write_attempts = 0\n").unwrap();
        assert!(matches!(Config::from_file(&zero), Err(ConfigError::NotInRange(_))));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::from_file(&missing), Err(ConfigError::IoError(_))));
    }
}
