use clap::{Arg, ArgAction, ArgMatches, ColorChoice, Command};
use hifitime::prelude::Duration;

use ntrip2rtk::prelude::{Epoch, PositionEstimate, SessionConfig};

/// Horizontal accuracy (m) of a user defined location
const USER_LOCATION_ACCURACY_M: f64 = 100.0;

pub struct Cli {
    /// Arguments passed by user
    matches: ArgMatches,
}

impl Cli {
    /// Build new command line interface
    pub fn new() -> Self {
        Self {
            matches: {
                Command::new("ntrip2rtk")
                    .author("Guillaume W. Bres, <guillaume.bressaix@gmail.com>")
                    .version(env!("CARGO_PKG_VERSION"))
                    .about("NTRIP corrections client")
                    .color(ColorChoice::Always)
                    .arg_required_else_help(true)
                    .next_help_heading("NTRIP caster")
                    .arg(
                        Arg::new("host")
                            .long("host")
                            .value_name("HOST")
                            .required_unless_present_any(["config"])
                            .help("Caster host name or IP address")
                    )
                    .arg(
                        Arg::new("port")
                            .short('p')
                            .long("port")
                            .value_name("PORT")
                            .help("Caster port. By default we use 2101")
                    )
                    .arg(
                        Arg::new("mountpoint")
                            .short('m')
                            .long("mountpoint")
                            .value_name("MOUNTPOINT")
                            .required_unless_present_any(["config"])
                            .help("Correction feed to subscribe to")
                    )
                    .arg(
                        Arg::new("user")
                            .short('u')
                            .long("user")
                            .value_name("USERNAME")
                            .help("Caster user name")
                    )
                    .arg(
                        Arg::new("password")
                            .long("password")
                            .value_name("PASSWORD")
                            .help("Caster password")
                    )
                    .arg(
                        Arg::new("config")
                            .short('c')
                            .long("config")
                            .value_name("FILE")
                            .conflicts_with_all(["host", "mountpoint"])
                            .help("Load session configuration from a JSON file")
                    )
                    .arg(
                        Arg::new("retry")
                            .long("retry")
                            .value_name("DURATION")
                            .help("Reconnect after this delay when the connection fails. Example \"10 s\".
By default the application exits on the first failure.")
                    )
                    .next_help_heading("Position report")
                    .arg(
                        Arg::new("period")
                            .long("period")
                            .value_name("DURATION")
                            .help("Position report period. Default is \"30 s\"")
                    )
                    .arg(
                        Arg::new("lat")
                            .long("lat")
                            .value_name("DDEG")
                            .allow_hyphen_values(true)
                            .requires_all(["lon", "alt"])
                            .help("Approximate latitude (decimal degrees), reported until the solver converges")
                    )
                    .arg(
                        Arg::new("lon")
                            .long("lon")
                            .value_name("DDEG")
                            .allow_hyphen_values(true)
                            .requires_all(["lat", "alt"])
                            .help("Approximate longitude (decimal degrees)")
                    )
                    .arg(
                        Arg::new("alt")
                            .long("alt")
                            .value_name("METERS")
                            .allow_hyphen_values(true)
                            .requires_all(["lat", "lon"])
                            .help("Approximate altitude (m)")
                    )
                    .next_help_heading("Output")
                    .arg(
                        Arg::new("output")
                            .short('o')
                            .long("output")
                            .value_name("FILENAME")
                            .help("Record the correction stream (RTCM) to this file")
                    )
                    .arg(
                        Arg::new("quiet")
                            .short('q')
                            .long("quiet")
                            .action(ArgAction::SetTrue)
                            .help("Do not log position reports")
                    )
                    .get_matches()
            },
        }
    }

    fn duration(&self, key: &str) -> Option<Duration> {
        let value = self.matches.get_one::<String>(key)?;
        let duration = value
            .trim()
            .parse::<Duration>()
            .unwrap_or_else(|e| panic!("invalid --{} duration: {}", key, e));
        Some(duration)
    }

    fn float(&self, key: &str) -> Option<f64> {
        let value = self.matches.get_one::<String>(key)?;
        let value = value
            .trim()
            .parse::<f64>()
            .unwrap_or_else(|e| panic!("invalid --{} value: {}", key, e));
        Some(value)
    }

    /// [SessionConfig] from JSON file, or from the command line
    pub fn session_config(&self) -> SessionConfig {
        if let Some(path) = self.matches.get_one::<String>("config") {
            return SessionConfig::from_file(path)
                .unwrap_or_else(|e| panic!("failed to load {}: {}", path, e));
        }

        let host = self
            .matches
            .get_one::<String>("host")
            .unwrap_or_else(|| panic!("invalid command line: --host is required"));

        let mountpoint = self
            .matches
            .get_one::<String>("mountpoint")
            .unwrap_or_else(|| panic!("invalid command line: --mountpoint is required"));

        let mut cfg = SessionConfig::new(host, mountpoint);

        if let Some(port) = self.matches.get_one::<String>("port") {
            let port = port
                .trim()
                .parse::<u16>()
                .unwrap_or_else(|e| panic!("invalid port number: {}", e));

            cfg = cfg.with_port(port);
        }

        let username = self.matches.get_one::<String>("user");
        let password = self.matches.get_one::<String>("password");

        if username.is_some() || password.is_some() {
            cfg = cfg.with_credentials(
                username.map(|s| s.as_str()).unwrap_or_default(),
                password.map(|s| s.as_str()).unwrap_or_default(),
            );
        }

        if let Some(period) = self.duration("period") {
            cfg = cfg.with_uplink_period(period);
        }

        cfg.validate()
            .unwrap_or_else(|e| panic!("invalid command line: {}", e));

        cfg
    }

    /// User defined approximate location
    pub fn last_known_location(&self, epoch: Epoch) -> Option<PositionEstimate> {
        let (lat, lon, alt) = (self.float("lat")?, self.float("lon")?, self.float("alt")?);

        Some(PositionEstimate::last_known(
            epoch,
            lat,
            lon,
            alt,
            USER_LOCATION_ACCURACY_M,
        ))
    }

    /// Delay between two connection attempts
    pub fn retry_delay(&self) -> Option<Duration> {
        self.duration("retry")
    }

    pub fn output(&self) -> Option<&String> {
        self.matches.get_one::<String>("output")
    }

    pub fn quiet(&self) -> bool {
        self.matches.get_flag("quiet")
    }
}
