use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub config_path: PathBuf,
    pub run_seconds: Option<u64>,
    pub json_logs: bool,
    pub log_dir: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub snapshot_log: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            config_path: PathBuf::from("./config.json"),
            run_seconds: None,
            json_logs: false,
            log_dir: None,
            metrics_addr: None,
            snapshot_log: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" => {
                    if i + 1 < args.len() {
                        cfg.config_path = PathBuf::from(&args[i + 1]);
                        i += 1;
                    }
                }
                "--run-seconds" => {
                    if i + 1 < args.len() {
                        cfg.run_seconds = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--log-dir" => {
                    if i + 1 < args.len() {
                        cfg.log_dir = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--metrics-addr" => {
                    if i + 1 < args.len() {
                        cfg.metrics_addr = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--snapshot-log" => {
                    if i + 1 < args.len() {
                        cfg.snapshot_log = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        cfg
    }

    pub fn print_help() {
        println!(
            r#"fermentd - Fermentation chamber temperature controller

USAGE:
    fermentd [OPTIONS]

OPTIONS:
    --config <PATH>         Controller config (JSON, reloaded periodically) [default: ./config.json]
    --run-seconds <SECS>    Run for a fixed duration then exit
    --json-logs             Output logs in JSON format (for log aggregation)
    --log-dir <DIR>         Also write JSON logs to a daily rolling file in DIR
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --snapshot-log <PATH>   Append complete telemetry snapshots to a JSONL file
    -h, --help              Print this help message

CONFIG KEYS:
    p, i, d                 PID gains [default: 1, 0, 0]
    target                  Vessel setpoint in degC [default: 20]
    heating_limit           Fridge temperature that engages the limiter [default: 40]
    limit_window            Hysteresis below heating_limit before release [default: 5]
    threshold               Deadband around zero control [default: 0.5]
    window_size             Moving average length per sensor [default: 10]
    <task>_interval         Seconds between ticks (sensor, controller, config, heartbeat, publish)
    <task>_init_delay       Seconds before the first tick

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,fermentd=trace)

EXAMPLES:
    # Basic run with metrics
    fermentd --metrics-addr 0.0.0.0:9090

    # Production run with all observability
    fermentd --json-logs --log-dir /var/log/fermentd --snapshot-log /var/lib/fermentd/snapshots.jsonl

    # Short test run
    fermentd --run-seconds 10
"#
        );
    }
}
