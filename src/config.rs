use clap::Parser;
use tracing::warn;

use crate::session::{ATTEN_RESULTS_TIMEOUT_MAX, TT_EVSE_SLAC_INIT_MAX, TT_EVSE_SLAC_INIT_MIN};

/// EVSE-side SLAC matching daemon: pairs an EV to this charger over HPGP
/// powerline by negotiating a private NMK/NID.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Config {
    /// Network interface the raw HPGP link binds to
    #[arg(long, env = "SLAC_INTERFACE", default_value = "eth0")]
    pub interface: String,

    /// Opaque EVSE identifier passed to the observer and log fields
    #[arg(long, env = "SLAC_EVSE_ID", default_value = "evse-0")]
    pub evse_id: String,

    /// TT_EVSE_SLAC_init, seconds, clamped to [20.0, 50.0]
    #[arg(long, env = "SLAC_INIT_TIMEOUT", default_value_t = 50.0)]
    pub slac_init_timeout: f64,

    /// Override for the sounds-loop deadline, milliseconds, capped at 1050
    #[arg(long, env = "ATTEN_RESULTS_TIMEOUT")]
    pub atten_results_timeout: Option<u64>,

    /// Log level passed to the tracing EnvFilter
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Stats snapshot interval in seconds (0 = disabled)
    #[arg(long, default_value_t = 5)]
    pub stats_interval_secs: u64,

    /// Read CP-state lines ("<state> <evse_id>") from stdin as a demo
    /// harness, instead of leaving the CP-event channel unconnected
    #[arg(long, default_value_t = false)]
    pub cp_stdin: bool,
}

impl Config {
    /// Range-clamp the fields that accept raw user input, logging a
    /// warning instead of panicking on out-of-range values.
    pub fn resolved(mut self) -> Self {
        let min = TT_EVSE_SLAC_INIT_MIN.as_secs_f64();
        let max = TT_EVSE_SLAC_INIT_MAX.as_secs_f64();
        if self.slac_init_timeout < min || self.slac_init_timeout > max {
            warn!(
                requested = self.slac_init_timeout,
                min, max, "slac_init_timeout out of range, clamping"
            );
            self.slac_init_timeout = self.slac_init_timeout.clamp(min, max);
        }

        let cap = ATTEN_RESULTS_TIMEOUT_MAX.as_millis() as u64;
        if let Some(t) = self.atten_results_timeout {
            if t > cap {
                warn!(requested = t, cap, "atten_results_timeout out of range, capping");
                self.atten_results_timeout = Some(cap);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn resolved_clamps_slac_init_timeout_below_range() {
        let cfg = Config::parse_from(["test", "--slac-init-timeout", "1.0"]).resolved();
        assert_eq!(cfg.slac_init_timeout, TT_EVSE_SLAC_INIT_MIN.as_secs_f64());
    }

    #[test]
    fn resolved_clamps_slac_init_timeout_above_range() {
        let cfg = Config::parse_from(["test", "--slac-init-timeout", "999"]).resolved();
        assert_eq!(cfg.slac_init_timeout, TT_EVSE_SLAC_INIT_MAX.as_secs_f64());
    }

    #[test]
    fn resolved_caps_atten_results_timeout() {
        let cfg = Config::parse_from(["test", "--atten-results-timeout", "5000"]).resolved();
        assert_eq!(cfg.atten_results_timeout, Some(ATTEN_RESULTS_TIMEOUT_MAX.as_millis() as u64));
    }

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::parse_from(["test"]).resolved();
        assert_eq!(cfg.interface, "eth0");
        assert_eq!(cfg.evse_id, "evse-0");
        assert_eq!(cfg.slac_init_timeout, 50.0);
        assert!(cfg.atten_results_timeout.is_none());
        assert!(!cfg.cp_stdin);
    }
}
