use clap::Parser;
use std::net::SocketAddr;

/// CLI arguments for the signaling broker.
#[derive(Parser, Debug, Clone)]
#[command(name = "auxs")]
#[command(about = "AUX signaling broker")]
#[command(version)]
pub struct Args {
    /// Socket address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080", env = "AUXS_LISTEN")]
    pub listen: SocketAddr,
    /// Socket address for the metrics endpoint.
    #[arg(long, default_value = "127.0.0.1:9090", env = "AUXS_METRICS")]
    pub metrics_addr: SocketAddr,
    /// Maximum total concurrent connections.
    #[arg(long, default_value = "10000", env = "AUXS_MAX_CONNS")]
    pub max_conns: usize,
    /// Maximum inbound frames per rate-limit window per connection.
    #[arg(long, default_value = "60", env = "AUXS_RATE_LIMIT_MAX")]
    pub rate_limit_max: u32,
    /// Rate-limit window length in seconds.
    #[arg(long, default_value = "10", env = "AUXS_RATE_LIMIT_WINDOW")]
    pub rate_limit_window_secs: u64,
    /// Invite lifetime in seconds.
    #[arg(long, default_value = "20", env = "AUXS_INVITE_TIMEOUT")]
    pub invite_timeout_secs: u64,
    /// Interval of the fallback invite sweep in seconds.
    #[arg(long, default_value = "60", env = "AUXS_SWEEP_INTERVAL")]
    pub sweep_interval_secs: u64,
    /// Interval between WebSocket pings in seconds.
    #[arg(long, default_value = "30", env = "AUXS_PING_INTERVAL")]
    pub ping_interval: u64,
    /// Connection idle timeout in seconds.
    #[arg(long, default_value = "120", env = "AUXS_IDLE_TIMEOUT")]
    pub idle_timeout: u64,
    /// Maximum inbound frame size in bytes.
    #[arg(long, default_value = "65536", env = "AUXS_MAX_FRAME_BYTES")]
    pub max_frame_bytes: usize,
}

/// Runtime configuration derived from [`Args`].
///
/// Defaults are the normative protocol constants; overriding the timer
/// values is intended for tests and tuning.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub listen: SocketAddr,
    /// Socket address for the metrics endpoint.
    pub metrics_addr: SocketAddr,
    /// Maximum total concurrent connections.
    pub max_conns: usize,
    /// Maximum inbound frames per rate-limit window per connection.
    pub rate_limit_max: u32,
    /// Rate-limit window length in seconds.
    pub rate_limit_window_secs: u64,
    /// Invite lifetime in seconds.
    pub invite_timeout_secs: u64,
    /// Interval of the fallback invite sweep in seconds.
    pub sweep_interval_secs: u64,
    /// Interval between WebSocket pings in seconds.
    pub ping_interval: u64,
    /// Connection idle timeout in seconds.
    pub idle_timeout: u64,
    /// Maximum inbound frame size in bytes.
    pub max_frame_bytes: usize,
}

impl ServerConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_conns == 0 {
            return Err("max_conns must be greater than 0".to_string());
        }
        if self.max_conns > 1_000_000 {
            return Err("max_conns exceeds reasonable limit (1,000,000)".to_string());
        }

        if self.rate_limit_max == 0 {
            return Err("rate_limit_max must be greater than 0".to_string());
        }
        if self.rate_limit_max > 1_000_000 {
            return Err("rate_limit_max exceeds reasonable limit (1,000,000)".to_string());
        }
        if self.rate_limit_window_secs == 0 {
            return Err("rate_limit_window_secs must be greater than 0".to_string());
        }
        if self.rate_limit_window_secs > 3600 {
            return Err("rate_limit_window_secs exceeds reasonable limit (3600 seconds)".to_string());
        }

        if self.invite_timeout_secs == 0 {
            return Err("invite_timeout_secs must be greater than 0".to_string());
        }
        if self.invite_timeout_secs > 300 {
            return Err("invite_timeout_secs exceeds reasonable limit (300 seconds)".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be greater than 0".to_string());
        }
        if self.sweep_interval_secs > 3600 {
            return Err("sweep_interval_secs exceeds reasonable limit (3600 seconds)".to_string());
        }

        if self.ping_interval == 0 {
            return Err("ping_interval must be greater than 0".to_string());
        }
        if self.ping_interval > 3600 {
            return Err("ping_interval exceeds reasonable limit (3600 seconds)".to_string());
        }
        if self.idle_timeout == 0 {
            return Err("idle_timeout must be greater than 0".to_string());
        }
        if self.idle_timeout > 86_400 {
            return Err(
                "idle_timeout exceeds reasonable limit (86400 seconds / 1 day)".to_string(),
            );
        }

        const MAX_ALLOWED_FRAME: usize = 1_048_576;
        if self.max_frame_bytes == 0 {
            return Err("max_frame_bytes must be greater than 0".to_string());
        }
        if self.max_frame_bytes > MAX_ALLOWED_FRAME {
            return Err(format!(
                "max_frame_bytes exceeds maximum allowed ({} bytes)",
                MAX_ALLOWED_FRAME
            ));
        }
        Ok(())
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            metrics_addr: args.metrics_addr,
            max_conns: args.max_conns,
            rate_limit_max: args.rate_limit_max,
            rate_limit_window_secs: args.rate_limit_window_secs,
            invite_timeout_secs: args.invite_timeout_secs,
            sweep_interval_secs: args.sweep_interval_secs,
            ping_interval: args.ping_interval,
            idle_timeout: args.idle_timeout,
            max_frame_bytes: args.max_frame_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ServerConfig {
        ServerConfig {
            listen: "127.0.0.1:8080".parse().unwrap(),
            metrics_addr: "127.0.0.1:9090".parse().unwrap(),
            max_conns: 1000,
            rate_limit_max: 60,
            rate_limit_window_secs: 10,
            invite_timeout_secs: 20,
            sweep_interval_secs: 60,
            ping_interval: 30,
            idle_timeout: 120,
            max_frame_bytes: 65536,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn max_conns_zero() {
        let mut c = valid_config();
        c.max_conns = 0;
        assert!(c.validate().unwrap_err().contains("max_conns"));
    }

    #[test]
    fn max_conns_too_large() {
        let mut c = valid_config();
        c.max_conns = 1_000_001;
        assert!(c.validate().unwrap_err().contains("max_conns"));
    }

    #[test]
    fn rate_limit_max_zero() {
        let mut c = valid_config();
        c.rate_limit_max = 0;
        assert!(c.validate().unwrap_err().contains("rate_limit_max"));
    }

    #[test]
    fn rate_limit_window_zero() {
        let mut c = valid_config();
        c.rate_limit_window_secs = 0;
        assert!(c.validate().unwrap_err().contains("rate_limit_window_secs"));
    }

    #[test]
    fn invite_timeout_zero() {
        let mut c = valid_config();
        c.invite_timeout_secs = 0;
        assert!(c.validate().unwrap_err().contains("invite_timeout_secs"));
    }

    #[test]
    fn invite_timeout_too_large() {
        let mut c = valid_config();
        c.invite_timeout_secs = 301;
        assert!(c.validate().unwrap_err().contains("invite_timeout_secs"));
    }

    #[test]
    fn sweep_interval_zero() {
        let mut c = valid_config();
        c.sweep_interval_secs = 0;
        assert!(c.validate().unwrap_err().contains("sweep_interval_secs"));
    }

    #[test]
    fn ping_interval_zero() {
        let mut c = valid_config();
        c.ping_interval = 0;
        assert!(c.validate().unwrap_err().contains("ping_interval"));
    }

    #[test]
    fn idle_timeout_too_large() {
        let mut c = valid_config();
        c.idle_timeout = 86_401;
        assert!(c.validate().unwrap_err().contains("idle_timeout"));
    }

    #[test]
    fn max_frame_bytes_zero() {
        let mut c = valid_config();
        c.max_frame_bytes = 0;
        assert!(c.validate().unwrap_err().contains("max_frame_bytes"));
    }

    #[test]
    fn max_frame_bytes_too_large() {
        let mut c = valid_config();
        c.max_frame_bytes = 1_048_577;
        assert!(c.validate().unwrap_err().contains("max_frame_bytes"));
    }

    #[test]
    fn boundary_values_valid() {
        let mut c = valid_config();
        c.max_conns = 1;
        c.rate_limit_max = 1;
        c.rate_limit_window_secs = 1;
        c.invite_timeout_secs = 1;
        c.sweep_interval_secs = 1;
        c.ping_interval = 1;
        c.idle_timeout = 1;
        c.max_frame_bytes = 1;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn upper_boundary_values_valid() {
        let mut c = valid_config();
        c.max_conns = 1_000_000;
        c.rate_limit_max = 1_000_000;
        c.rate_limit_window_secs = 3600;
        c.invite_timeout_secs = 300;
        c.sweep_interval_secs = 3600;
        c.ping_interval = 3600;
        c.idle_timeout = 86_400;
        c.max_frame_bytes = 1_048_576;
        assert!(c.validate().is_ok());
    }
}
