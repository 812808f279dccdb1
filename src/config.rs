use clap::Parser;
use std::time::Duration;

#[derive(Parser, Clone, Debug, PartialEq)]
#[command(author, version, about)]
pub struct Config {
    #[arg(long, env = "HOST", help = "Address to bind", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(short = 'p', long, env = "PORT", help = "Port to listen on", default_value = "3001")]
    pub port: u16,

    #[arg(
        long,
        env = "FRONTEND_URL",
        help = "Origin allowed by CORS",
        default_value = "http://localhost:5173"
    )]
    pub frontend_url: String,

    #[arg(long, env = "GOOGLE_MAPS_API_KEY", hide_env_values = true)]
    pub google_maps_api_key: Option<String>,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    #[arg(
        long,
        env = "ANTHROPIC_MODEL",
        help = "Model used for fallback distance estimates",
        default_value = "claude-sonnet-4-20250514"
    )]
    pub anthropic_model: String,

    #[arg(long, env = "SMTP_HOST", default_value = "smtp.gmail.com")]
    pub smtp_host: String,

    #[arg(long, env = "SMTP_PORT", default_value = "587")]
    pub smtp_port: u16,

    #[arg(long, env = "EMAIL_USER")]
    pub email_user: Option<String>,

    #[arg(long, env = "EMAIL_PASS", hide_env_values = true)]
    pub email_pass: Option<String>,

    #[arg(
        long,
        env = "TICK_MILLIS",
        help = "Interval between progress updates of in-transit letters",
        default_value = "1000"
    )]
    pub tick_millis: u64,

    #[arg(long, env = "JAEGER_ENDPOINT", help = "Jaeger collector endpoint")]
    pub jaeger_endpoint: Option<String>,
}

impl Config {
    /// SMTP is only used when both user and password are present.
    pub fn smtp_credentials(&self) -> Option<(&str, &str)> {
        match (self.email_user.as_deref(), self.email_pass.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(1))
    }
}
