//! `authbridge` command line
//!
//! ```text
//! authbridge verify [--bind ADDR] [--port 5500]
//! authbridge broker [--bind ADDR] [--port 5501] [--mode token|site|project]
//! authbridge login  [--callback URL] [--sign-out] [--store FILE]
//! ```
//!
//! Settings come from `--config` (TOML, YAML or JSON) overlaid by the
//! environment, and are validated before anything is bound or fetched.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use url::Url;

use authbridge_auth::config::{BrokerConfig, BrokerMode, LoginConfig, Settings, VerifierConfig};
use authbridge_auth::login::{FileStore, LoginFlow, LoginOutcome};
use authbridge_auth::{BearerVerifier, TokenBroker};

use crate::logging::LoggingConfig;
use crate::{broker, login, serve, verifier};

/// Default port of the verifier
pub const VERIFIER_PORT: u16 = 5500;
/// Default port of the broker
pub const BROKER_PORT: u16 = 5501;

/// authbridge - bearer verification, token brokering and OIDC login
#[derive(Parser, Debug)]
#[command(name = "authbridge", version, author)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Settings file (TOML, YAML or JSON); environment variables take precedence
    #[arg(short, long, global = true, env = "AUTHBRIDGE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v, -vv, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the bearer-token verifier
    Verify(ServeArgs),

    /// Serve the client-credentials token broker
    Broker {
        #[command(flatten)]
        serve: ServeArgs,

        /// What each request does after acquiring a token
        #[arg(long, value_enum, default_value = "token", env = "BROKER_MODE")]
        mode: ModeArg,
    },

    /// Drive the browser login flow
    Login(LoginArgs),
}

/// Listener options
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub bind: IpAddr,

    /// Port to listen on (verifier 5500, broker 5501)
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl ServeArgs {
    fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }
}

/// Broker mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Acquire a token and report success
    Token,
    /// Relay the site resource with the token
    Site,
    /// Resolve the list id on the site
    Project,
}

impl From<ModeArg> for BrokerMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Token => Self::Token,
            ModeArg::Site => Self::Site,
            ModeArg::Project => Self::Project,
        }
    }
}

/// Login options
#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    /// Redirect URL the browser landed on after authorizing
    #[arg(long, value_name = "URL", conflicts_with = "sign_out")]
    pub callback: Option<Url>,

    /// Revoke the access token and clear stored login state
    #[arg(long)]
    pub sign_out: bool,

    /// File holding login state between invocations
    #[arg(long, value_name = "FILE", default_value = ".authbridge-login.json")]
    pub store: PathBuf,
}

impl Cli {
    /// Execute the command
    ///
    /// # Errors
    ///
    /// Configuration, bind, or flow failures.
    pub async fn execute(self) -> anyhow::Result<()> {
        LoggingConfig::from_verbosity(self.verbose, self.quiet)
            .structured(self.log_json)
            .init()
            .context("failed to initialize logging")?;

        let settings = Settings::load(self.config.as_deref())?;

        match self.command {
            Command::Verify(args) => {
                let port = args.port_or(VERIFIER_PORT);
                let config = VerifierConfig::from_settings(&settings, port)?;
                info!(
                    jwks_uri = %config.jwks_uri,
                    audience = %config.audience,
                    key_selection = ?config.key_selection,
                    "Starting verifier"
                );
                let verifier = Arc::new(BearerVerifier::new(&config)?);
                serve(SocketAddr::new(args.bind, port), verifier::router(verifier)).await?;
            }
            Command::Broker { serve: args, mode } => {
                let mode = BrokerMode::from(mode);
                let config = BrokerConfig::from_settings(&settings, mode)?;
                info!(mode = %mode, token_endpoint = %config.token_endpoint(), "Starting broker");
                let broker = Arc::new(TokenBroker::new(&config, mode)?);
                let addr = SocketAddr::new(args.bind, args.port_or(BROKER_PORT));
                serve(addr, broker::router(broker)).await?;
            }
            Command::Login(args) => run_login(&settings, args).await?,
        }

        Ok(())
    }
}

async fn run_login(settings: &Settings, args: LoginArgs) -> anyhow::Result<()> {
    let config = LoginConfig::from_settings(settings)?;
    let start = args.callback.unwrap_or_else(|| config.app_root.clone());
    let flow = LoginFlow::new(config, FileStore::new(&args.store))?;

    if args.sign_out {
        flow.request_sign_out();
    }

    match login::settle(&flow, start).await? {
        LoginOutcome::LoginLink(link) => println!("Log in at: {link}"),
        LoginOutcome::SignedIn(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
        // settle follows navigations itself
        LoginOutcome::Navigate(location) => println!("Continue at: {location}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_defaults() {
        let cli = Cli::try_parse_from(["authbridge", "verify"]).unwrap();
        let Command::Verify(args) = cli.command else {
            panic!("expected verify");
        };
        assert_eq!(args.bind, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(args.port_or(VERIFIER_PORT), 5500);
    }

    #[test]
    fn test_broker_mode_and_port() {
        let cli = Cli::try_parse_from([
            "authbridge", "broker", "--mode", "project", "--port", "9000",
        ])
        .unwrap();
        let Command::Broker { serve, mode } = cli.command else {
            panic!("expected broker");
        };
        assert_eq!(BrokerMode::from(mode), BrokerMode::Project);
        assert_eq!(serve.port_or(BROKER_PORT), 9000);
    }

    #[test]
    fn test_login_callback_conflicts_with_sign_out() {
        let result = Cli::try_parse_from([
            "authbridge",
            "login",
            "--callback",
            "http://localhost:3000/redirect?code=abc",
            "--sign-out",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_login_callback_must_be_url() {
        assert!(Cli::try_parse_from(["authbridge", "login", "--callback", "not a url"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["authbridge", "-vv", "--log-json", "login"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.log_json);
        assert!(Cli::try_parse_from(["authbridge", "-v", "--quiet", "login"]).is_err());
    }
}
