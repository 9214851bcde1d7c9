// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `viper-relay`: one-shot dispatch and relay from the command line.
//!
//! Relay settings come from the same environment variables as the server
//! (see [`crate::config`]). Exit codes: 0 success, 1 configuration or input
//! error, 2 network unavailable.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use crate::config::{ConfigError, GatewayConfig, DISPATCH_URL_ENV};
use crate::relay::{
    Aat, AppAuthorization, CallContext, Gateway, HttpPost, RelayError, RelayOptions,
    RelayPayload, SessionRequest, Signer,
};

pub const EXIT_CONFIG: u8 = 1;
pub const EXIT_NETWORK: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "viper-relay",
    version,
    about = "Dispatch sessions and send relays to the Viper Network"
)]
pub struct Cli {
    /// Dispatch node URL, overriding DISPATCH_URL.
    #[arg(long, global = true)]
    pub dispatch_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the current session for an application.
    Dispatch {
        /// Application public key (hex).
        #[arg(long)]
        app_pub_key: String,

        #[command(flatten)]
        session: SessionArgs,
    },
    /// Send one relay and print the servicer's response.
    Relay {
        #[command(flatten)]
        app: AppArgs,

        #[command(flatten)]
        session: SessionArgs,

        /// Body forwarded to the blockchain node.
        #[arg(long)]
        data: String,

        #[arg(long, default_value = "POST")]
        method: String,

        #[arg(long, default_value = "")]
        path: String,
    },
}

#[derive(Debug, Args)]
pub struct SessionArgs {
    /// Chain id, e.g. 0001.
    #[arg(long)]
    pub chain: String,

    #[arg(long, default_value = "0001")]
    pub geo_zone: String,

    #[arg(long, default_value_t = 1)]
    pub num_servicers: u32,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct AppArgs {
    /// Application private key; an AAT for this client is built from it.
    #[arg(long, env = "APP_PRIVATE_KEY_HEX", hide_env_values = true)]
    pub app_private_key: Option<String>,

    /// JSON file holding an AAT issued to this client's key.
    #[arg(long)]
    pub aat_file: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Input(String),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(_) | CliError::Input(_) => EXIT_CONFIG,
            CliError::Relay(err) => exit_code_for(err),
        }
    }
}

/// Caller-side mistakes exit with 1; everything the network did exits with 2.
pub fn exit_code_for(err: &RelayError) -> u8 {
    match err.root_cause() {
        RelayError::BadRequest(_)
        | RelayError::BadKey(_)
        | RelayError::Unauthorized(_)
        | RelayError::Forbidden(_) => EXIT_CONFIG,
        _ => EXIT_NETWORK,
    }
}

/// Load configuration, letting `--dispatch-url` take precedence.
pub fn load_config<F>(cli: &Cli, lookup: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    GatewayConfig::from_lookup(|name| {
        if name == DISPATCH_URL_ENV {
            if let Some(url) = &cli.dispatch_url {
                return Some(url.clone());
            }
        }
        lookup(name)
    })
}

/// Run `cli` and return what should be printed on stdout.
pub async fn run(
    cli: &Cli,
    config: &GatewayConfig,
    http: Arc<dyn HttpPost>,
    ctx: &CallContext,
) -> Result<String, CliError> {
    let gateway = Gateway::new(config.relay.clone(), http)?;

    match &cli.command {
        Command::Dispatch {
            app_pub_key,
            session,
        } => {
            let request = session.to_request(app_pub_key);
            let session = gateway.dispatch(&request, ctx).await?;
            serde_json::to_string_pretty(session.as_ref())
                .map_err(|e| CliError::Input(format!("failed to render session: {e}")))
        }
        Command::Relay {
            app,
            session,
            data,
            method,
            path,
        } => {
            let (app_pub_key, authorization) = app.authorization()?;
            let options = RelayOptions {
                session: session.to_request(&app_pub_key),
                payload: RelayPayload {
                    method: method.to_ascii_uppercase(),
                    path: path.clone(),
                    ..RelayPayload::json_rpc(data.clone())
                },
                authorization,
            };
            let response = gateway.execute_relay(&options, ctx).await?;
            Ok(response.response)
        }
    }
}

impl SessionArgs {
    fn to_request(&self, app_public_key: &str) -> SessionRequest {
        SessionRequest {
            app_public_key: app_public_key.to_string(),
            chain: self.chain.clone(),
            geo_zone: self.geo_zone.clone(),
            num_servicers: self.num_servicers,
        }
    }
}

impl AppArgs {
    fn authorization(&self) -> Result<(String, AppAuthorization), CliError> {
        if let Some(private_key) = &self.app_private_key {
            let signer = Signer::from_private_key_hex(private_key)?;
            let public_key = signer.public_key_hex().to_string();
            return Ok((public_key, AppAuthorization::Signer(Arc::new(signer))));
        }
        let path = self
            .aat_file
            .as_ref()
            .ok_or_else(|| CliError::Input("--app-private-key or --aat-file is required".into()))?;
        let raw = std::fs::read(path)
            .map_err(|e| CliError::Input(format!("failed to read {}: {e}", path.display())))?;
        let aat: Aat = serde_json::from_slice(&raw)
            .map_err(|e| CliError::Input(format!("invalid AAT in {}: {e}", path.display())))?;
        Ok((aat.app_pub_key.clone(), AppAuthorization::Token(aat)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CLIENT_PRIVATE_KEY_HEX_ENV;
    use crate::relay::testing::{dispatch_reply, relay_reply, StubHttp};
    use crate::store::tests::seed;
    use std::collections::HashMap;
    use std::io::Write;

    const DISPATCH: &str = "http://dispatch.test/v1/client/dispatch";

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("viper-relay").chain(args.iter().copied())).unwrap()
    }

    fn config_for(cli: &Cli, vars: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        load_config(cli, |name| vars.get(name).cloned())
    }

    #[test]
    fn relay_needs_exactly_one_authorization() {
        let base = ["relay", "--chain", "0001", "--data", "{}"];
        assert!(Cli::try_parse_from(std::iter::once("viper-relay").chain(base)).is_err());

        let both = ["--app-private-key", "aa", "--aat-file", "aat.json"];
        assert!(Cli::try_parse_from(
            std::iter::once("viper-relay").chain(base).chain(both)
        )
        .is_err());
    }

    #[test]
    fn dispatch_url_flag_overrides_environment() {
        let cli = parse(&[
            "--dispatch-url",
            "http://flag",
            "dispatch",
            "--app-pub-key",
            "aa",
            "--chain",
            "0001",
        ]);
        let config = config_for(&cli, &[(DISPATCH_URL_ENV, "http://env")]).unwrap();
        assert_eq!(config.relay.dispatch_url, "http://flag");

        let cli = parse(&["dispatch", "--app-pub-key", "aa", "--chain", "0001"]);
        let err = CliError::from(config_for(&cli, &[]).unwrap_err());
        assert_eq!(err.exit_code(), EXIT_CONFIG);
    }

    #[test]
    fn exit_codes_follow_error_class() {
        assert_eq!(exit_code_for(&RelayError::BadKey("zz".into())), EXIT_CONFIG);
        assert_eq!(
            exit_code_for(&RelayError::DispatchUnavailable("down".into())),
            EXIT_NETWORK
        );
        let failed = RelayError::RelayFailed {
            attempts: 3,
            last_cause: Box::new(RelayError::ServicerUnavailable("503".into())),
        };
        assert_eq!(exit_code_for(&failed), EXIT_NETWORK);
    }

    #[tokio::test]
    async fn relay_with_app_key_prints_response() {
        let app = Signer::from_private_key_hex(&seed(1)).unwrap();
        let stub = Arc::new(StubHttp::new());
        stub.always(
            DISPATCH,
            dispatch_reply(app.public_key_hex(), "0001", "0001", 10, &["http://node1"]),
        );
        stub.always("http://node1/v1/client/relay", relay_reply("0x1234"));

        let app_key = seed(1);
        let cli = parse(&[
            "relay",
            "--app-private-key",
            app_key.as_str(),
            "--chain",
            "0001",
            "--data",
            r#"{"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":1}"#,
        ]);
        let config = config_for(&cli, &[(DISPATCH_URL_ENV, "http://dispatch.test")]).unwrap();

        let out = run(&cli, &config, stub.clone(), &CallContext::new())
            .await
            .unwrap();
        assert_eq!(out, "0x1234");
        assert_eq!(stub.calls(DISPATCH).len(), 1);
    }

    #[tokio::test]
    async fn relay_with_aat_file() {
        let app = Signer::new();
        let client = Signer::from_private_key_hex(&seed(9)).unwrap();
        let aat = crate::relay::aat::build(&app, client.public_key_hex()).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&aat).unwrap().as_bytes())
            .unwrap();

        let stub = Arc::new(StubHttp::new());
        stub.always(
            DISPATCH,
            dispatch_reply(app.public_key_hex(), "0001", "0001", 10, &["http://node1"]),
        );
        stub.always("http://node1/v1/client/relay", relay_reply("ok"));

        let path = file.path().to_string_lossy().to_string();
        let cli = parse(&[
            "relay",
            "--aat-file",
            path.as_str(),
            "--chain",
            "0001",
            "--data",
            "{}",
        ]);
        let client_key = seed(9);
        let config = config_for(
            &cli,
            &[
                (DISPATCH_URL_ENV, "http://dispatch.test"),
                (CLIENT_PRIVATE_KEY_HEX_ENV, client_key.as_str()),
            ],
        )
        .unwrap();

        let out = run(&cli, &config, stub, &CallContext::new()).await.unwrap();
        assert_eq!(out, "ok");
    }

    #[tokio::test]
    async fn unreachable_dispatch_exits_with_network_code() {
        let app = Signer::new();
        let cli = parse(&[
            "dispatch",
            "--app-pub-key",
            app.public_key_hex(),
            "--chain",
            "0001",
        ]);
        let mut config =
            config_for(&cli, &[(DISPATCH_URL_ENV, "http://dispatch.test")]).unwrap();
        config.relay.max_attempts = 1;

        let err = run(&cli, &config, Arc::new(StubHttp::new()), &CallContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), EXIT_NETWORK);
    }

    #[tokio::test]
    async fn bad_client_key_exits_with_config_code() {
        let cli = parse(&["dispatch", "--app-pub-key", "aa", "--chain", "0001"]);
        let config = config_for(
            &cli,
            &[
                (DISPATCH_URL_ENV, "http://dispatch.test"),
                (CLIENT_PRIVATE_KEY_HEX_ENV, "zz"),
            ],
        )
        .unwrap();
        let stub = Arc::new(StubHttp::new());

        let err = run(&cli, &config, stub.clone(), &CallContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Relay(RelayError::BadKey(_))));
        assert_eq!(err.exit_code(), EXIT_CONFIG);
        assert_eq!(stub.total_calls(), 0);
    }
}
