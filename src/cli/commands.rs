// Keypool — CLI Command Handlers
//
// Each function handles one CLI subcommand. All of them load the config
// once at the top; gateway-backed commands then build the gateway from
// config plus environment credentials.

use std::path::Path;
use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::error::KeypoolError;
use crate::gateway::{Gateway, RequestOptions};
use crate::rpc::RpcServer;

use super::{Cli, Commands};

/// Execute the parsed CLI command.
pub async fn execute(cli: Cli) -> Result<(), KeypoolError> {
    let config = GatewayConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Status => cmd_status(config),
        Commands::Ask {
            prompt,
            model,
            temperature,
            max_tokens,
            retries,
            tag,
        } => {
            let options = RequestOptions {
                model,
                temperature,
                max_tokens,
                max_retries: retries,
                sequence_tag: tag,
            };
            cmd_ask(config, prompt, options).await
        }
        Commands::Serve { socket } => cmd_serve(config, socket.as_deref()).await,
        Commands::CheckConfig => cmd_check_config(config, cli.config.as_deref()),
    }
}

// ─── Status ──────────────────────────────────────────────────────────────────

fn cmd_status(config: GatewayConfig) -> Result<(), KeypoolError> {
    let gateway = Gateway::new(config)?;
    println!("{}", serde_json::to_string_pretty(&gateway.status())?);
    Ok(())
}

// ─── Ask ─────────────────────────────────────────────────────────────────────

async fn cmd_ask(
    config: GatewayConfig,
    prompt: String,
    options: RequestOptions,
) -> Result<(), KeypoolError> {
    if prompt.trim().is_empty() {
        return Err(KeypoolError::Other("Prompt must not be empty".to_string()));
    }

    let gateway = Gateway::new(config)?;
    let reply = gateway.request(&prompt, &options).await?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

// ─── Serve ───────────────────────────────────────────────────────────────────

async fn cmd_serve(config: GatewayConfig, socket: Option<&Path>) -> Result<(), KeypoolError> {
    let gateway = Arc::new(Gateway::new(config)?);
    let socket_path = socket
        .map(Path::to_path_buf)
        .unwrap_or_else(RpcServer::default_socket_path);

    println!("Starting Keypool RPC server at {}...", socket_path.display());
    let server = RpcServer::new(gateway, socket_path);
    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await?;

    Ok(())
}

// ─── Check Config ────────────────────────────────────────────────────────────

fn cmd_check_config(config: GatewayConfig, path: Option<&Path>) -> Result<(), KeypoolError> {
    let source = match path {
        Some(p) => p.display().to_string(),
        None if GatewayConfig::default_path().exists() => {
            GatewayConfig::default_path().display().to_string()
        }
        None => "built-in defaults".to_string(),
    };

    println!("✓ Config is valid ({})", source);
    println!("  Endpoint:  {}", config.endpoint);
    println!("  Model:     {}", config.default_model);
    println!("  Retries:   {}", config.max_retries);
    println!("  Sticky:    {}", config.sticky_assignment);
    println!();

    let slots = slot_presence(&config.credential_slots, |name| std::env::var(name).ok());
    let present = slots.iter().filter(|(_, set)| *set).count();
    println!("Credential slots ({} of {} set):", present, slots.len());
    for (name, set) in &slots {
        println!("  {} {}", if *set { "✓" } else { "✗" }, name);
    }

    if let Some(fb) = &config.fallback {
        let set = std::env::var(&fb.credential_env)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false);
        println!();
        println!("Fallback: {} via {}", fb.model, fb.endpoint);
        println!("  {} {}", if set { "✓" } else { "✗" }, fb.credential_env);
    }

    if present == 0 {
        return Err(KeypoolError::Other(
            "No credential slot is set; the gateway cannot start".to_string(),
        ));
    }
    Ok(())
}

/// Which slots hold a non-blank value. Only names leave this function.
fn slot_presence<F>(slots: &[String], lookup: F) -> Vec<(String, bool)>
where
    F: Fn(&str) -> Option<String>,
{
    slots
        .iter()
        .map(|name| {
            let set = lookup(name).map(|v| !v.trim().is_empty()).unwrap_or(false);
            (name.clone(), set)
        })
        .collect()
}
