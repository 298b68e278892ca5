//! Seen runtime entry point.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use seen_runtime::{execute, Command, RuntimeConfig, SeenRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    let config = RuntimeConfig::from_env();
    seen_telemetry::init_telemetry(&config.telemetry)?;

    let runtime = SeenRuntime::new(config).context("Invalid configuration")?;
    let mut poller = runtime
        .start()
        .await
        .context("Filters are corrupted, run with a fresh store")?;
    let engine = runtime.engine();

    info!("Ready. Type `help` for commands, Ctrl+C to stop.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            joined = &mut poller => {
                return match joined {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => {
                        error!(error = %e, "Fatal sync error, stopping");
                        Err(e).context("Fatal sync error")
                    }
                    Err(e) => Err(e).context("Poller task failed"),
                };
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let command = match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(command) => command,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };
                match execute(&*engine, command).await {
                    Ok(reply) => println!("{}", reply),
                    Err(e) if e.is_fatal() => {
                        runtime.shutdown();
                        return Err(e).context("Fatal sync error");
                    }
                    Err(e) => println!("error: {}", e),
                }
            }
        }
    }

    runtime.shutdown();
    if let Ok(Err(e)) = poller.await {
        error!(error = %e, "Poller stopped with error");
    }
    info!("Shutdown complete");
    Ok(())
}
