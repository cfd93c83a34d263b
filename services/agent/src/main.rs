//! flotilla Node Agent
//!
//! The node agent runs on each worker machine and manages framework
//! executors and their tasks. It registers with the master, launches
//! executors under the isolation mechanism, and relays status updates
//! reliably back to the master.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flotilla_agent::agent::{Agent, AgentHandle};
use flotilla_agent::config::Config;
use flotilla_agent::isolation::ProcessIsolation;
use flotilla_agent::reaper::Reaper;
use flotilla_agent::wire::LoopbackWire;
use flotilla_messages::{Endpoint, Message};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting flotilla node agent");

    // Load configuration
    let conf = Config::from_env()?;
    info!(
        resources = %conf.resources,
        port = conf.port,
        "configuration loaded"
    );

    let endpoint = Endpoint::new("slave", format!("127.0.0.1:{}", conf.port));
    let wire = Arc::new(LoopbackWire::new(endpoint.clone()));

    let (handle, events) = AgentHandle::channel();
    {
        let inbox = handle.clone();
        wire.register(endpoint.clone(), move |event| inbox.wire_event(event));
    }

    let reaper = Reaper::spawn(handle.clone());

    let agent = Agent::new(
        conf.clone(),
        true,
        endpoint.clone(),
        wire.clone(),
        Box::new(ProcessIsolation::new()),
        reaper,
        events,
    )?;

    // A statically configured master stands in for the detector service.
    if let Some(master) = conf.master.clone() {
        wire.deliver(
            Endpoint::new("detector", "127.0.0.1:0"),
            &endpoint,
            Message::NewMasterDetected { master },
        );
    }

    // Translate an interrupt into a clean teardown.
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                handle.terminate();
            }
        });
    }

    agent.run().await?;

    Ok(())
}
