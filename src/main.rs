// Copyright (C) 2025 Bilinear Labs - All Rights Reserved

use anyhow::Result;
use rocinante::{configuration::SyncerConfiguration, syncer_app::SyncerApp, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let config = SyncerConfiguration::parse();
    telemetry::setup_tracing(config.verbosity)?;

    let app = SyncerApp::build_app(&config)?;

    // Run the syncer app.
    app.run().await?;

    Ok(())
}
