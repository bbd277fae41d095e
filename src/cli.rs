// Copyright (C) 2025 Bilinear Labs - All Rights Reserved

//! Module that handles the command line interface.

use crate::constants;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author = "Bilinear Labs")]
#[command(version = "0.1.0")]
#[command(about = "Rocinante")]
#[command(long_about = "Marketplace ledger event synchronization engine")]
pub struct SyncerArgs {
    #[arg(
        short,
        long,
        help = "RPC host to sync from.\nExample: https://polygon-rpc.com"
    )]
    pub rpc_host: Option<String>,
    #[arg(
        short,
        long,
        help = "Address of the FreelanceEscrow contract.\n\
            Example: 0x1234567890123456789012345678901234567890"
    )]
    pub escrow_contract: Option<String>,
    #[arg(
        short = 'x',
        long,
        help = "Address of the CrossChainEscrowManager contract (optional)."
    )]
    pub cross_chain_contract: Option<String>,
    #[arg(
        short = 's',
        long,
        help = "Block the contracts were deployed at. Backfill starts here when the database is empty; otherwise the persisted cursor wins.\nDefault: 0"
    )]
    pub deploy_block: Option<u64>,
    #[arg(
        short,
        long,
        help = "Path to the database file. Default: rocinante_syncer.duckdb"
    )]
    pub database: Option<String>,
    #[arg(
        long,
        help = "Block range for a single get_logs request.",
        default_value_t = constants::DEFAULT_BLOCK_RANGE
    )]
    pub block_range: u64,
    #[arg(
        long,
        help = "Maximum number of blocks a catch-up run may replay. Larger gaps are skipped ahead.",
        default_value_t = constants::DEFAULT_MAX_BLOCK_GAP
    )]
    pub max_block_gap: u64,
    #[arg(
        short,
        long,
        help = "Verbosity level. 0 = WARN, 1 = INFO (default), 2 = DEBUG, 3 = TRACE",
        default_value_t = 1
    )]
    pub verbosity: u8,
    #[arg(
        short,
        long,
        help = "Path to a configuration file (YAML/JSON). When given, file-based fields from the CLI are ignored."
    )]
    pub config: Option<String>,
    #[arg(long, help = "Enable the Prometheus metrics server.", default_value_t = false)]
    pub metrics: bool,
    #[arg(
        long,
        help = "Metrics server listening address",
        default_value_t = String::from(constants::DEFAULT_METRICS_ADDRESS),
    )]
    pub metrics_address: String,
    #[arg(long, help = "Metrics server listening port", default_value_t = constants::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,
    #[arg(
        long,
        help = "Value for the Access-Control-Allow-Origin header of the metrics endpoint."
    )]
    pub metrics_allow_origin: Option<String>,
}
