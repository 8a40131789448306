//! CLI for the seatgate reservation admission engine.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use seatgate_core::config::{self, SeatgateConfig, Strategy};
use seatgate_core::store::SqliteStore;
use seatgate_core::ReservationService;

use commands::{
    run_cancel, run_cancel_reservation, run_item, run_load, run_promote, run_reconcile,
    run_reserve, run_status, run_waitlist, LoadOptions,
};

/// Top-level CLI for seatgate.
#[derive(Debug, Parser)]
#[command(name = "seatgate")]
#[command(about = "seatgate: reservation admission without overselling", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Define an item and its reservation limit (limits cannot change later).
    Item {
        /// Item identifier.
        id: i64,
        /// Maximum number of confirmed reservations.
        limit: u32,
    },

    /// Ask for a reservation; prints whether it was admitted or waitlisted.
    Reserve {
        /// Item identifier.
        item: i64,
        /// Requester identifier.
        requester: i64,
    },

    /// Cancel a requester's reservation for an item.
    Cancel {
        /// Item identifier.
        item: i64,
        /// Requester identifier.
        requester: i64,
    },

    /// Cancel a reservation by its ID.
    CancelReservation {
        /// Reservation identifier.
        id: i64,
    },

    /// Move waitlisted requesters into free slots, oldest first.
    Promote {
        /// Item identifier.
        item: i64,
    },

    /// Show items, or one item's availability.
    Status {
        /// Only this item.
        item: Option<i64>,
    },

    /// List an item's waitlist in order.
    Waitlist {
        /// Item identifier.
        item: i64,
    },

    /// Reset the cached count for an item from the database.
    Reconcile {
        /// Item identifier.
        item: i64,
    },

    /// Fire many concurrent reservation requests at one item and report the outcome.
    Load {
        /// Item identifier (created with --limit if it does not exist).
        item: i64,
        /// Number of concurrent requests.
        #[arg(long, default_value = "100", value_name = "N")]
        requests: u32,
        /// Item limit used when the item has to be created.
        #[arg(long, default_value = "10")]
        limit: u32,
        /// First requester ID; requests use consecutive IDs from here.
        #[arg(long, default_value = "1")]
        first_requester: i64,
        /// Exclusivity strategy for this run (overrides config).
        #[arg(long, value_parser = parse_strategy, value_name = "queue|lock")]
        strategy: Option<Strategy>,
        /// Use a throwaway in-memory database instead of the configured one.
        #[arg(long)]
        in_memory: bool,
    },
}

fn parse_strategy(s: &str) -> Result<Strategy, String> {
    match s {
        "queue" => Ok(Strategy::Queue),
        "lock" => Ok(Strategy::Lock),
        other => Err(format!("unknown strategy {other:?} (expected queue or lock)")),
    }
}

async fn open_store(cfg: &SeatgateConfig, in_memory: bool) -> Result<SqliteStore> {
    let store = if in_memory {
        SqliteStore::open_in_memory().await?
    } else if let Some(path) = &cfg.database_path {
        SqliteStore::open_at(path).await?
    } else {
        SqliteStore::open_default().await?
    };
    Ok(store)
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let mut cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        let in_memory = match &cli.command {
            CliCommand::Load {
                strategy,
                in_memory,
                ..
            } => {
                if let Some(s) = strategy {
                    cfg.strategy = *s;
                }
                *in_memory
            }
            _ => false,
        };
        let store = open_store(&cfg, in_memory).await?;
        let service = ReservationService::start(&cfg, store).await?;

        let result = cli.command.dispatch(&service).await;
        service.shutdown().await;
        result
    }

    async fn dispatch(self, service: &ReservationService) -> Result<()> {
        let controller = service.controller();
        match self {
            CliCommand::Item { id, limit } => run_item(controller, id, limit).await?,
            CliCommand::Reserve { item, requester } => {
                run_reserve(controller, item, requester).await?
            }
            CliCommand::Cancel { item, requester } => {
                run_cancel(controller, item, requester).await?
            }
            CliCommand::CancelReservation { id } => run_cancel_reservation(controller, id).await?,
            CliCommand::Promote { item } => run_promote(controller, item).await?,
            CliCommand::Status { item } => run_status(service, item).await?,
            CliCommand::Waitlist { item } => run_waitlist(controller, item).await?,
            CliCommand::Reconcile { item } => run_reconcile(controller, item).await?,
            CliCommand::Load {
                item,
                requests,
                limit,
                first_requester,
                ..
            } => {
                let opts = LoadOptions {
                    item,
                    requests,
                    limit,
                    first_requester,
                };
                run_load(controller, &opts).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
