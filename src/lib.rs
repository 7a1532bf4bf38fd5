//! Sentra distribution core
//!
//! Branch-level stock ledger, sales transaction engine, and field-visit
//! workflow for a multi-branch distribution business. This crate is the
//! domain core only; transport layers embed it and drive the services.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod services;

pub use errors::ServiceError;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::db::DbPool;
use crate::events::{Event, EventSender};
use crate::services::{
    sales_transactions::SalesTransactionService, stock::StockService, visits::VisitService,
};

/// The wired-up service set an embedding application works with.
#[derive(Clone)]
pub struct AppServices {
    pub stock: StockService,
    pub transactions: SalesTransactionService,
    pub visits: VisitService,
}

impl AppServices {
    /// Builds all services over one pool and one event channel. The
    /// returned receiver is normally handed to [`events::process_events`].
    pub fn new(db_pool: Arc<DbPool>, config: &config::AppConfig) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(config.event_channel_capacity);
        let services = Self::with_event_sender(db_pool, Some(Arc::new(EventSender::new(tx))));
        (services, rx)
    }

    /// Builds the services without an event channel. Events are dropped;
    /// used by embedders (and tests) that do not consume them.
    pub fn without_events(db_pool: Arc<DbPool>) -> Self {
        Self::with_event_sender(db_pool, None)
    }

    fn with_event_sender(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        let stock = StockService::new(db_pool.clone(), event_sender.clone());
        let transactions =
            SalesTransactionService::new(db_pool.clone(), stock.clone(), event_sender.clone());
        let visits = VisitService::new(db_pool, event_sender);

        info!("Application services initialized");
        Self {
            stock,
            transactions,
            visits,
        }
    }
}

/// Installs the global tracing subscriber from `RUST_LOG`, falling back to
/// the configured level. Call once at process start.
pub fn init_tracing(config: &config::AppConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
