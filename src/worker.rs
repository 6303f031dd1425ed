//! Background workers for loads and email lookups.
//!
//! Blocking backend work runs on tokio's blocking pool. Each worker reports
//! exactly one `Completion` back to the coordinator over an unbounded channel;
//! the coordinator decides what to keep.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::emails::EmailResolver;
use crate::error::FeedError;
use crate::query::{load_feed, QueryService};
use crate::state::LoadTicket;
use crate::types::LoadedFeed;

#[derive(Debug)]
pub enum Completion {
    Loaded {
        generation: u64,
        result: Result<LoadedFeed, FeedError>,
    },
    Emails {
        id: String,
        emails: Vec<String>,
    },
}

#[derive(Clone)]
pub struct FeedWorker {
    runtime: Handle,
    service: Arc<dyn QueryService>,
    resolver: EmailResolver,
    tx: UnboundedSender<Completion>,
}

impl FeedWorker {
    pub fn new(
        runtime: Handle,
        service: Arc<dyn QueryService>,
        resolver: EmailResolver,
        tx: UnboundedSender<Completion>,
    ) -> Self {
        Self {
            runtime,
            service,
            resolver,
            tx,
        }
    }

    /// Run the full load for `ticket` off the coordinator thread.
    pub fn dispatch_load(&self, ticket: LoadTicket) -> JoinHandle<()> {
        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();
        self.runtime.spawn_blocking(move || {
            let LoadTicket {
                generation,
                request,
            } = ticket;
            log::debug!("FeedWorker: load #{} started", generation);
            let result = load_feed(service.as_ref(), &request);
            if tx.send(Completion::Loaded { generation, result }).is_err() {
                log::debug!("FeedWorker: coordinator gone, dropping load #{}", generation);
            }
        })
    }

    /// Resolve emails for a registration id off the coordinator thread.
    pub fn dispatch_emails(&self, id: String) -> JoinHandle<()> {
        let resolver = self.resolver.clone();
        let tx = self.tx.clone();
        self.runtime.spawn_blocking(move || {
            let emails = resolver.resolve(&id);
            if tx.send(Completion::Emails { id, emails }).is_err() {
                log::debug!("FeedWorker: coordinator gone, dropping email result");
            }
        })
    }

    pub fn resolver(&self) -> &EmailResolver {
        &self.resolver
    }
}
