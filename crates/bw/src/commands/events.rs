use clap::Args;

use bw_events::{EventId, EventStore, Flat};

use crate::error::Result;

#[derive(Args)]
pub struct EventsArgs {
    /// Only events after this sequence number
    #[arg(long)]
    pub after: Option<i64>,
    #[arg(long, default_value = "50")]
    pub limit: u32,
    /// Only direct children of this event
    #[arg(long)]
    pub parent: Option<EventId>,
}

pub fn handle(store: &EventStore, args: &EventsArgs) -> Result<Vec<Flat>> {
    let events = match &args.parent {
        Some(parent) => store.children(parent)?,
        None => store.list(args.after, Some(args.limit))?,
    };
    Ok(events)
}
