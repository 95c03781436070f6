//! Content-addressed block store and random-linear-combination
//! fountain codec, with a retrieval scheduler that drives the
//! Call/Data/Cancel protocol over the overlay (`spec.md` §4.6,
//! "C6 — Block store and fountain codec").

mod bitmap;
mod block_file;
mod combination;
mod err;
mod generate;
mod gf256;
mod scheduler;
mod sink;
mod store;
mod wire;

pub use bitmap::BitmapFile;
pub use block_file::BlockFile;
pub use combination::{Combination, BLOCK_SIZE};
pub use err::{Result, StoreError};
pub use generate::generate;
pub use scheduler::{
    RetrievalScheduler, DEFAULT_TOKEN_BUDGET, INITIAL_BACKOFF, MAX_BACKOFF, MAX_SOURCES, STALL_TIMEOUT,
};
pub use sink::Sink;
pub use store::{BlockLocation, Store};
pub use wire::{CallMessage, CancelMessage, DataMessage};
