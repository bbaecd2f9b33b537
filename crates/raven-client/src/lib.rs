//! Raven client core: RPC transport, shared query cache, optimistic
//! mutations, list screens, directory and realtime invalidation.

pub mod actions;
pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod feed;
pub mod lists;
pub mod mutation;
pub mod notify;
pub mod polls;
pub mod realtime;
pub mod rpc;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ClientConfig;
pub use error::{ClientError, ErrorSurface, Result};
pub use feed::ChannelFeed;
pub use lists::{ListItem, ListKey, ListKind, ListScreen};
pub use notify::{Notice, NoticeLevel, Notifier};
pub use rpc::{CallKind, HttpRpc, Rpc};
pub use state::{ClientState, ClientStateInner};
