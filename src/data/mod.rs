pub mod error;
pub mod events;
pub mod frames;
pub mod pins;
pub mod reconcile;
pub mod table;
pub mod timefmt;
pub mod trace;

#[cfg(test)]
pub(crate) mod testutil;
