//! Ordered installation: reorder buffer and install sequencer.

mod reorder;
mod sequencer;

pub(crate) use sequencer::InstallSequencer;
