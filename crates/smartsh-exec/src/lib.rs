//! Command execution: bounded subprocess runs, the external-terminal
//! variant, and interactive PTY sessions.

pub mod executor;
pub mod pty;
pub mod ring_sink;
pub mod terminal;

pub use executor::{run, ExecOpts, ExecOutcome};
pub use pty::{PtyEvent, PtyProcess, PtySpawnOpts};
pub use ring_sink::RingSink;
