//! sosh-driver - a run-counting test driver for the sosh remote shell.
//!
//! Drives a remote interactive shell over UDP: every completion token the
//! shell prints counts as one finished run, and the session strategy decides
//! which commands go back. An operator can watch the mirrored traffic and
//! type commands of their own while the automated driving continues.

pub mod batch;
pub mod config;
pub mod console;
pub mod driver;
pub mod session;
pub mod transport;
