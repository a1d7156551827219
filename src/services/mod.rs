pub mod network_capability;
pub mod progress_service;
pub mod result_writer;
pub mod stream_prober;

pub use network_capability::{NetworkCapabilities, NetworkCapabilityProbe};
pub use progress_service::{
    LogProgressReporter, NoopProgressReporter, ProgressReporter, ProgressSnapshot,
    TerminalProgressReporter,
};
pub use result_writer::ResultWriter;
pub use stream_prober::{HttpStreamProber, StreamProber};
