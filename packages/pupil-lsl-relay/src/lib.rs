pub mod channel;
pub mod clock;
pub mod config;
pub mod discovery;
pub mod error;
pub mod event;
pub mod outlet;
pub mod recorder;
pub mod registry;
pub mod relay;
pub mod session;
pub mod transport;
pub mod types;

pub use types::*;
pub use clock::{system_host_clock, HostClock, OutletClock};
pub use config::{RecorderSettings, RelayConfig};
pub use error::{ExtractError, RelayError, RelayResult};
pub use event::PupilEvent;
pub use outlet::{Outlet, OutletKind};
pub use recorder::{SinkKind, StreamRecorder};
pub use relay::Relay;
pub use session::{Notification, RecorderPlugin};
pub use transport::{ResolveFilter, Transport};
