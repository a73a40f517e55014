pub mod events;
pub mod manager;
pub mod model;
pub mod state;

pub use events::{ChannelSink, EventSink, FnSink, NullSink, SessionEvent};
pub use manager::UpdateManager;
pub use model::UpdateSession;
pub use state::SessionState;
