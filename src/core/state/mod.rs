pub mod app_state;
pub mod last_check;

pub use app_state::AppState;
pub use last_check::LastCheckStore;
