mod handlers;
mod models;
mod state;
mod translate;

pub use handlers::{listen_addr, run_server};
