pub mod connection;
pub mod launcher;
pub mod session;

pub use connection::connect_to_browser;
pub use launcher::launch_browser;
pub use session::BrowserSession;
