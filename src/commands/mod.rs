pub mod generate_config;
pub mod history;
pub mod train;

pub use self::generate_config::generate_config;
pub use self::history::history;
pub use self::train::train;
