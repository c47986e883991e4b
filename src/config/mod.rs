mod settings;

pub use settings::{DatabaseParams, DatabaseTarget, Settings};
