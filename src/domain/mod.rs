pub mod control;
pub mod dispatch;
pub mod models;
pub mod protocol;
pub mod settings;
