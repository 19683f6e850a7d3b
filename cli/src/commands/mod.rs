pub mod cli;
pub mod panel;
pub mod script;
