pub mod details;
pub mod history;
pub mod process;
pub mod report;
pub mod reset;
pub mod validate;
