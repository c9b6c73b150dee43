pub mod attempt;
pub mod config;
pub mod replay;
pub mod run;
