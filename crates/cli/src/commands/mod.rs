pub mod assemble;
pub mod config_cmd;
pub mod generate;
pub mod predict;
