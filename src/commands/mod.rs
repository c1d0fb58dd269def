mod click;
mod modes;
#[cfg(test)]
pub(crate) mod testing;

pub use click::ClickTask;
pub use modes::{check_targets, execute, run_quantity, run_schedule, run_sequence, Job};
