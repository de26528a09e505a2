mod cycle;
mod goal;
mod helpers;
mod import;
mod overrides;
mod redistribute;
mod target;
mod weight;

pub(crate) use cycle::{
    cmd_cycle_average, cmd_cycle_clear_day, cmd_cycle_day_type, cmd_cycle_disable,
    cmd_cycle_enable, cmd_cycle_lock, cmd_cycle_mark, cmd_cycle_set_day, cmd_cycle_show,
    cmd_cycle_start_day,
};
pub(crate) use goal::{cmd_goal_clear, cmd_goal_set, cmd_goal_show};
pub(crate) use import::cmd_import_weights;
pub(crate) use overrides::{cmd_override_clear, cmd_override_list, cmd_override_set};
pub(crate) use redistribute::cmd_redistribute;
pub(crate) use target::{cmd_target_clear, cmd_target_set, cmd_target_show, cmd_target_week};
pub(crate) use weight::{
    cmd_weight_delete, cmd_weight_history, cmd_weight_log, cmd_weight_recompute, cmd_weight_show,
};
