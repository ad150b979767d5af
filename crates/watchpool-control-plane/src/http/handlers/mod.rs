//! HTTP request handlers.

mod health;
mod tasks;

pub use health::{health_check, metrics_handler};
pub use tasks::{
    create_task, decrease_workers, get_task, increase_workers, list_tasks, stop_task,
};
