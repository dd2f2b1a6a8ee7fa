pub mod tag;
pub mod task;
pub mod user;

pub use tag::{Tag, TagInput, TagQuery, TaskTag};
pub use task::{Task, TaskInput, TaskPriority, TaskQuery};
pub use user::{Credentials, User};
