pub mod activity;
pub mod task;
pub mod user;

pub use activity::{ActivityAction, ActivityLogged, ActivityRecord};
pub use task::{Category, NewTask, Task, TaskStatus, TaskUpdate, TaskUpdateEcho};
pub use user::UserProfile;
