pub mod rate_limit;
pub mod reaper;
pub mod sessions;
pub mod todos;
pub mod users;
