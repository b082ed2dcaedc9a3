pub mod commits;
pub mod deploy;
pub mod health;
pub mod history;
pub mod status;
