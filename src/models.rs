pub mod bounties;
pub mod notifications;
pub mod problems;
pub mod solutions;
pub mod users;
