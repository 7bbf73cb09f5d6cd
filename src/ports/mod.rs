pub mod database;
pub mod member;
pub mod notification;
pub mod points_config;
