pub mod catalog;
pub mod db;
pub mod models;
pub mod observe;
pub mod reminder;
pub mod search;
pub mod service;
