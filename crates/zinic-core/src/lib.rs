//! Core domain types, access rules and the stock lifecycle for Zinic.

pub mod collaborator;
pub mod error;
pub mod lifecycle;
pub mod mapper;
pub mod models;
pub mod permission;
pub mod repository;
