//! Domain models for Zinic.
//!
//! Every entity except [`tenant::Tenant`] and [`demo::DemoLead`] carries
//! the code of the tenant that owns it.

pub mod demo;
pub mod department;
pub mod item;
pub mod request;
pub mod tenant;
pub mod user;
pub mod vendor;
