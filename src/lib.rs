//! SPK: Smart Parking
//!
//! Car parks, their opening hours and parking spots, and the parking
//! sessions of users, kept in a SQLite primary store with a full-text
//! search mirror and served over REST.

pub mod api;
pub mod cli;
pub mod core;
pub mod entities;
