//! # SteelTrack Common Library
//!
//! Shared code for the SteelTrack services including:
//! - Domain enums (piece-mark statuses, field locations, delivery states, roles)
//! - The pure transition authorizer
//! - Error taxonomy
//! - Event types (SteelTrackEvent enum) and EventBus
//! - Database schema, models and initialization
//! - Configuration loading

pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod events;

pub use auth::{authorize, Action, Actor};
pub use domain::{
    CrewStatus, DeliveryStatus, FieldLocation, ItemCondition, PieceMarkStatus, Role,
};
pub use error::{Error, Result};
