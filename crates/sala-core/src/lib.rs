//! # sala-core
//!
//! Wire message model and foundation types for the sala relay.
//!
//! This crate provides the shared vocabulary the server crate depends on:
//!
//! - **Branded IDs**: [`ids::ParticipantId`] as a newtype
//! - **Messages**: [`messages::ClientFrame`] for inbound frames,
//!   [`messages::ServerMessage`] for outbound frames
//! - **Constants**: [`constants::SYSTEM_USER`] and friends
//!
//! ## Crate Position
//!
//! Foundation crate. Pure types + serde, no I/O.

#![deny(unsafe_code)]

pub mod constants;
pub mod ids;
pub mod messages;
