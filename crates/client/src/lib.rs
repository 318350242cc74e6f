//! Client code for tile-proxy.
//!
//! This crate provides the outbound fetch pipeline: the dual-sink download
//! that mirrors an origin body to disk while streaming it to the client, and
//! the registry that keeps one writer per cache key.

pub mod fetch;

pub use fetch::{
    ClientSink, ClientStream, Download, FetchClient, FetchConfig, Flight, FlightFollower, FlightLeader, FlightOutcome,
    FlightRegistry, client_channel,
};
