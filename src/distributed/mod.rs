//! Distributed mode implementation
//!
//! # Architecture
//!
//! golnet distributed mode runs three kinds of process:
//!
//! - **Engine service**: owns the board, drives the turn loop, serves controllers
//! - **Worker services**: register with the engine and compute bands on request
//! - **Controllers**: load the board, start or reattach to a run, relay keypresses
//!   and receive visualization events on their own listener
//!
//! # Modules
//!
//! - `protocol`: Message definitions and framing
//! - `client`: TCP clients (remote worker, remote sink, engine client)
//! - `engine_service`: Engine service implementation
//! - `worker_service`: Worker service implementation

pub mod client;
pub mod engine_service;
pub mod protocol;
pub mod worker_service;

pub use client::{EngineClient, RemoteSink, RemoteWorker};
pub use engine_service::EngineService;
pub use protocol::{
    ContinueMessage, ErrorMessage, Message, RegisterMessage, StartMessage, MAX_MESSAGE_SIZE,
    PROTOCOL_VERSION,
};
pub use worker_service::WorkerService;
