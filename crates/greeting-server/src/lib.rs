#![doc = include_str!("../README.md")]

pub mod server;
pub mod services;

pub use server::{
    error::{Error, Result},
    register::Register,
    runner::{ServerRunner, run},
    shutdown::{Shutdown, ShutdownTrigger},
};
