// File: lib.rs
//
// The purpose of this file is to expose the Chord simulation's modules as a
// library, independent of the command-line driver in main.rs.

pub mod dht;
pub mod driver;
pub mod error;
pub mod node;
pub mod observer;
pub mod ring;
pub mod select;
