//! `mage` — command-line front end for a MAGE application server.

pub mod cli;
