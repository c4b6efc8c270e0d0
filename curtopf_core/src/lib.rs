//! Core implementation of curtopf, a crate for building and solving DC
//! optimal power flow and export-curtailment dispatch models from tabular
//! case data.
#![allow(unused)]

pub mod case;
pub mod configuration;
pub mod dispatch;
pub mod io;
pub mod model;
pub mod optimize;
