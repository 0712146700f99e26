mod access;
mod common;
mod compliance;
mod token;
